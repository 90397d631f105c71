//! Model trait and the shareable handle callers predict through

use nimbus_core::{Error, PredictionRecord, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Inference contract of a loaded model artifact
///
/// Implementations are read-only once constructed and must tolerate
/// concurrent `predict` calls from many request handlers.
pub trait Model: Send + Sync {
    /// Predict one class label per record, in input order
    fn predict(&self, records: &[PredictionRecord]) -> Result<Vec<i64>>;

    /// Short name of the artifact flavor
    fn kind(&self) -> &str;
}

/// Where a loaded model came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Registered model name
    pub name: String,

    /// Alias the model was resolved through
    pub alias: String,

    /// Concrete registry version behind the alias
    pub version: String,

    /// Artifact location reported by the registry
    pub source: String,
}

/// Loaded, ready-to-infer model
///
/// Cloning is cheap and every clone shares the same underlying model.
/// Handles live in the process that loaded them and are never serialized.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<dyn Model>,
    info: Arc<ModelInfo>,
}

impl ModelHandle {
    /// Wrap a model together with its registry metadata
    pub fn new(model: impl Model + 'static, info: ModelInfo) -> Self {
        Self {
            model: Arc::new(model),
            info: Arc::new(info),
        }
    }

    /// Predict labels for a batch of records
    pub fn predict(&self, records: &[PredictionRecord]) -> Result<Vec<i64>> {
        let predictions = self.model.predict(records)?;
        if predictions.len() != records.len() {
            return Err(Error::inference(format!(
                "model returned {} predictions for {} records",
                predictions.len(),
                records.len()
            )));
        }
        Ok(predictions)
    }

    /// Predict the label of a single record
    pub fn predict_one(&self, record: &PredictionRecord) -> Result<i64> {
        self.predict(std::slice::from_ref(record))?
            .first()
            .copied()
            .ok_or_else(|| Error::inference("model returned no prediction"))
    }

    /// Registry metadata for this model
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Artifact flavor of the wrapped model
    pub fn kind(&self) -> &str {
        self.model.kind()
    }

    /// Whether both handles share the same loaded model
    pub fn same_model(&self, other: &ModelHandle) -> bool {
        Arc::ptr_eq(&self.model, &other.model)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("kind", &self.model.kind())
            .field("info", &self.info)
            .finish()
    }
}
