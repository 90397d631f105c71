//! Linear classifier artifact
//!
//! The registry serves fitted linear models (for example an exported
//! multinomial logistic regression) as a JSON document:
//!
//! ```json
//! {
//!   "classes": [0, 1, 2],
//!   "coefficients": [[-0.42, 0.97, -2.52, -1.08], ...],
//!   "intercepts": [9.85, 2.24, -12.09],
//!   "feature_names": ["sepal_length", "sepal_width", "petal_length", "petal_width"]
//! }
//! ```
//!
//! One coefficient row per class, or a single row for a binary model.

use nimbus_core::{Error, PredictionRecord, Result};
use serde::{Deserialize, Serialize};

use crate::model::Model;

/// Multiclass linear classifier: `argmax_k(w_k . x + b_k)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearClassifier {
    /// Class labels, in coefficient-row order
    pub classes: Vec<i64>,

    /// Weight matrix, `[n_rows][n_features]`
    pub coefficients: Vec<Vec<f64>>,

    /// Bias per coefficient row
    pub intercepts: Vec<f64>,

    /// Column order the model was fitted on
    #[serde(default)]
    pub feature_names: Vec<String>,
}

impl LinearClassifier {
    /// Parse and validate an artifact document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let model: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::invalid_artifact(format!("Failed to parse linear model: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    /// Check that the artifact's shapes agree with each other and with `PredictionRecord`
    pub fn validate(&self) -> Result<()> {
        if self.classes.len() < 2 {
            return Err(Error::invalid_artifact(format!(
                "expected at least 2 classes, got {}",
                self.classes.len()
            )));
        }

        let rows = self.coefficients.len();
        if rows == 0 {
            return Err(Error::invalid_artifact("coefficient matrix is empty"));
        }

        let expected_rows = if self.is_binary() { 1 } else { self.classes.len() };
        if rows != expected_rows {
            return Err(Error::invalid_artifact(format!(
                "{} coefficient rows for {} classes",
                rows,
                self.classes.len()
            )));
        }

        if self.intercepts.len() != rows {
            return Err(Error::invalid_artifact(format!(
                "{} intercepts for {} coefficient rows",
                self.intercepts.len(),
                rows
            )));
        }

        for (i, row) in self.coefficients.iter().enumerate() {
            if row.len() != PredictionRecord::NUM_FEATURES {
                return Err(Error::invalid_artifact(format!(
                    "coefficient row {} has {} features, expected {}",
                    i,
                    row.len(),
                    PredictionRecord::NUM_FEATURES
                )));
            }
        }

        let all_finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(self.intercepts.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(Error::invalid_artifact("non-finite weight in artifact"));
        }

        if !self.feature_names.is_empty()
            && self.feature_names.iter().map(String::as_str).ne(PredictionRecord::FEATURE_NAMES)
        {
            return Err(Error::invalid_artifact(format!(
                "model was fitted on features {:?}, expected {:?}",
                self.feature_names,
                PredictionRecord::FEATURE_NAMES
            )));
        }

        Ok(())
    }

    /// A binary model stores a single row scoring the positive class
    pub fn is_binary(&self) -> bool {
        self.classes.len() == 2 && self.coefficients.len() == 1
    }

    /// Raw decision values for one input row
    pub fn decision_function(&self, row: &[f64; PredictionRecord::NUM_FEATURES]) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(weights, bias)| {
                weights.iter().zip(row.iter()).map(|(w, x)| w * x).sum::<f64>() + bias
            })
            .collect()
    }

    fn predict_row(&self, row: &[f64; PredictionRecord::NUM_FEATURES]) -> i64 {
        let scores = self.decision_function(row);

        if self.is_binary() {
            return if scores[0] > 0.0 {
                self.classes[1]
            } else {
                self.classes[0]
            };
        }

        // First maximum wins on ties
        let mut best = 0;
        for (i, score) in scores.iter().enumerate().skip(1) {
            if *score > scores[best] {
                best = i;
            }
        }
        self.classes[best]
    }
}

impl Model for LinearClassifier {
    fn predict(&self, records: &[PredictionRecord]) -> Result<Vec<i64>> {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let row = record.to_row();
                if row.iter().any(|v| !v.is_finite()) {
                    return Err(Error::inference(format!("record {} has a non-finite feature", i)));
                }
                Ok(self.predict_row(&row))
            })
            .collect()
    }

    fn kind(&self) -> &str {
        "linear"
    }
}
