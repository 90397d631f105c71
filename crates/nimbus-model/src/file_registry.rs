//! Registry backed by a YAML index on the local filesystem
//!
//! ```yaml
//! version: "1.0"
//! models:
//!   nimbus-classifier:
//!     description: Iris species classifier
//!     aliases:
//!       production: "1"
//!     versions:
//!       "1":
//!         artifact: nimbus-classifier/1/linear_model.json
//! ```
//!
//! Relative artifact paths are resolved against the index file's directory.
//! The index is re-read on every resolution, so promoting a version is a
//! matter of editing the alias and letting the next load pick it up.

use async_trait::async_trait;
use nimbus_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::linear::LinearClassifier;
use crate::model::{ModelHandle, ModelInfo};
use crate::registry::{ModelRegistry, ModelVersion};

/// Parsed registry index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryIndex {
    pub version: String,
    pub models: HashMap<String, RegisteredModel>,
}

/// One registered model with its versions and aliases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredModel {
    #[serde(default)]
    pub description: String,

    /// Alias name to version identifier
    #[serde(default)]
    pub aliases: HashMap<String, String>,

    /// Version identifier to artifact entry
    #[serde(default)]
    pub versions: HashMap<String, VersionEntry>,
}

/// Artifact entry of a registered version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Path to the linear model JSON document
    pub artifact: PathBuf,
}

impl RegistryIndex {
    /// Parse an index document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse registry index: {}", e)))
    }

    /// Look up the version entry an alias points at
    pub fn lookup(&self, name: &str, alias: &str) -> Option<(&str, &VersionEntry)> {
        let model = self.models.get(name)?;
        let version = model.aliases.get(alias)?;
        let entry = model.versions.get(version)?;
        Some((version.as_str(), entry))
    }
}

/// File-backed model registry
pub struct FileModelRegistry {
    index_path: PathBuf,
}

impl FileModelRegistry {
    /// Create a registry reading the index at `index_path`
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
        }
    }

    async fn read_index(&self) -> Result<RegistryIndex> {
        let content = tokio::fs::read_to_string(&self.index_path)
            .await
            .map_err(|e| {
                Error::registry_unavailable(format!(
                    "Failed to read registry index {}: {}",
                    self.index_path.display(),
                    e
                ))
            })?;

        RegistryIndex::from_yaml(&content)
            .map_err(|e| Error::registry_unavailable(e.to_string()))
    }

    fn artifact_path(&self, artifact: &Path) -> PathBuf {
        if artifact.is_absolute() {
            return artifact.to_path_buf();
        }
        self.index_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(artifact)
    }
}

#[async_trait]
impl ModelRegistry for FileModelRegistry {
    async fn resolve(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        let index = self.read_index().await?;

        let (version, entry) = index
            .lookup(name, alias)
            .ok_or_else(|| Error::model_not_found(name, alias))?;

        let source = self.artifact_path(&entry.artifact);
        debug!("Resolved {}@{} to version {} at {}", name, alias, version, source.display());

        Ok(ModelVersion {
            name: name.to_string(),
            alias: alias.to_string(),
            version: version.to_string(),
            source: source.display().to_string(),
        })
    }

    async fn fetch(&self, version: &ModelVersion) -> Result<ModelHandle> {
        let bytes = tokio::fs::read(&version.source).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::model_not_found(&version.name, &version.alias)
            } else {
                Error::registry_unavailable(format!(
                    "Failed to read artifact {}: {}",
                    version.source, e
                ))
            }
        })?;

        let model = LinearClassifier::from_json(&bytes)?;

        Ok(ModelHandle::new(
            model,
            ModelInfo {
                name: version.name.clone(),
                alias: version.alias.clone(),
                version: version.version.clone(),
                source: version.source.clone(),
            },
        ))
    }

    fn describe(&self) -> String {
        format!("file index {}", self.index_path.display())
    }
}
