//! Model registry collaborator contract

use async_trait::async_trait;
use nimbus_core::{RegistryBackend, RegistrySettings, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::file_registry::FileModelRegistry;
use crate::http_registry::HttpModelRegistry;
use crate::model::ModelHandle;

/// A concrete registered model version an alias points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name
    pub name: String,

    /// Alias that was resolved
    pub alias: String,

    /// Version identifier
    pub version: String,

    /// Artifact location, as reported by the registry
    pub source: String,
}

/// External service mapping a logical `(name, alias)` pair to a loadable artifact
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Resolve an alias to the version it currently points at
    async fn resolve(&self, name: &str, alias: &str) -> Result<ModelVersion>;

    /// Fetch and construct the model for a resolved version
    async fn fetch(&self, version: &ModelVersion) -> Result<ModelHandle>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Build the registry collaborator selected by the settings
pub fn build_registry(settings: &RegistrySettings) -> Result<Arc<dyn ModelRegistry>> {
    let registry: Arc<dyn ModelRegistry> = match settings.backend {
        RegistryBackend::Http => Arc::new(HttpModelRegistry::new(
            &settings.tracking_uri,
            settings.resolve_timeout(),
        )?),
        RegistryBackend::File => Arc::new(FileModelRegistry::new(&settings.index_path)),
    };

    info!("Using model registry: {}", registry.describe());
    Ok(registry)
}
