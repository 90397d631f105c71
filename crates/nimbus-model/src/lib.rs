//! Nimbus Model
//!
//! Everything a serving process needs to turn a logical model name into a
//! ready-to-use prediction handle:
//! - `ModelRegistry` collaborators that resolve `(name, alias)` to an artifact
//!   (MLflow-compatible HTTP tracking server, or a YAML index on disk)
//! - the `LinearClassifier` artifact format those registries serve
//! - `ModelLoader`, which resolves once per process and contains failures

pub mod file_registry;
pub mod http_registry;
pub mod linear;
pub mod loader;
pub mod model;
pub mod registry;

pub use file_registry::{FileModelRegistry, RegistryIndex};
pub use http_registry::HttpModelRegistry;
pub use linear::LinearClassifier;
pub use loader::{LoaderConfig, LoaderState, LoaderStatus, ModelLoader};
pub use model::{Model, ModelHandle, ModelInfo};
pub use registry::{build_registry, ModelRegistry, ModelVersion};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::loader::{LoaderConfig, ModelLoader};
    pub use crate::model::{Model, ModelHandle};
    pub use crate::registry::{ModelRegistry, ModelVersion};
}
