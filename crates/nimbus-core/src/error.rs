//! Error types for Nimbus

/// Result type alias using Nimbus's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Nimbus operations
///
/// The first three variants are the load and inference taxonomy every
/// request and batch job can end in. All of them are recoverable at the
/// boundary of a single request or job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model registry could not be reached or answered with a server error
    #[error("model registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// No model version is registered under the requested name and alias
    #[error("model '{name}@{alias}' not found in registry")]
    ModelNotFound { name: String, alias: String },

    /// The loaded model rejected its input or failed while predicting
    #[error("inference failure: {0}")]
    InferenceFailure(String),

    /// The registry served an artifact that cannot be turned into a model
    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    /// Task queue errors
    #[error("queue error: {0}")]
    Queue(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new registry-unavailable error
    pub fn registry_unavailable(msg: impl Into<String>) -> Self {
        Self::RegistryUnavailable(msg.into())
    }

    /// Create a new model-not-found error
    pub fn model_not_found(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::ModelNotFound {
            name: name.into(),
            alias: alias.into(),
        }
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::InferenceFailure(msg.into())
    }

    /// Create a new invalid-artifact error
    pub fn invalid_artifact(msg: impl Into<String>) -> Self {
        Self::InvalidArtifact(msg.into())
    }

    /// Create a new queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means no usable model could be obtained
    pub fn is_model_unavailable(&self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable(_)
                | Self::ModelNotFound { .. }
                | Self::InvalidArtifact(_)
        )
    }

    /// Whether another resolution attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RegistryUnavailable(_))
    }

    /// An equivalent error for another caller sharing the same failure
    ///
    /// Variants wrapping foreign errors keep their kind and message.
    pub fn replay(&self) -> Self {
        match self {
            Self::RegistryUnavailable(msg) => Self::RegistryUnavailable(msg.clone()),
            Self::ModelNotFound { name, alias } => Self::ModelNotFound {
                name: name.clone(),
                alias: alias.clone(),
            },
            Self::InferenceFailure(msg) => Self::InferenceFailure(msg.clone()),
            Self::InvalidArtifact(msg) => Self::InvalidArtifact(msg.clone()),
            Self::Queue(msg) => Self::Queue(msg.clone()),
            Self::Config(msg) => Self::Config(msg.clone()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Serialization(e) => Self::Internal(format!("serialization error: {}", e)),
            Self::Internal(msg) => Self::Internal(msg.clone()),
        }
    }
}
