//! Settings shared by the server and worker processes
//!
//! Both roles must resolve the same model artifact and talk to the same
//! queue, so they load one settings document. Values are layered:
//! built-in defaults, then an optional YAML file, then `NIMBUS__*`
//! environment variables (`NIMBUS__REGISTRY__TRACKING_URI`, ...).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable prefix for settings overrides
pub const ENV_PREFIX: &str = "NIMBUS";

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model registry and loading policy
    pub registry: RegistrySettings,

    /// Task queue connection
    pub queue: QueueSettings,
}

impl Settings {
    /// Load settings from an optional YAML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(format!("Failed to load settings: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a YAML document (no environment layering)
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(format!("Failed to parse settings: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that cannot produce a working loader or queue
    pub fn validate(&self) -> Result<()> {
        if self.registry.model_name.trim().is_empty() {
            return Err(Error::config("registry.model_name must not be empty"));
        }
        if self.registry.model_alias.trim().is_empty() {
            return Err(Error::config("registry.model_alias must not be empty"));
        }
        if self.registry.max_attempts == 0 {
            return Err(Error::config("registry.max_attempts must be at least 1"));
        }
        if self.registry.resolve_timeout_secs == 0 {
            return Err(Error::config("registry.resolve_timeout_secs must be positive"));
        }
        if self.queue.result_ttl_secs == 0 {
            return Err(Error::config("queue.result_ttl_secs must be positive"));
        }
        Ok(())
    }
}

/// Which registry collaborator resolves models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// MLflow-compatible tracking server over HTTP
    #[default]
    Http,
    /// YAML index on the local filesystem
    File,
}

/// Model registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub backend: RegistryBackend,

    /// Tracking server address (http backend)
    pub tracking_uri: String,

    /// Registry index file (file backend)
    pub index_path: PathBuf,

    /// Logical model name
    pub model_name: String,

    /// Alias the serving processes follow
    pub model_alias: String,

    /// Upper bound for a single resolve-and-fetch attempt
    pub resolve_timeout_secs: u64,

    /// Attempts per `get_model` call when the registry is unavailable
    pub max_attempts: u32,

    /// Pause between attempts
    pub retry_backoff_ms: u64,

    /// Load the model at process start instead of on first use
    pub preload: bool,
}

impl RegistrySettings {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Http,
            tracking_uri: "http://127.0.0.1:5000".to_string(),
            index_path: PathBuf::from("models/registry.yaml"),
            model_name: "nimbus-classifier".to_string(),
            model_alias: "production".to_string(),
            resolve_timeout_secs: 30,
            max_attempts: 1,
            retry_backoff_ms: 500,
            preload: false,
        }
    }
}

/// Which task queue carries batch jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// In-process queue, only useful with an embedded worker
    Memory,
    /// Redis lists and keys, shared between processes
    #[default]
    Redis,
}

/// Task queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub backend: QueueBackend,

    /// Redis connection URL (redis backend)
    pub redis_url: String,

    /// Key namespace for queue lists and job records
    pub key_prefix: String,

    /// How long finished job records stay queryable
    pub result_ttl_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            redis_url: "redis://localhost:6379/0".to_string(),
            key_prefix: "nimbus".to_string(),
            result_ttl_secs: 86_400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.registry.model_name, "nimbus-classifier");
        assert_eq!(settings.registry.model_alias, "production");
        assert_eq!(settings.registry.max_attempts, 1);
        assert_eq!(settings.queue.backend, QueueBackend::Redis);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
registry:
  backend: file
  index_path: /srv/models/registry.yaml
  resolve_timeout_secs: 5
queue:
  backend: memory
"#;

        let settings = Settings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.registry.backend, RegistryBackend::File);
        assert_eq!(settings.registry.resolve_timeout(), Duration::from_secs(5));
        assert_eq!(settings.registry.model_name, "nimbus-classifier");
        assert_eq!(settings.queue.backend, QueueBackend::Memory);
        assert_eq!(settings.queue.result_ttl_secs, 86_400);
    }

    #[test]
    fn test_shipped_sample_parses() {
        let settings =
            Settings::from_yaml_str(include_str!("../../../nimbus.yaml")).unwrap();
        assert_eq!(settings.registry.backend, RegistryBackend::Http);
        assert_eq!(settings.registry.tracking_uri, "http://127.0.0.1:5000");
        assert_eq!(settings.registry.retry_backoff(), Duration::from_millis(500));
        assert_eq!(settings.queue.redis_url, "redis://localhost:6379/0");
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let yaml = r#"
registry:
  max_attempts: 0
"#;
        assert!(matches!(
            Settings::from_yaml_str(yaml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nimbus.yaml");
        std::fs::write(
            &path,
            "registry:\n  tracking_uri: http://mlflow.internal:5000\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.registry.tracking_uri, "http://mlflow.internal:5000");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Some(Path::new("/nonexistent/nimbus.yaml"))).unwrap();
        assert_eq!(settings.queue.key_prefix, "nimbus");
    }
}
