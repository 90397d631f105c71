//! Lazy, once-per-process model loading with failure containment
//!
//! `ModelLoader` owns the only mutable state of the serving path. The first
//! `get_model` call resolves the configured `(name, alias)` against the
//! registry and caches the handle; later calls clone the cached handle
//! without any I/O.
//!
//! A failed load is shared with the callers that were already waiting on it,
//! but never cached as the answer for later calls: the next call that
//! arrives after the failure resolves again. Each attempt is bounded by
//! `resolve_timeout` and a call makes at most `max_attempts` attempts.

use nimbus_core::{Error, RegistrySettings, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::model::{ModelHandle, ModelInfo};
use crate::registry::ModelRegistry;

/// Which model to load and how hard to try
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Registered model name
    pub model_name: String,

    /// Alias to resolve
    pub model_alias: String,

    /// Upper bound for one resolve-and-fetch attempt
    pub resolve_timeout: Duration,

    /// Attempts per call, retried only while the registry is unavailable
    pub max_attempts: u32,

    /// Pause between attempts
    pub retry_backoff: Duration,
}

impl LoaderConfig {
    /// Single attempt with the default timeout
    pub fn new(model_name: impl Into<String>, model_alias: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_alias: model_alias.into(),
            ..Self::from(&RegistrySettings::default())
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }
}

impl From<&RegistrySettings> for LoaderConfig {
    fn from(settings: &RegistrySettings) -> Self {
        Self {
            model_name: settings.model_name.clone(),
            model_alias: settings.model_alias.clone(),
            resolve_timeout: settings.resolve_timeout(),
            max_attempts: settings.max_attempts.max(1),
            retry_backoff: settings.retry_backoff(),
        }
    }
}

/// Cached outcome of the most recent load attempt
#[derive(Debug, Clone, Default)]
pub enum LoaderState {
    #[default]
    Unloaded,
    Loaded(ModelHandle),
    Failed(Arc<Error>),
}

/// Snapshot of the loader for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct LoaderStatus {
    /// `unloaded`, `loading`, `loaded` or `failed`
    pub state: &'static str,
    pub model_name: String,
    pub model_alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Registry resolutions performed by this loader so far
    pub resolutions: u64,
}

/// Per-process lazy model loader
pub struct ModelLoader {
    registry: Arc<dyn ModelRegistry>,
    config: LoaderConfig,
    state: RwLock<LoaderState>,
    /// Completed load attempts; bumped under the write lock
    generation: AtomicU64,
    resolutions: AtomicU64,
}

impl ModelLoader {
    /// Create a loader in the `Unloaded` state
    pub fn new(registry: Arc<dyn ModelRegistry>, config: LoaderConfig) -> Self {
        Self {
            registry,
            config,
            state: RwLock::new(LoaderState::Unloaded),
            generation: AtomicU64::new(0),
            resolutions: AtomicU64::new(0),
        }
    }

    /// Get the model, loading it on first use
    ///
    /// Concurrent callers racing on an unloaded model wait for a single
    /// resolution and share its result, success or failure. A caller never
    /// waits for more than the one attempt that was running when it arrived
    /// plus its own.
    pub async fn get_model(&self) -> Result<ModelHandle> {
        // Taken before any lock: waiting on the lock counts as arriving
        // before the attempt that holds it
        let seen = self.generation.load(Ordering::Acquire);

        {
            let state = self.state.read().await;
            if let LoaderState::Loaded(handle) = &*state {
                return Ok(handle.clone());
            }
        }

        let mut state = self.state.write().await;

        // Another caller finished an attempt while we waited: share its outcome
        match &*state {
            LoaderState::Loaded(handle) => return Ok(handle.clone()),
            LoaderState::Failed(err) if self.generation.load(Ordering::Acquire) != seen => {
                debug!("Sharing the outcome of a concurrent failed load");
                return Err(err.replay());
            }
            _ => {}
        }

        if let LoaderState::Failed(err) = &*state {
            info!("Previous model load failed ({}), retrying", err);
        } else {
            info!(
                "Model {}@{} is not loaded, resolving from {}",
                self.config.model_name,
                self.config.model_alias,
                self.registry.describe()
            );
        }

        let start = Instant::now();
        match self.load().await {
            Ok(handle) => {
                info!(
                    "Loaded model {}@{} version {} in {:?}",
                    handle.info().name,
                    handle.info().alias,
                    handle.info().version,
                    start.elapsed()
                );
                metrics::counter!("nimbus_model_loads_total", "outcome" => "success").increment(1);
                *state = LoaderState::Loaded(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!("Failed to load model: {}", e);
                metrics::counter!("nimbus_model_loads_total", "outcome" => "failure").increment(1);
                *state = LoaderState::Failed(Arc::new(e.replay()));
                self.generation.fetch_add(1, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Load eagerly, e.g. at process start
    pub async fn preload(&self) -> Result<()> {
        self.get_model().await.map(|_| ())
    }

    /// Whether a model is cached
    pub async fn is_loaded(&self) -> bool {
        matches!(&*self.state.read().await, LoaderState::Loaded(_))
    }

    /// Current state without triggering a load
    ///
    /// Reports `loading` instead of waiting while a resolution is in flight.
    pub fn status(&self) -> LoaderStatus {
        let mut status = LoaderStatus {
            state: "loading",
            model_name: self.config.model_name.clone(),
            model_alias: self.config.model_alias.clone(),
            model: None,
            error: None,
            resolutions: self.resolution_count(),
        };

        if let Ok(state) = self.state.try_read() {
            match &*state {
                LoaderState::Unloaded => status.state = "unloaded",
                LoaderState::Loaded(handle) => {
                    status.state = "loaded";
                    status.model = Some(handle.info().clone());
                }
                LoaderState::Failed(err) => {
                    status.state = "failed";
                    status.error = Some(err.to_string());
                }
            }
        }

        status
    }

    /// Number of registry resolutions attempted so far
    pub fn resolution_count(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    async fn load(&self) -> Result<ModelHandle> {
        let mut attempt = 1;
        loop {
            match self.attempt().await {
                Ok(handle) => return Ok(handle),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    warn!(
                        "Model load attempt {}/{} failed: {}",
                        attempt, self.config.max_attempts, e
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self) -> Result<ModelHandle> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);

        let name = &self.config.model_name;
        let alias = &self.config.model_alias;
        let resolve_and_fetch = async {
            let version = self.registry.resolve(name, alias).await?;
            self.registry.fetch(&version).await
        };

        match tokio::time::timeout(self.config.resolve_timeout, resolve_and_fetch).await {
            Ok(result) => result,
            Err(_) => Err(Error::registry_unavailable(format!(
                "resolving {}@{} timed out after {:?}",
                name, alias, self.config.resolve_timeout
            ))),
        }
    }
}
