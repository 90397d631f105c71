//! Shared application state

use metrics_exporter_prometheus::PrometheusHandle;
use nimbus_model::ModelLoader;
use nimbus_queue::TaskQueue;
use std::sync::Arc;

/// Default cap on request bodies (batch submissions)
pub const DEFAULT_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Handles shared by every request handler
#[derive(Clone)]
pub struct AppState {
    /// This process's lazy model loader
    pub loader: Arc<ModelLoader>,

    /// Queue carrying batch jobs to workers
    pub queue: Arc<dyn TaskQueue>,

    /// Prometheus exporter handle, when a recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,

    /// Maximum accepted request body size in bytes
    pub body_limit: usize,
}

impl AppState {
    pub fn new(loader: Arc<ModelLoader>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            loader,
            queue,
            metrics_handle: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}
