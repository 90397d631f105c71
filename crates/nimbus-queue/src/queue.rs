//! Task queue contract

use async_trait::async_trait;
use nimbus_core::{
    BatchOutcome, JobId, JobRecord, PredictionRecord, Progress, QueueBackend, QueueSettings,
    Result, TaskMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::memory::MemoryQueue;
use crate::redis_queue::RedisQueue;

/// Submission, polling, and result reporting for batch jobs
///
/// The server side uses `submit` and `query`; workers use `next_task` and
/// the reporting methods.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a batch and return its job id; the job starts `PENDING`
    async fn submit(&self, records: Vec<PredictionRecord>) -> Result<JobId>;

    /// Current record of a job; unknown ids read as `PENDING`
    async fn query(&self, job_id: &JobId) -> Result<JobRecord>;

    /// Wait up to `wait` for the next task
    async fn next_task(&self, wait: Duration) -> Result<Option<TaskMessage>>;

    /// Mark a job as taken by a worker
    async fn mark_started(&self, job_id: &JobId) -> Result<()>;

    /// Publish an intermediate progress marker
    async fn update_progress(&self, job_id: &JobId, progress: Progress) -> Result<()>;

    /// Store the terminal outcome
    async fn complete(&self, job_id: &JobId, outcome: BatchOutcome) -> Result<()>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;
}

/// Connect to the queue selected by the settings
pub async fn build_queue(settings: &QueueSettings) -> Result<Arc<dyn TaskQueue>> {
    let queue: Arc<dyn TaskQueue> = match settings.backend {
        QueueBackend::Memory => Arc::new(MemoryQueue::with_ttl(Duration::from_secs(
            settings.result_ttl_secs,
        ))),
        QueueBackend::Redis => Arc::new(RedisQueue::connect(settings).await?),
    };

    info!("Using {} task queue", queue.backend());
    Ok(queue)
}
