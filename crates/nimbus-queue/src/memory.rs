//! In-process task queue

use async_trait::async_trait;
use chrono::Utc;
use nimbus_core::{
    BatchOutcome, Error, JobId, JobRecord, PredictionRecord, Progress, Result, TaskMessage,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::queue::TaskQueue;

/// Default retention of finished job records
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(86_400);

/// Task queue living in the server process
///
/// Finished job records are dropped once they are older than the result
/// TTL; after that their ids read as `PENDING`, as with Redis key expiry.
pub struct MemoryQueue {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    result_ttl: Duration,
    sender: mpsc::UnboundedSender<TaskMessage>,
    receiver: Mutex<mpsc::UnboundedReceiver<TaskMessage>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_RESULT_TTL)
    }

    pub fn with_ttl(result_ttl: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            jobs: RwLock::new(HashMap::new()),
            result_ttl,
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Number of job records currently held
    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }

    /// Drop finished records past the result TTL
    pub fn prune_expired(&self) -> usize {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, record| !is_expired(record, self.result_ttl));
        let removed = before - jobs.len();
        if removed > 0 {
            debug!("Dropped {} expired job records", removed);
        }
        removed
    }

    fn update(&self, job_id: &JobId, apply: impl FnOnce(&mut JobRecord)) {
        let mut jobs = self.jobs.write();
        let record = jobs
            .entry(job_id.clone())
            .or_insert_with(|| JobRecord::pending(job_id.clone()));
        apply(record);
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn submit(&self, records: Vec<PredictionRecord>) -> Result<JobId> {
        self.prune_expired();

        let job_id = JobId::new();
        self.jobs
            .write()
            .insert(job_id.clone(), JobRecord::pending(job_id.clone()));

        self.sender
            .send(TaskMessage::new(job_id.clone(), records))
            .map_err(|_| Error::queue("in-process queue is closed"))?;

        debug!("Submitted job {}", job_id);
        Ok(job_id)
    }

    async fn query(&self, job_id: &JobId) -> Result<JobRecord> {
        Ok(self
            .jobs
            .read()
            .get(job_id)
            .filter(|record| !is_expired(record, self.result_ttl))
            .cloned()
            .unwrap_or_else(|| JobRecord::pending(job_id.clone())))
    }

    async fn next_task(&self, wait: Duration) -> Result<Option<TaskMessage>> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(wait, receiver.recv()).await {
            Ok(message) => Ok(message),
            Err(_) => Ok(None),
        }
    }

    async fn mark_started(&self, job_id: &JobId) -> Result<()> {
        self.update(job_id, |record| record.start());
        Ok(())
    }

    async fn update_progress(&self, job_id: &JobId, progress: Progress) -> Result<()> {
        self.update(job_id, |record| record.progress(progress));
        Ok(())
    }

    async fn complete(&self, job_id: &JobId, outcome: BatchOutcome) -> Result<()> {
        self.update(job_id, |record| record.finish(outcome));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Only terminal records expire; queued and running jobs are always kept
fn is_expired(record: &JobRecord, ttl: Duration) -> bool {
    record.state.is_terminal()
        && (Utc::now() - record.updated_at)
            .to_std()
            .map(|age| age >= ttl)
            .unwrap_or(false)
}
