//! Worker runtime: pull jobs off the queue and run them with bounded concurrency

use nimbus_core::{BatchOutcome, JobState, TaskMessage};
use nimbus_model::ModelLoader;
use nimbus_queue::TaskQueue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::batch::dispatch_batch;

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs executed at the same time
    pub concurrency: usize,

    /// How long one queue poll may block
    pub poll_wait: Duration,

    /// Pause after a failed poll
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            poll_wait: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }
}

/// Batch worker owning its own model loader
#[derive(Clone)]
pub struct Worker {
    loader: Arc<ModelLoader>,
    queue: Arc<dyn TaskQueue>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(loader: Arc<ModelLoader>, queue: Arc<dyn TaskQueue>, config: WorkerConfig) -> Self {
        Self {
            loader,
            queue,
            config,
        }
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process jobs until `shutdown` resolves, then drain in-flight jobs
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        let concurrency = self.config.concurrency.max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut in_flight = JoinSet::new();

        info!(
            "Worker started ({} queue, concurrency {})",
            self.queue.backend(),
            concurrency
        );

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    warn!("Shutdown requested, no longer taking jobs");
                    break;
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Job task panicked: {}", e);
                    }
                }

                permit = permits.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };

                    // Not raced against shutdown: a cancelled poll could drop a
                    // task the broker already handed over. The poll returns
                    // within `poll_wait`.
                    match self.queue.next_task(self.config.poll_wait).await {
                        Ok(Some(task)) => {
                            let worker = self.clone();
                            in_flight.spawn(async move {
                                let _permit = permit;
                                worker.process_task(task).await;
                            });
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("Polling the task queue failed: {}", e);
                            tokio::time::sleep(self.config.error_backoff).await;
                        }
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!("Waiting for {} in-flight jobs", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Job task panicked: {}", e);
            }
        }

        info!("Worker stopped");
    }

    /// Run one job end to end and store its outcome
    pub async fn process_task(&self, task: TaskMessage) -> BatchOutcome {
        let job_id = task.job_id.clone();
        info!("Job {}: started ({} records)", job_id, task.records.len());

        if let Err(e) = self.queue.mark_started(&job_id).await {
            warn!("Job {}: could not mark as started: {}", job_id, e);
        }

        let outcome = dispatch_batch(&self.loader, self.queue.as_ref(), task).await;

        let label = match outcome.job_state() {
            JobState::Success => "success",
            _ => "failure",
        };
        metrics::counter!("nimbus_batch_jobs_total", "outcome" => label).increment(1);

        if let Err(e) = self.queue.complete(&job_id, outcome.clone()).await {
            error!("Job {}: could not store outcome: {}", job_id, e);
        }

        outcome
    }
}
