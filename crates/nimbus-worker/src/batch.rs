//! Batch dispatch: one queued job in, one terminal outcome out

use nimbus_core::{BatchOutcome, Progress, TaskMessage};
use nimbus_model::ModelLoader;
use nimbus_queue::TaskQueue;
use tracing::{debug, error, info, warn};

/// Run one batch job against the worker's loader
///
/// Every failure ends as a `Failed` outcome; nothing propagates past the
/// job boundary. The whole batch is predicted in one call, so a failure
/// never leaves partial results behind.
pub async fn dispatch_batch(
    loader: &ModelLoader,
    queue: &dyn TaskQueue,
    task: TaskMessage,
) -> BatchOutcome {
    let TaskMessage { job_id, records } = task;
    let total = records.len();

    let model = match loader.get_model().await {
        Ok(model) => model,
        Err(e) => {
            error!("Job {}: model unavailable: {}", job_id, e);
            return BatchOutcome::failed(e.to_string());
        }
    };

    if let Err(e) = queue
        .update_progress(&job_id, Progress::new(0, total))
        .await
    {
        warn!("Job {}: could not publish progress: {}", job_id, e);
    }

    debug!("Job {}: predicting {} records", job_id, total);

    let predicted = tokio::task::spawn_blocking(move || model.predict(&records)).await;

    match predicted {
        Ok(Ok(results)) => {
            info!("Job {}: predicted {} records", job_id, results.len());
            metrics::counter!("nimbus_predictions_total", "mode" => "batch")
                .increment(results.len() as u64);
            BatchOutcome::complete(results)
        }
        Ok(Err(e)) => {
            error!("Job {}: prediction failed: {}", job_id, e);
            BatchOutcome::failed(e.to_string())
        }
        Err(e) => {
            error!("Job {}: prediction task aborted: {}", job_id, e);
            BatchOutcome::failed(format!("prediction task aborted: {}", e))
        }
    }
}
