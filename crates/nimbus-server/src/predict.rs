//! Prediction dispatch for single records

use nimbus_core::{PredictionRecord, Result};
use nimbus_model::ModelLoader;
use std::time::Instant;
use tracing::debug;

/// Predict the class label of one record
///
/// Loads the model on first use. A model that cannot be loaded comes back
/// as an error for the caller to report; the process keeps serving.
pub async fn dispatch_prediction(loader: &ModelLoader, record: PredictionRecord) -> Result<i64> {
    let model = loader.get_model().await?;

    let start = Instant::now();
    let label = model.predict_one(&record)?;
    let elapsed = start.elapsed();

    metrics::histogram!("nimbus_predict_latency_us").record(elapsed.as_micros() as f64);
    metrics::counter!("nimbus_predictions_total", "mode" => "sync").increment(1);
    debug!("Predicted class {} in {:?}", label, elapsed);

    Ok(label)
}
