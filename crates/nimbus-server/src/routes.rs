//! HTTP routes and handlers

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use nimbus_core::{Error, JobId, JobResult, JobState, PredictionRecord};
use nimbus_model::LoaderStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::predict::dispatch_prediction;
use crate::state::AppState;

/// Message returned while no model can be loaded
pub const MODEL_NOT_READY: &str =
    "Model is not ready or not found. Please train and promote a model.";

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.body_limit;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/predict", post(predict))
        .route("/v1/batch", post(submit_batch))
        .route("/v1/batch/:job_id", get(batch_status))
        .route("/v1/model", get(model_status))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "status": "NimbusAPI is running." }))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    match &state.metrics_handle {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: i64,
}

async fn predict(
    State(state): State<AppState>,
    Json(record): Json<PredictionRecord>,
) -> Result<Json<PredictResponse>, AppError> {
    metrics::counter!("nimbus_requests_total", "endpoint" => "predict").increment(1);

    let prediction = dispatch_prediction(&state.loader, record).await?;
    Ok(Json(PredictResponse { prediction }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitBatchResponse {
    pub job_id: JobId,
    pub status: JobState,
}

async fn submit_batch(
    State(state): State<AppState>,
    Json(records): Json<Vec<PredictionRecord>>,
) -> Result<Json<SubmitBatchResponse>, AppError> {
    metrics::counter!("nimbus_requests_total", "endpoint" => "batch").increment(1);

    let count = records.len();
    let job_id = state.queue.submit(records).await?;
    info!("Queued batch job {} ({} records)", job_id, count);

    Ok(Json(SubmitBatchResponse {
        job_id,
        status: JobState::Pending,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchStatusResponse {
    pub job_id: JobId,
    pub status: JobState,
    pub result: Option<JobResult>,
}

async fn batch_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<BatchStatusResponse>, AppError> {
    metrics::counter!("nimbus_requests_total", "endpoint" => "batch_status").increment(1);

    let record = state.queue.query(&JobId::from(job_id)).await?;
    Ok(Json(BatchStatusResponse {
        job_id: record.job_id,
        status: record.state,
        result: record.result,
    }))
}

async fn model_status(State(state): State<AppState>) -> Json<LoaderStatus> {
    Json(state.loader.status())
}

async fn fallback() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Handler errors mapped to HTTP responses
#[derive(Debug)]
pub enum AppError {
    /// No model could be loaded (503)
    ModelUnavailable(String),
    /// The loaded model failed on the input (500)
    Inference(String),
    /// The task queue could not be reached (503)
    QueueUnavailable(String),
    /// Anything else (500)
    Internal(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            e if e.is_model_unavailable() => AppError::ModelUnavailable(e.to_string()),
            Error::InferenceFailure(msg) => AppError::Inference(msg),
            Error::Queue(msg) => AppError::QueueUnavailable(msg),
            e => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::ModelUnavailable(detail) => {
                warn!("Model unavailable: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": MODEL_NOT_READY, "detail": detail }),
                )
            }
            AppError::Inference(msg) => {
                error!("Inference failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": format!("Inference failed: {}", msg) }),
                )
            }
            AppError::QueueUnavailable(msg) => {
                error!("Task queue unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": format!("Task queue unavailable: {}", msg) }),
                )
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (
                Error::registry_unavailable("connection refused"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::model_not_found("nimbus-classifier", "production"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::inference("shape mismatch"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (Error::queue("broken pipe"), StatusCode::SERVICE_UNAVAILABLE),
            (Error::internal("oops"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
