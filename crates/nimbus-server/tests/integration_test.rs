//! Integration tests for the Nimbus HTTP API

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use nimbus_model::{FileModelRegistry, LoaderConfig, ModelLoader};
use nimbus_queue::{MemoryQueue, TaskQueue};
use nimbus_server::{create_router, AppState};
use nimbus_worker::{Worker, WorkerConfig};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const REFERENCE_MODELS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../models");

struct TestApp {
    router: Router,
    index: PathBuf,
    loader: Arc<ModelLoader>,
    queue: Arc<dyn TaskQueue>,
}

fn loader_for(index: &Path) -> Arc<ModelLoader> {
    Arc::new(ModelLoader::new(
        Arc::new(FileModelRegistry::new(index)),
        LoaderConfig::new("nimbus-classifier", "production"),
    ))
}

fn app_with_index(index: PathBuf) -> TestApp {
    let loader = loader_for(&index);
    let queue: Arc<dyn TaskQueue> = Arc::new(MemoryQueue::new());
    let router = create_router(AppState::new(loader.clone(), queue.clone()));
    TestApp {
        router,
        index,
        loader,
        queue,
    }
}

fn reference_app() -> TestApp {
    app_with_index(Path::new(REFERENCE_MODELS).join("registry.yaml"))
}

/// Publish the reference model into an empty registry directory
fn publish_reference_model(dir: &Path) {
    let artifact_dir = dir.join("nimbus-classifier/1");
    std::fs::create_dir_all(&artifact_dir).unwrap();
    std::fs::copy(
        Path::new(REFERENCE_MODELS).join("nimbus-classifier/1/linear_model.json"),
        artifact_dir.join("linear_model.json"),
    )
    .unwrap();
    std::fs::copy(
        Path::new(REFERENCE_MODELS).join("registry.yaml"),
        dir.join("registry.yaml"),
    )
    .unwrap();
}

/// Run a worker with its own loader on the app's queue until the returned
/// sender fires
fn spawn_worker(app: &TestApp) -> (Arc<ModelLoader>, tokio::sync::oneshot::Sender<()>) {
    let worker_loader = loader_for(&app.index);
    let worker = Worker::new(
        worker_loader.clone(),
        app.queue.clone(),
        WorkerConfig::default()
            .with_concurrency(2)
            .with_poll_wait(Duration::from_millis(20)),
    );
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        worker
            .run(async {
                let _ = stop_rx.await;
            })
            .await;
    });
    (worker_loader, stop_tx)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn setosa() -> Value {
    json!({
        "sepal_length": 5.1,
        "sepal_width": 3.5,
        "petal_length": 1.4,
        "petal_width": 0.2
    })
}

async fn poll_until_terminal(router: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(router, get(&format!("/v1/batch/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "SUCCESS" || body["status"] == "FAILURE" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn test_root_endpoint() {
    let app = reference_app();
    let (status, body) = send(&app.router, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "NimbusAPI is running." }));
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = reference_app();
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_predict_setosa() {
    let app = reference_app();
    let (status, body) = send(&app.router, post_json("/v1/predict", setosa())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "prediction": 0 }));
}

#[tokio::test]
async fn test_model_is_loaded_lazily_and_once() {
    let app = reference_app();

    let (_, status) = send(&app.router, get("/v1/model")).await;
    assert_eq!(status["state"], "unloaded");
    assert_eq!(app.loader.resolution_count(), 0);

    for _ in 0..5 {
        let (code, _) = send(&app.router, post_json("/v1/predict", setosa())).await;
        assert_eq!(code, StatusCode::OK);
    }

    let (_, status) = send(&app.router, get("/v1/model")).await;
    assert_eq!(status["state"], "loaded");
    assert_eq!(status["model"]["version"], "1");
    assert_eq!(app.loader.resolution_count(), 1);
}

#[tokio::test]
async fn test_predict_unavailable_then_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with_index(dir.path().join("registry.yaml"));

    let (status, body) = send(&app.router, post_json("/v1/predict", setosa())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body["error"].as_str().unwrap().is_empty());

    let (_, model) = send(&app.router, get("/v1/model")).await;
    assert_eq!(model["state"], "failed");

    // The process is still serving
    let (status, _) = send(&app.router, get("/")).await;
    assert_eq!(status, StatusCode::OK);

    publish_reference_model(dir.path());

    let (status, body) = send(&app.router, post_json("/v1/predict", setosa())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], 0);
    assert_eq!(app.loader.resolution_count(), 2);
}

#[tokio::test]
async fn test_predict_rejects_malformed_record() {
    let app = reference_app();

    let missing_field = json!({ "sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4 });
    let (status, _) = send(&app.router, post_json("/v1/predict", missing_field)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let not_a_number = json!({
        "sepal_length": "wide",
        "sepal_width": 3.5,
        "petal_length": 1.4,
        "petal_width": 0.2
    });
    let (status, _) = send(&app.router, post_json("/v1/predict", not_a_number)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Rejected before dispatch, so nothing was loaded
    assert_eq!(app.loader.resolution_count(), 0);
}

#[tokio::test]
async fn test_batch_submit_returns_pending() {
    let app = reference_app();
    let (status, body) = send(&app.router, post_json("/v1/batch", json!([setosa(), setosa()]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    let job_id = body["job_id"].as_str().unwrap();
    assert!(!job_id.is_empty());

    let (status, body) = send(&app.router, get(&format!("/v1/batch/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["result"], Value::Null);
}

#[tokio::test]
async fn test_unknown_job_reads_pending() {
    let app = reference_app();
    let (status, body) = send(&app.router, get("/v1/batch/no-such-job")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "job_id": "no-such-job", "status": "PENDING", "result": null })
    );
}

#[tokio::test]
async fn test_batch_job_succeeds() {
    let app = reference_app();
    let (_, stop) = spawn_worker(&app);

    let records = json!([
        setosa(),
        { "sepal_length": 7.0, "sepal_width": 3.2, "petal_length": 4.7, "petal_width": 1.4 },
        { "sepal_length": 6.3, "sepal_width": 3.3, "petal_length": 6.0, "petal_width": 2.5 }
    ]);
    let (_, submitted) = send(&app.router, post_json("/v1/batch", records)).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let body = poll_until_terminal(&app.router, &job_id).await;
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(
        body["result"],
        json!({ "status": "Complete", "count": 3, "results": [0, 1, 2] })
    );

    let _ = stop.send(());
}

#[tokio::test]
async fn test_worker_load_leaves_server_model_untouched() {
    let app = reference_app();
    let (worker_loader, stop) = spawn_worker(&app);

    let (_, submitted) = send(&app.router, post_json("/v1/batch", json!([setosa()]))).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let body = poll_until_terminal(&app.router, &job_id).await;
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(worker_loader.resolution_count(), 1);

    // The batch load happened in the worker role only
    assert_eq!(app.loader.resolution_count(), 0);
    let (_, status) = send(&app.router, get("/v1/model")).await;
    assert_eq!(status["state"], "unloaded");

    let (code, _) = send(&app.router, post_json("/v1/predict", setosa())).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(app.loader.resolution_count(), 1);
    assert_eq!(worker_loader.resolution_count(), 1);

    let _ = stop.send(());
}

#[tokio::test]
async fn test_batch_job_fails_while_model_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with_index(dir.path().join("registry.yaml"));
    let (_, stop) = spawn_worker(&app);

    let (status, submitted) = send(
        &app.router,
        post_json("/v1/batch", json!([setosa(), setosa(), setosa()])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let body = poll_until_terminal(&app.router, &job_id).await;
    assert_eq!(body["status"], "FAILURE");
    assert_eq!(body["result"]["status"], "Failed");
    assert!(!body["result"]["error"].as_str().unwrap().is_empty());
    assert!(body["result"].get("results").is_none());

    let _ = stop.send(());
}

#[tokio::test]
async fn test_oversized_batch_is_rejected() {
    let loader = loader_for(&Path::new(REFERENCE_MODELS).join("registry.yaml"));
    let queue: Arc<dyn TaskQueue> = Arc::new(MemoryQueue::new());
    let router = create_router(AppState::new(loader, queue).with_body_limit(1024));

    let records: Vec<Value> = (0..100).map(|_| setosa()).collect();
    let (status, _) = send(&router, post_json("/v1/batch", Value::Array(records))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = reference_app();
    let (status, body) = send(&app.router, get("/v2/nothing")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}
