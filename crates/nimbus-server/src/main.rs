//! Nimbus Server
//!
//! Serves synchronous predictions and accepts batch jobs. The model is
//! resolved against the registry on the first prediction request.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use nimbus_model::{build_registry, LoaderConfig, ModelLoader};
use nimbus_queue::build_queue;
use nimbus_server::{create_router, AppState, Cli};
use nimbus_worker::{Worker, WorkerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    info!("Starting Nimbus server");

    let settings = cli.load_settings()?;
    info!(
        "Model: {}@{} via {}",
        settings.registry.model_name,
        settings.registry.model_alias,
        settings.registry.tracking_uri
    );

    let metrics_handle = init_metrics()?;

    cli.check_queue_roles(&settings)?;

    let registry = build_registry(&settings.registry)?;
    let loader_config = LoaderConfig::from(&settings.registry);
    let loader = Arc::new(ModelLoader::new(registry.clone(), loader_config.clone()));

    if settings.registry.preload {
        // The service stays up without a model; requests retry the load
        if let Err(e) = loader.preload().await {
            warn!("Model preload failed: {}", e);
        }
    }

    let queue = build_queue(&settings.queue).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_task = if cli.embedded_worker {
        info!("Starting embedded batch worker");
        // The worker role keeps its own loader state, as a separate process would
        let worker_loader = Arc::new(ModelLoader::new(registry, loader_config));
        let worker = Worker::new(worker_loader, queue.clone(), WorkerConfig::default());
        let mut shutdown_rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            worker
                .run(async move {
                    let _ = shutdown_rx.changed().await;
                })
                .await;
        }))
    } else {
        None
    };

    let state = AppState::new(loader, queue)
        .with_metrics(metrics_handle)
        .with_body_limit(cli.body_limit);
    let app = create_router(state);

    let addr: SocketAddr = cli.listen_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
        let _ = shutdown_tx.send(true);
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Some(worker_task) = worker_task {
        if let Err(e) = worker_task.await {
            warn!("Embedded worker ended abnormally: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new(
            "nimbus_server=debug,nimbus_model=debug,nimbus_queue=debug,nimbus_worker=debug,tower_http=debug",
        )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("nimbus_server=info,nimbus_model=info,nimbus_queue=info,nimbus_worker=info")
        })
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "nimbus_requests_total",
        "Total number of API requests by endpoint"
    );
    metrics::describe_counter!(
        "nimbus_predictions_total",
        "Records predicted, by mode (sync or batch)"
    );
    metrics::describe_counter!(
        "nimbus_model_loads_total",
        "Model load attempts by outcome"
    );
    metrics::describe_counter!(
        "nimbus_batch_jobs_total",
        "Batch jobs finished by outcome"
    );
    metrics::describe_histogram!(
        "nimbus_predict_latency_us",
        metrics::Unit::Microseconds,
        "Single-record prediction latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
