//! Nimbus batch worker
//!
//! Takes batch jobs off the task queue, predicts them with the model the
//! registry serves under the configured alias, and stores the outcome for
//! the HTTP service to report.

use anyhow::Result;
use clap::Parser;
use nimbus_model::{build_registry, LoaderConfig, ModelLoader};
use nimbus_queue::build_queue;
use nimbus_worker::{Cli, Worker, WorkerConfig};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    info!("Starting Nimbus worker");

    let settings = cli.load_settings()?;
    info!(
        "Model: {}@{} via {}",
        settings.registry.model_name,
        settings.registry.model_alias,
        settings.registry.tracking_uri
    );

    let registry = build_registry(&settings.registry)?;
    let loader = Arc::new(ModelLoader::new(
        registry,
        LoaderConfig::from(&settings.registry),
    ));

    if settings.registry.preload {
        // A failed preload is not fatal; jobs retry the load
        if let Err(e) = loader.preload().await {
            warn!("Model preload failed: {}", e);
        }
    }

    let queue = build_queue(&settings.queue).await?;

    let mut config = WorkerConfig::default();
    if let Some(concurrency) = cli.concurrency {
        config = config.with_concurrency(concurrency);
    }

    let worker = Worker::new(loader, queue, config);
    worker
        .run(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, draining jobs...");
        })
        .await;

    info!("Worker shutdown complete");
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
        EnvFilter::new("nimbus_worker=debug,nimbus_model=debug,nimbus_queue=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("nimbus_worker=info,nimbus_model=info,nimbus_queue=info")
        })
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
