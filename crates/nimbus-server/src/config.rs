//! Command line and settings for the HTTP service

use clap::Parser;
use nimbus_core::{Error, QueueBackend, Result, Settings};
use std::path::PathBuf;

use crate::state::DEFAULT_BODY_LIMIT;

#[derive(Parser, Debug)]
#[command(name = "nimbus-server")]
#[command(version, about = "Nimbus model serving API", long_about = None)]
pub struct Cli {
    /// Settings file (YAML); missing files fall back to defaults
    #[arg(short, long, default_value = "nimbus.yaml")]
    pub config: PathBuf,

    /// Model registry tracking URI
    #[arg(long, env = "MLFLOW_TRACKING_URI")]
    pub tracking_uri: Option<String>,

    /// Task queue backend: memory or redis
    #[arg(long, value_parser = parse_queue_backend)]
    pub queue: Option<QueueBackend>,

    /// Redis URL of the task queue
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    pub listen: String,

    /// Listen port
    #[arg(short = 'P', long, default_value = "8000")]
    pub port: u16,

    /// Run a batch worker inside the server process
    #[arg(long)]
    pub embedded_worker: bool,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// Load the model at startup instead of on the first request
    #[arg(long)]
    pub preload: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// Settings file plus environment, then command-line overrides
    pub fn load_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(Some(&self.config))?;

        if let Some(uri) = &self.tracking_uri {
            settings.registry.tracking_uri = uri.clone();
        }
        if let Some(backend) = self.queue {
            settings.queue.backend = backend;
        }
        if let Some(url) = &self.redis_url {
            settings.queue.redis_url = url.clone();
        }
        if self.preload {
            settings.registry.preload = true;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject queue setups in which submitted batches could never run
    ///
    /// The in-process queue is only drained by an embedded worker.
    pub fn check_queue_roles(&self, settings: &Settings) -> Result<()> {
        if settings.queue.backend == QueueBackend::Memory && !self.embedded_worker {
            return Err(Error::config(
                "the memory queue needs --embedded-worker; batch jobs would stay PENDING",
            ));
        }
        Ok(())
    }

    /// Socket address to bind
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

fn parse_queue_backend(s: &str) -> std::result::Result<QueueBackend, String> {
    match s.to_ascii_lowercase().as_str() {
        "memory" => Ok(QueueBackend::Memory),
        "redis" => Ok(QueueBackend::Redis),
        other => Err(format!("unknown queue backend '{}' (expected memory or redis)", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["nimbus-server"]);
        assert_eq!(cli.listen_addr(), "0.0.0.0:8000");
        assert_eq!(cli.body_limit, DEFAULT_BODY_LIMIT);
        assert!(!cli.embedded_worker);
        assert!(cli.queue.is_none());
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "nimbus-server",
            "--config",
            "/nonexistent/nimbus.yaml",
            "--tracking-uri",
            "http://registry:5000",
            "--queue",
            "memory",
            "--embedded-worker",
        ]);

        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.registry.tracking_uri, "http://registry:5000");
        assert_eq!(settings.queue.backend, QueueBackend::Memory);
        assert!(cli.embedded_worker);
    }

    #[test]
    fn test_memory_queue_requires_embedded_worker() {
        let without_worker = Cli::parse_from([
            "nimbus-server",
            "--config",
            "/nonexistent/nimbus.yaml",
            "--queue",
            "memory",
        ]);
        let settings = without_worker.load_settings().unwrap();
        assert!(matches!(
            without_worker.check_queue_roles(&settings),
            Err(Error::Config(_))
        ));

        let with_worker = Cli::parse_from([
            "nimbus-server",
            "--config",
            "/nonexistent/nimbus.yaml",
            "--queue",
            "memory",
            "--embedded-worker",
        ]);
        assert!(with_worker.check_queue_roles(&settings).is_ok());

        let redis = Cli::parse_from([
            "nimbus-server",
            "--config",
            "/nonexistent/nimbus.yaml",
            "--queue",
            "redis",
        ]);
        let settings = redis.load_settings().unwrap();
        assert_eq!(settings.queue.backend, QueueBackend::Redis);
        assert!(redis.check_queue_roles(&settings).is_ok());
    }

    #[test]
    fn test_rejects_unknown_queue() {
        assert!(Cli::try_parse_from(["nimbus-server", "--queue", "kafka"]).is_err());
    }
}
