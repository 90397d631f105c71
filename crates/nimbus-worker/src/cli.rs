use clap::Parser;
use nimbus_core::{Result, Settings};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nimbus-worker")]
#[command(version, about = "Nimbus batch prediction worker", long_about = None)]
pub struct Cli {
    /// Settings file (YAML); missing files fall back to defaults
    #[arg(short, long, default_value = "nimbus.yaml")]
    pub config: PathBuf,

    /// Model registry tracking URI
    #[arg(long, env = "MLFLOW_TRACKING_URI")]
    pub tracking_uri: Option<String>,

    /// Redis URL of the task queue
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Jobs executed at the same time (defaults to the number of CPUs)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Load the model before taking the first job
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
        if let Some(url) = &self.redis_url {
            settings.queue.redis_url = url.clone();
        }
        if self.preload {
            settings.registry.preload = true;
        }

        settings.validate()?;
        Ok(settings)
    }
}
