//! Nimbus Worker
//!
//! Executes batch prediction jobs taken from the task queue. Each worker
//! process owns its own `ModelLoader`, so the model is resolved at most once
//! per process and a registry outage only fails the jobs that hit it.

pub mod batch;
pub mod cli;
pub mod worker;

pub use batch::dispatch_batch;
pub use cli::Cli;
pub use worker::{Worker, WorkerConfig};
