//! Nimbus Core
//!
//! Core types, settings, and errors shared across the Nimbus components.
//!
//! This crate provides:
//! - Prediction records, batch outcomes, and job bookkeeping types
//! - The error taxonomy used at every request and job boundary
//! - Layered settings shared by the server and worker processes

pub mod error;
pub mod settings;
pub mod types;

pub use error::{Error, Result};
pub use settings::{QueueBackend, QueueSettings, RegistryBackend, RegistrySettings, Settings};
pub use types::{
    BatchOutcome, JobId, JobRecord, JobResult, JobState, PredictionRecord, Progress, TaskMessage,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        BatchOutcome, JobId, JobRecord, JobResult, JobState, PredictionRecord, Progress,
        TaskMessage,
    };
}
