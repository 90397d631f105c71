//! Nimbus Server
//!
//! HTTP front end of the serving system:
//! - `POST /v1/predict` predicts one record synchronously with the lazily
//!   loaded model
//! - `POST /v1/batch` queues a batch for a worker and `GET /v1/batch/{id}`
//!   reports its state and result
//!
//! The model is resolved on the first prediction, not at startup, so the
//! service comes up (and stays up) while no model has been promoted yet.

pub mod config;
pub mod predict;
pub mod routes;
pub mod state;

pub use config::Cli;
pub use predict::dispatch_prediction;
pub use routes::{create_router, AppError};
pub use state::AppState;
