//! Nimbus Queue
//!
//! The task queue carries batch jobs from the HTTP service to workers and
//! stores job state and results for polling. Two adapters share one trait:
//! - `MemoryQueue`: in-process, for an embedded worker and for tests
//! - `RedisQueue`: Redis lists and keys, for separate worker processes

pub mod memory;
pub mod queue;
pub mod redis_queue;

pub use memory::MemoryQueue;
pub use queue::{build_queue, TaskQueue};
pub use redis_queue::RedisQueue;
