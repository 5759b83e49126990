//! Bounded pool of interpretation workers.
//!
//! - [`request`] - Messages a worker understands.
//! - [`manager`] - [`WorkerPool`]: spawning, round-robin dispatch, shutdown.
//! - [`worker`] - The per-worker event loop.

pub mod manager;
pub mod request;
pub mod worker;

pub use manager::{PoolConfig, WorkerPool};
pub use request::WorkRequest;
