//! # `yijing-server`: cast now, interpret later
//!
//! An HTTP service around the [`yijing`] caster and resolver. A caller submits
//! a matter, gets a hexagram back immediately, and polls for the
//! natural-language interpretation that a slow, fallible text-generation
//! service produces in the background.
//!
//! ## Highlights
//!
//! - **Non-blocking generate**: casting and name resolution happen inline; the
//!   interpretation is queued and the call returns at once.
//! - **Bounded worker pool**: a fixed number of Tokio workers, each fed by a
//!   bounded queue, so a burst of requests cannot fan out into unbounded
//!   outbound calls.
//! - **Always completes**: every failure mode of the interpretation call
//!   (missing credential, timeout, error status, malformed body) degrades to
//!   fallback text and the job still turns ready.
//! - **Graceful shutdown**: Ctrl+C or SIGTERM drains in-flight jobs before the
//!   workers stop.
//!
//! ## Module Overview
//!
//! - [`store`] - In-memory job store with atomic terminal updates.
//! - [`interpret`] - Prompting, the DashScope client, advice splitting and
//!   fallbacks.
//! - [`pool`] - Worker pool and worker loop.
//! - [`service`] - The generate / poll / interpret orchestrator.
//! - [`sink`] - Append-only record store for completed interpretations.
//! - [`http`] - axum routes, CORS and health.
//! - [`config`] - CLI and environment configuration.
//! - [`telemetry`] - Logging, tracing and metrics setup.

pub mod config;
pub mod error;
pub mod http;
pub mod interpret;
pub mod pool;
pub mod service;
pub mod sink;
pub mod store;
pub mod telemetry;

pub use error::{Error, Result};
