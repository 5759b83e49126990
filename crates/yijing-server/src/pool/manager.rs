//! Bounded worker pool for interpretation requests.
//!
//! [`WorkerPool`] owns a fixed set of Tokio tasks, each reading from its own
//! bounded [`mpsc`] queue. Dispatch never waits: [`WorkerPool::try_dispatch`]
//! starts at the next worker in round-robin order and falls through to the
//! following one when a queue is full. When every queue is full the request is
//! rejected with [`Error::ServiceOverloaded`] and the caller decides how to
//! degrade.

use super::{
    request::WorkRequest,
    worker::{WorkerContext, worker_loop},
};
use crate::{
    Error, Result,
    interpret::Interpreter,
    store::JobStore,
    telemetry::increment_jobs_inflight,
};
use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_workers: usize,
    pub queue_depth: usize,
    /// Bound on each shutdown phase: draining, and each worker's ack.
    pub shutdown_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 5,
            queue_depth: 64,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    inflight: Arc<AtomicUsize>,
    accepting: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("inflight", &self.inflight())
            .field("accepting", &self.is_accepting())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Spawns `config.num_workers` workers on the current runtime.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: &PoolConfig, interpreter: Interpreter, store: JobStore) -> Self {
        let num_workers = config.num_workers.max(1);
        let queue_depth = config.queue_depth.max(1);
        let shutdown_token = CancellationToken::new();
        let inflight = Arc::new(AtomicUsize::new(0));

        let ctx = WorkerContext {
            interpreter,
            store,
            inflight: Arc::clone(&inflight),
            shutdown_token: shutdown_token.clone(),
        };

        let workers = (0..num_workers)
            .map(|worker_id| {
                let (tx, rx) = mpsc::channel(queue_depth);
                tokio::spawn(worker_loop(worker_id, rx, ctx.clone()));
                tx
            })
            .collect();

        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            inflight,
            accepting: AtomicBool::new(true),
            shutdown_token,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Requests queued or running.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Enqueues `request` without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once [`shutdown`](Self::shutdown) began.
    /// - [`Error::ServiceOverloaded`] if every queue is full.
    /// - [`Error::ChannelError`] if every worker has exited.
    pub fn try_dispatch(&self, request: WorkRequest) -> Result<()> {
        if !self.is_accepting() || self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        // Count before sending so a fast worker never decrements first.
        self.inflight.fetch_add(1, Ordering::AcqRel);

        let start = self.next_worker_index();
        let mut request = request;
        let mut closed = 0;
        for offset in 0..self.workers.len() {
            let worker_idx = (start + offset) % self.workers.len();
            match self.workers[worker_idx].try_send(request) {
                Ok(()) => {
                    increment_jobs_inflight();
                    return Ok(());
                }
                Err(TrySendError::Full(returned)) => request = returned,
                Err(TrySendError::Closed(returned)) => {
                    closed += 1;
                    request = returned;
                }
            }
        }

        self.inflight.fetch_sub(1, Ordering::AcqRel);
        if closed == self.workers.len() {
            Err(Error::ChannelError {
                context: "All worker channels closed".to_string(),
            })
        } else {
            Err(Error::ServiceOverloaded {
                details: format!("all {} worker queues are full", self.workers.len()),
            })
        }
    }

    /// Gracefully shuts down all workers in the pool. Idempotent.
    ///
    /// - Stops accepting new requests.
    /// - Waits up to `shutdown_timeout` for in-flight requests to drain.
    /// - Cancels the shared [`CancellationToken`]; anything still queued or
    ///   running completes with fallback text.
    /// - Sends [`WorkRequest::Shutdown`] to each worker and waits up to
    ///   `shutdown_timeout` per worker for the acknowledgement.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new requests ===
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("Refusing new interpretation requests");

        // === Phase 1: Wait for in-flight requests to drain ===
        tracing::info!("Draining in-flight requests ({} active)", self.inflight());
        let drained = timeout(self.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        match drained {
            Ok(()) => tracing::debug!("All in-flight requests drained"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} requests still active)",
                self.inflight()
            ),
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        // === Phase 3: Notify workers to shut down ===
        tracing::debug!("Notifying all workers to shut down");
        let mut acks = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            match timeout(
                self.shutdown_timeout,
                worker.send(WorkRequest::Shutdown { response: tx }),
            )
            .await
            {
                Ok(Ok(())) => acks.push((i, rx)),
                Ok(Err(e)) => tracing::error!("Failed to send shutdown to worker {i}: {e}"),
                Err(_) => tracing::warn!("Timed out sending shutdown to worker {i}"),
            }
        }

        let per_worker = self.shutdown_timeout;
        let waits = acks.into_iter().map(|(i, rx)| async move {
            match timeout(per_worker, rx).await {
                Ok(Ok(())) => tracing::trace!("Worker {i} shutdown acknowledged"),
                Ok(Err(e)) => tracing::error!("Worker {i} dropped its acknowledgement: {e}"),
                Err(_) => tracing::warn!("Worker {i} shutdown timed out"),
            }
        });
        futures::future::join_all(waits).await;

        tracing::info!("Worker pool shutdown complete");
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Releases workers blocked on a slow call if shutdown was skipped.
        self.shutdown_token.cancel();
    }
}
