//! The generate / poll / interpret orchestrator.
//!
//! [`DivinationService`] ties the caster, the resolver, the job store, the
//! worker pool and the record sink together. It is cheap to clone and is the
//! only thing the HTTP layer talks to.
//!
//! ## Guarantees
//!
//! - [`generate`](DivinationService::generate) never waits on a worker. If the
//!   pool cannot take the job, the job is completed on the spot with fallback
//!   text, so every job eventually reads `is_ready = true`.
//! - [`interpret_sync`](DivinationService::interpret_sync) never returns an
//!   error; every failure degrades to fallback text.

use crate::{
    Result,
    interpret::{InterpretRequest, Interpretation, Interpreter},
    pool::{PoolConfig, WorkRequest, WorkerPool},
    sink::{DivinationRecord, RecordSink},
    store::{JobId, JobStore, NewJob},
    telemetry::{increment_fallbacks, increment_jobs_completed, increment_jobs_created},
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use yijing::{CoinSource, Reading, Resolver, ThreadCoins, generate_reading};

/// Result of [`DivinationService::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generated {
    pub id: JobId,
    pub lines: Reading,
    pub hexagram: String,
}

/// Current state of a job, as seen by a poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub interpretation: String,
    pub advice: String,
    pub is_ready: bool,
}

/// Counts reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub jobs: usize,
    pub pending: usize,
    pub inflight: usize,
    pub workers: usize,
}

#[derive(Clone)]
pub struct DivinationService {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: Resolver,
    store: JobStore,
    pool: WorkerPool,
    sink: Arc<dyn RecordSink>,
    coins: Arc<dyn CoinSource + Send + Sync>,
    reply_timeout: Duration,
}

impl core::fmt::Debug for DivinationService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DivinationService")
            .field("pool", &self.inner.pool)
            .field("jobs", &self.inner.store.len())
            .finish_non_exhaustive()
    }
}

impl DivinationService {
    /// Creates the service and spawns its worker pool on the current runtime.
    pub fn new(
        resolver: Resolver,
        interpreter: Interpreter,
        sink: Arc<dyn RecordSink>,
        pool: &PoolConfig,
    ) -> Self {
        Self::with_coins(resolver, interpreter, sink, pool, Arc::new(ThreadCoins))
    }

    /// Like [`new`](Self::new) with an explicit coin source.
    pub fn with_coins(
        resolver: Resolver,
        interpreter: Interpreter,
        sink: Arc<dyn RecordSink>,
        pool: &PoolConfig,
        coins: Arc<dyn CoinSource + Send + Sync>,
    ) -> Self {
        // A synchronous caller may queue behind a full worker before its own
        // call starts.
        let reply_timeout = interpreter.timeout().saturating_mul(2);
        let store = JobStore::new();
        let pool = WorkerPool::spawn(pool, interpreter, store.clone());
        Self {
            inner: Arc::new(Inner {
                resolver,
                store,
                pool,
                sink,
                coins,
                reply_timeout,
            }),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Casts a reading, opens a job and queues its interpretation.
    #[tracing::instrument(skip_all)]
    pub fn generate(&self, matter: String) -> Generated {
        let inner = &*self.inner;
        let reading = generate_reading(inner.coins.as_ref());
        let hexagram = inner.resolver.resolve(&reading).name;

        let id = inner.store.create(NewJob {
            matter: matter.clone(),
            hexagram: hexagram.clone(),
            reading,
        });
        increment_jobs_created();
        tracing::debug!(%id, %hexagram, "Job created");

        let request = InterpretRequest {
            matter,
            hexagram: hexagram.clone(),
            lines: reading,
        };
        if let Err(e) = inner.pool.try_dispatch(WorkRequest::Resolve { id, request }) {
            tracing::warn!(%id, error = %e, "Worker pool unavailable, completing job with fallback");
            increment_fallbacks("pool");
            match inner.store.complete(&id, Interpretation::fallback(&hexagram)) {
                Ok(_) => increment_jobs_completed(),
                Err(e) => tracing::error!(%id, error = %e, "Failed to complete job"),
            }
        }

        Generated {
            id,
            lines: reading,
            hexagram,
        }
    }

    /// Reads the current state of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) for an unknown id.
    pub fn poll_result(&self, id: &JobId) -> Result<JobResult> {
        let job = self.inner.store.get(id)?;
        Ok(JobResult {
            interpretation: job.interpretation().to_string(),
            advice: job.advice().to_string(),
            is_ready: job.is_ready(),
        })
    }

    /// Interprets on the worker pool and waits for the answer, then appends
    /// the record to the sink.
    #[tracing::instrument(skip_all, fields(hexagram = %request.hexagram))]
    pub async fn interpret_sync(&self, request: InterpretRequest) -> Interpretation {
        let inner = &*self.inner;
        let (tx, rx) = oneshot::channel();
        let dispatched = inner.pool.try_dispatch(WorkRequest::Interpret {
            request: request.clone(),
            response: tx,
        });

        let result = match dispatched {
            Ok(()) => match tokio::time::timeout(inner.reply_timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => {
                    tracing::warn!("Worker dropped the reply, using fallback");
                    increment_fallbacks("channel");
                    Interpretation::fallback(&request.hexagram)
                }
                Err(_) => {
                    tracing::warn!("Timed out waiting for a worker, using fallback");
                    increment_fallbacks("timeout");
                    Interpretation::fallback(&request.hexagram)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Worker pool unavailable, using fallback");
                increment_fallbacks("pool");
                Interpretation::fallback(&request.hexagram)
            }
        };

        if let Err(e) = inner.sink.append(DivinationRecord::new(request, &result)).await {
            tracing::error!(error = %e, "Failed to record divination");
        }
        result
    }

    /// Every record in the sink, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`](crate::Error::Sink) if the sink cannot be read.
    pub async fn history(&self) -> Result<Vec<DivinationRecord>> {
        self.inner.sink.list().await
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            jobs: self.inner.store.len(),
            pending: self.inner.store.pending(),
            inflight: self.inner.pool.inflight(),
            workers: self.inner.pool.num_workers(),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.pool.is_accepting()
    }

    /// Drains and stops the worker pool.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.pool.shutdown().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::{interpret::InterpretationService, sink::MemorySink};

    /// Every toss lands yang, so every line is old yang and the hexagram is
    /// always 乾为天.
    pub struct AllYang;

    impl CoinSource for AllYang {
        fn toss(&self) -> bool {
            true
        }
    }

    pub fn service(
        backend: Arc<dyn InterpretationService>,
        num_workers: usize,
        queue_depth: usize,
    ) -> (DivinationService, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let service = DivinationService::with_coins(
            Resolver::default(),
            Interpreter::new(backend, Duration::from_secs(1), "建议："),
            sink.clone(),
            &PoolConfig {
                num_workers,
                queue_depth,
                shutdown_timeout: Duration::from_secs(1),
            },
            Arc::new(AllYang),
        );
        (service, sink)
    }
}
