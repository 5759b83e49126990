use super::request::WorkRequest;
use crate::{
    interpret::{InterpretRequest, Interpretation, Interpreter},
    store::JobStore,
    telemetry::{decrement_jobs_inflight, increment_fallbacks, increment_jobs_completed},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// State shared by every worker in a pool.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub interpreter: Interpreter,
    pub store: JobStore,
    pub inflight: Arc<AtomicUsize>,
    pub shutdown_token: CancellationToken,
}

/// Worker task: processes [`WorkRequest`]s until told to shut down.
///
/// # Request Types
///
/// - [`WorkRequest::Resolve`] - Interpret, then perform exactly one
///   [`JobStore::complete`].
/// - [`WorkRequest::Interpret`] - Interpret, then reply on the oneshot.
/// - [`WorkRequest::Shutdown`] - Acknowledge and exit.
///
/// Once the shutdown token is cancelled, queued and in-progress requests are
/// answered with fallback text instead of waiting on the service, so no job is
/// left pending.
pub async fn worker_loop(worker_id: usize, mut rx: mpsc::Receiver<WorkRequest>, ctx: WorkerContext) {
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Resolve { id, request } => {
                let result = run(&ctx, &request).await;
                match ctx.store.complete(&id, result) {
                    Ok(true) => increment_jobs_completed(),
                    Ok(false) => tracing::debug!(%id, "Job was already complete"),
                    Err(e) => tracing::error!(%id, error = %e, "Failed to complete job"),
                }
                finish(&ctx);
            }
            WorkRequest::Interpret { request, response } => {
                let result = run(&ctx, &request).await;
                if response.send(result).is_err() {
                    tracing::debug!("Worker {worker_id}: caller dropped before reply");
                }
                finish(&ctx);
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");
                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    // A dispatch that raced shutdown can land behind the `Shutdown` message.
    rx.close();
    while let Ok(work) = rx.try_recv() {
        abandon(worker_id, &ctx, work);
    }

    tracing::trace!("Worker {worker_id} stopped");
}

/// Answers a request left in the queue after the worker stopped.
fn abandon(worker_id: usize, ctx: &WorkerContext, work: WorkRequest) {
    match work {
        WorkRequest::Resolve { id, request } => {
            increment_fallbacks("shutdown");
            match ctx.store.complete(&id, Interpretation::fallback(&request.hexagram)) {
                Ok(true) => increment_jobs_completed(),
                Ok(false) => {}
                Err(e) => tracing::error!(%id, error = %e, "Failed to complete job"),
            }
            finish(ctx);
        }
        WorkRequest::Interpret { request, response } => {
            increment_fallbacks("shutdown");
            let _ = response.send(Interpretation::fallback(&request.hexagram));
            finish(ctx);
        }
        WorkRequest::Shutdown { response } => {
            tracing::debug!("Worker {worker_id} already stopped");
            let _ = response.send(());
        }
    }
}

async fn run(ctx: &WorkerContext, request: &InterpretRequest) -> Interpretation {
    if ctx.shutdown_token.is_cancelled() {
        increment_fallbacks("shutdown");
        return Interpretation::fallback(&request.hexagram);
    }
    tokio::select! {
        result = ctx.interpreter.interpret(request) => result,
        () = ctx.shutdown_token.cancelled() => {
            tracing::warn!(hexagram = %request.hexagram, "Interpretation cancelled by shutdown");
            increment_fallbacks("shutdown");
            Interpretation::fallback(&request.hexagram)
        }
    }
}

fn finish(ctx: &WorkerContext) {
    ctx.inflight.fetch_sub(1, Ordering::AcqRel);
    decrement_jobs_inflight();
}
