use crate::{
    interpret::{InterpretRequest, Interpretation},
    store::JobId,
};
use tokio::sync::oneshot;

/// A message sent from the [`WorkerPool`](super::WorkerPool) to one worker.
#[derive(Debug)]
pub enum WorkRequest {
    /// Interpret and write the terminal result into the job store.
    ///
    /// - `id`: The pending job to complete.
    /// - `request`: Matter, hexagram name and reading.
    Resolve {
        id: JobId,
        request: InterpretRequest,
    },

    /// Interpret and hand the result back to a waiting caller.
    ///
    /// - `response`: Receives the interpretation (possibly fallback text). A
    ///   dropped receiver is not an error.
    Interpret {
        request: InterpretRequest,
        response: oneshot::Sender<Interpretation>,
    },

    /// Request the worker to shut down gracefully.
    ///
    /// - `response`: Acknowledged once the worker leaves its loop.
    Shutdown { response: oneshot::Sender<()> },
}
