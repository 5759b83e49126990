//! Error types for the divination service.
//!
//! This module defines the central `Error` enum. Most variants never reach a
//! client: interpretation failures are recovered into fallback text by the
//! worker, and pool saturation is recovered by the orchestrator. Only
//! `NotFound` and boundary validation errors are surfaced, through the
//! `IntoResponse` impl, as JSON `{"detail": ...}` bodies.
//!
//! ## Error Cases
//! - `NotFound`: An unknown (or unparsable) job token.
//! - `ServiceUnavailable`: The interpretation call failed, timed out, or
//!   returned something unusable.
//! - `Configuration`: No credential is configured for the interpretation
//!   service.
//! - `ServiceOverloaded`: Every worker queue is full.
//! - `ServiceShutdown`: Work arrived while the pool is shutting down.
//! - `ChannelError`: An internal channel closed unexpectedly.
//! - `InvalidRequest`: The client payload failed validation.
//! - `Sink`: The record sink could not be read or written.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the divination service.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// No job is stored under this token.
    #[error("Divination result not found: {id}")]
    NotFound { id: String },

    /// The interpretation service failed or produced nothing usable.
    #[error("Interpretation service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    /// The interpretation service is not configured (e.g. missing credential).
    #[error("Interpretation service misconfigured: {reason}")]
    Configuration { reason: String },

    /// All worker queues are full.
    #[error("Service is overloaded: {details}")]
    ServiceOverloaded { details: String },

    /// The worker pool no longer accepts work.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The client payload was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Reading or writing the record sink failed.
    #[error("Record sink error: {context}")]
    Sink { context: String },
}

impl From<yijing::Error> for Error {
    fn from(err: yijing::Error) -> Self {
        Self::InvalidRequest {
            reason: err.to_string(),
        }
    }
}

impl From<yijing::ParseLineError> for Error {
    fn from(err: yijing::ParseLineError) -> Self {
        yijing::Error::from(err).into()
    }
}

impl From<yijing::ReadingLengthError> for Error {
    fn from(err: yijing::ReadingLengthError) -> Self {
        yijing::Error::from(err).into()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl Error {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ServiceUnavailable { .. }
            | Self::ServiceOverloaded { .. }
            | Self::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration { .. } | Self::ChannelError { .. } | Self::Sink { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
