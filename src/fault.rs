//! Failure taxonomy and the handler-side fault type.

use std::fmt;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Why a request did not produce a normal reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum FailureKind {
    /// No route matches the path under any method.
    NotFound,
    /// The path is routed, but not for this method.
    MethodNotAllowed,
    /// A parameter or the body could not be bound.
    BadRequest,
    /// The handler returned a fault, panicked or timed out.
    HandlerError,
    /// The reply named a view that could not be rendered.
    RenderError,
    /// The route table and the matcher disagree. Always a bug.
    InternalInconsistency,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound              => "NotFound",
            Self::MethodNotAllowed      => "MethodNotAllowed",
            Self::BadRequest            => "BadRequest",
            Self::HandlerError          => "HandlerError",
            Self::RenderError           => "RenderError",
            Self::InternalInconsistency => "InternalInconsistency",
        }
    }

    pub fn default_status(self) -> StatusCode {
        match self {
            Self::NotFound         => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest       => StatusCode::BAD_REQUEST,
            Self::HandlerError
            | Self::RenderError
            | Self::InternalInconsistency => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value a handler returns instead of a reply.
///
/// Without a status the fault becomes `500 Internal Server Error`; a status
/// set with [`HandlerFault::with_status`] is used as-is by the default
/// [`FaultPolicy`].
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct HandlerFault {
    status: Option<StatusCode>,
    message: String,
}

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, message: message.into() }
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status: Some(status), message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Decides the response status for a handler fault.
///
/// This is the hook for centralised error handling: install one with
/// [`DispatcherBuilder::fault_policy`](crate::DispatcherBuilder::fault_policy).
pub trait FaultPolicy: Send + Sync + 'static {
    fn status_for(&self, fault: &HandlerFault) -> StatusCode;
}

/// Uses the fault's own status, or `500`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFaultPolicy;

impl FaultPolicy for DefaultFaultPolicy {
    fn status_for(&self, fault: &HandlerFault) -> StatusCode {
        fault.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl<F> FaultPolicy for F
where
    F: Fn(&HandlerFault) -> StatusCode + Send + Sync + 'static,
{
    fn status_for(&self, fault: &HandlerFault) -> StatusCode {
        self(fault)
    }
}
