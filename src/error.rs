//! Error types for setup and infrastructure.
//!
//! Per-request failures never show up here: the dispatcher turns them into
//! HTTP [`Response`](crate::Response) values. These types surface mistakes
//! made while building the route table and failures of the transport.

use thiserror::Error;

use crate::method::Method;
use crate::pattern::PatternError;
use crate::signature::SignatureError;

/// Registration failure.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("duplicate route {method} {pattern} (already registered as {existing})")]
    Duplicate { method: Method, pattern: String, existing: String },
}

/// Transport failure: binding the listener or accepting connections.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address: {0}")]
    Addr(#[from] std::net::AddrParseError),
}
