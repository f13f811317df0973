//! Error taxonomy.
//!
//! Lookup and issuance errors propagate to the caller as terminal failures
//! of the invoking operation.  Transport-level failures are contained within
//! the session transport (which forces itself back to idle); frame decode
//! failures never surface at all; they are logged and the session continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("application not found: {0}")]
    ApplicationNotFound(String),
    #[error("controller not found: {0}")]
    ControllerNotFound(String),
    #[error("controller name must not be empty")]
    EmptyControllerName,
    #[error("token issuance rejected: {0}")]
    TokenIssuance(String),
    #[error("backend: {0}")]
    Backend(String),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not idle")]
    NotIdle,
    #[error("transport is not connected")]
    NotConnected,
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("WS: {0}")]
    Ws(String),
}
