//! Transport error types

use thiserror::Error;

/// Transport failure with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn status(code: u16) -> Self {
        Self::new(
            TransportErrorKind::Status(code),
            format!("HTTP error! status: {code}"),
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn body(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Body, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidRequest, message)
    }

    pub fn idle_timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::IdleTimeout, message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else if e.is_body() || e.is_decode() {
            Self::body(format!("Failed to read stream: {e}"))
        } else {
            Self::network(format!("Request failed: {e}"))
        }
    }
}

/// Error classification. Every kind is a connection-class failure from the
/// orchestrator's point of view; the kind only feeds logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Non-success HTTP status
    Status(u16),
    /// Could not reach the backend
    Network,
    /// Response body failed mid-stream
    Body,
    /// Caller passed something unusable (e.g. empty message id)
    InvalidRequest,
    /// No bytes arrived within the configured idle window
    IdleTimeout,
}
