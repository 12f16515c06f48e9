// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the client runtime.

use thiserror::Error;

/// Errcode the server uses for rate limiting.
pub const M_LIMIT_EXCEEDED: &str = "M_LIMIT_EXCEEDED";
/// Errcode the server uses for unknown resources, such as a stale filter id.
pub const M_NOT_FOUND: &str = "M_NOT_FOUND";

/// A failed call to the homeserver.
///
/// `status` is `None` when the request never produced an HTTP response
/// (connection refused, timeout, DNS failure).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct TransportError {
    pub status: Option<u16>,
    pub errcode: Option<String>,
    pub message: String,
    /// Server-suggested wait before retrying.
    pub retry_after_ms: Option<u64>,
}

impl TransportError {
    /// A connectivity failure with no HTTP response.
    pub fn connectivity(message: impl Into<String>) -> Self {
        TransportError { status: None, errcode: None, message: message.into(), retry_after_ms: None }
    }

    /// An HTTP error response.
    pub fn http(status: u16, errcode: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError { status: Some(status), errcode: Some(errcode.into()), message: message.into(), retry_after_ms: None }
    }

    /// A rate-limit response, optionally carrying the server's suggested wait.
    pub fn rate_limited(retry_after_ms: Option<u64>) -> Self {
        TransportError {
            status: Some(429),
            errcode: Some(M_LIMIT_EXCEEDED.to_string()),
            message: "too many requests".to_string(),
            retry_after_ms,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429) || self.errcode.as_deref() == Some(M_LIMIT_EXCEEDED)
    }

    pub fn is_connectivity(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404) || self.errcode.as_deref() == Some(M_NOT_FOUND)
    }

    /// A 4xx response: the server is reachable but refused the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(400..=499))
    }

    fn describe(&self) -> String {
        match (self.status, self.errcode.as_deref()) {
            (Some(status), Some(code)) => format!("{status} {code}: {}", self.message),
            (Some(status), None) => format!("{status}: {}", self.message),
            (None, _) => format!("connection error: {}", self.message),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors from a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached. Callers may retry later.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// All errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] mx_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sync has been stopped")]
    Stopped,

    #[error("event was cancelled before it was sent")]
    Cancelled,

    #[error("channel closed")]
    ChannelClosed,
}

impl ClientError {
    /// The underlying transport error, if this error came from the server.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            ClientError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
