//! Error types for gamecloud
//!
//! Centralized error handling using thiserror. `GamecloudError` covers
//! fallible library operations; `ApiError` is the value a rejected
//! [`Promise`](crate::promise::Promise) carries.

use serde_json::Value;
use thiserror::Error;

/// All error types that can occur in gamecloud
#[derive(Debug, Error)]
pub enum GamecloudError {
    /// Invalid lifecycle transition or operation (e.g. restarting a stopped loop)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// HTTP transport setup or execution error
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for gamecloud operations
pub type Result<T> = std::result::Result<T, GamecloudError>;

/// Broad classification of an [`ApiError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The request never produced an HTTP response (DNS, connection, timeout)
    Network,
    /// The server answered with a non-2xx status
    Server,
    /// Error raised by application code inside a promise handler
    Logic,
}

/// Error value carried by a rejected promise.
///
/// Cloneable on purpose: a rejection fans out to every continuation
/// registered on the promise, each of which receives its own copy.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Network vs server vs application failure
    pub kind: ApiErrorKind,
    /// HTTP status code, when the server answered at all
    pub http_status: Option<u16>,
    /// Raw response body for diagnostics, when one was received
    pub server_data: Option<Value>,
    /// Human-readable description
    pub message: String,
}

impl ApiError {
    /// The request failed before any HTTP response was received
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            http_status: None,
            server_data: None,
            message: message.into(),
        }
    }

    /// The server answered with a non-2xx status
    pub fn server(status: u16, server_data: Option<Value>) -> Self {
        Self {
            kind: ApiErrorKind::Server,
            http_status: Some(status),
            server_data,
            message: format!("Server returned HTTP {status}"),
        }
    }

    /// Application-level failure raised inside a promise handler
    pub fn logic(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Logic,
            http_status: None,
            server_data: None,
            message: message.into(),
        }
    }

    /// Whether retrying the operation could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ApiErrorKind::Network => true,
            ApiErrorKind::Server => self.http_status.is_some_and(|s| s >= 500),
            ApiErrorKind::Logic => false,
        }
    }
}
