//! HTTP transport seam
//!
//! This module provides:
//! - Request/response value types shared by every call
//! - The `HttpTransport` trait for transport abstraction
//! - `ReqwestTransport` production implementation
//! - `MockTransport` scriptable implementation for tests
//! - `request()`, bridging one transport call into a promise

pub mod mock;
pub mod reqwest_client;

pub use mock::MockTransport;
pub use reqwest_client::ReqwestTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::ApiError;
use crate::promise::Promise;

/// Default timeout for ordinary (non long-poll) requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// One HTTP request as the transport sees it
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON body, serialized by the transport
    pub body: Option<Value>,
    /// Timeout for this request specifically
    pub timeout: Duration,
    /// Bypass the transport's fairness queue. Set on long polls: they are
    /// held open on purpose and must neither block behind ordinary
    /// traffic nor be mistaken for a stalled request.
    pub skip_queue: bool,
}

impl HttpRequest {
    /// GET request with default timeout
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            skip_queue: false,
        }
    }

    /// POST request with a JSON body and default timeout
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
            timeout: DEFAULT_TIMEOUT,
            skip_queue: false,
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Mark the request as bypassing the fairness queue
    pub fn bypass_queue(mut self) -> Self {
        self.skip_queue = true;
        self
    }

    /// Value of a query parameter on this request's URL, if present.
    /// Test helper for asserting on the long-poll wire contract.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }
}

/// One HTTP response as delivered by the transport
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body parsed as JSON, if it is valid JSON
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Errors produced while executing a request
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request never produced an HTTP response
    #[error("Network error: {0}")]
    Network(String),

    /// The request could not be constructed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::network(err.to_string())
    }
}

impl ApiError {
    /// Classify a completed call that did not succeed: the server
    /// answered, so this is a server-side error carrying the raw body.
    pub fn from_response(response: &HttpResponse) -> Self {
        ApiError::server(response.status, response.body_json())
    }
}

/// Performs one HTTP request.
///
/// `execute` completes exactly once per call. Dropping the returned
/// future before completion is the transport's best-effort abort: the
/// request may or may not have reached the server.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Fire one ordinary API call and expose its completion as a promise.
///
/// The call runs on a spawned task and settles the promise from there:
/// 2xx fulfills with the response, anything else rejects with a
/// classified [`ApiError`] (network vs server, raw body attached). Must
/// be called from within a tokio runtime.
pub fn request(transport: Arc<dyn HttpTransport>, request: HttpRequest) -> Promise<HttpResponse> {
    let promise = Promise::new();
    let settle = promise.clone();
    tokio::spawn(async move {
        match transport.execute(request).await {
            Ok(response) if response.is_success() => settle.resolve(response),
            Ok(response) => settle.reject(ApiError::from_response(&response)),
            Err(err) => settle.reject(ApiError::from(err)),
        }
    });
    promise
}
