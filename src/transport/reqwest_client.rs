//! reqwest-backed transport implementation
//!
//! Ordinary requests pass through a fairness semaphore so a burst of API
//! calls cannot starve the connection pool; long-poll requests set
//! `skip_queue` and go straight out, since they are held open on purpose.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Semaphore;

use crate::error::{GamecloudError, Result};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};

/// Maximum ordinary requests in flight at once
const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Production transport over [`reqwest`]
pub struct ReqwestTransport {
    client: Client,
    queue: Arc<Semaphore>,
}

impl ReqwestTransport {
    /// Create a transport with the default in-flight limit.
    ///
    /// Per-request timeouts come from [`HttpRequest::timeout`], so the
    /// client itself is built without one.
    pub fn new() -> Result<Self> {
        Self::with_max_in_flight(DEFAULT_MAX_IN_FLIGHT)
    }

    /// Create a transport allowing up to `max_in_flight` ordinary
    /// requests at once
    pub fn with_max_in_flight(max_in_flight: usize) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GamecloudError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            queue: Arc::new(Semaphore::new(max_in_flight)),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        // Long polls bypass the queue; everything else waits its turn.
        let _permit = if request.skip_queue {
            None
        } else {
            Some(
                self.queue
                    .acquire()
                    .await
                    .map_err(|_| TransportError::Network("request queue closed".to_string()))?,
            )
        };

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        builder = builder.timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let transport = ReqwestTransport::new();
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_network_error_on_unreachable_host() {
        let transport = ReqwestTransport::new().unwrap();
        // Reserved TEST-NET address, nothing listens there
        let request = HttpRequest::get("http://192.0.2.1:9/ping")
            .with_timeout(std::time::Duration::from_millis(200));

        let result = transport.execute(request).await;
        assert!(matches!(result, Err(TransportError::Network(_))));
    }
}
