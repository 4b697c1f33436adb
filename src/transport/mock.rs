//! Scriptable transport for tests
//!
//! Replies are queued ahead of time and handed out one per request, in
//! order. Once the script is exhausted the mock behaves like a quiet
//! long-poll server: the request stays open forever (until the caller
//! drops the future, which is how loop suspension cancels it).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

enum MockReply {
    Response { status: u16, body: Option<Value> },
    Error(String),
}

/// Transport double recording every request and replying from a script
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<HttpRequest>>,
    notify: Notify,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply with a JSON body
    pub fn push_response(&self, status: u16, body: Value) {
        self.script.lock().unwrap().push_back(MockReply::Response {
            status,
            body: Some(body),
        });
    }

    /// Queue a body-less reply (e.g. 204 No Content)
    pub fn push_empty(&self, status: u16) {
        self.script
            .lock()
            .unwrap()
            .push_back(MockReply::Response { status, body: None });
    }

    /// Queue a transport-level failure (no HTTP response at all)
    pub fn push_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(MockReply::Error(message.into()));
    }

    /// Requests executed so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests executed so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Wait until at least `count` requests have been issued
    pub async fn wait_for_requests(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.requests.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.notify.notify_waiters();

        let reply = self.script.lock().unwrap().pop_front();
        match reply {
            Some(MockReply::Response { status, body }) => Ok(HttpResponse {
                status,
                body: body
                    .map(|b| serde_json::to_vec(&b).unwrap_or_default())
                    .unwrap_or_default(),
            }),
            Some(MockReply::Error(message)) => Err(TransportError::Network(message)),
            // Script exhausted: hold the request open
            None => futures::future::pending().await,
        }
    }
}
