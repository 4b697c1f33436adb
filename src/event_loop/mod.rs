//! Domain event loop
//!
//! Long-polls the backend for server-pushed events on one
//! (credentials, domain) pair. The loop re-issues a blocking request
//! carrying the poll duration and the id of the last consumed message
//! (its acknowledgment), classifies failures, applies a cooldown between
//! failed iterations, and can be suspended, resumed, or stopped from any
//! thread while a request is in flight.
//!
//! Lifecycle: `Created` → `Running` (start), `Running` ↔ `Suspended`
//! (suspend/resume), any state → `Stopped` (terminal). A stopped loop can
//! never be started again.

pub mod registry;

pub use registry::{EventLoopRegistry, MessageSubscription};

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::EventLoopConfig;
use crate::credentials::Credentials;
use crate::error::{GamecloudError, Result};
use crate::transport::{HttpRequest, HttpTransport};

/// Lifecycle state of a [`DomainEventLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Created,
    Running,
    Suspended,
    Stopped,
}

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

struct LoopInner {
    credentials: Credentials,
    domain: String,
    base_url: String,
    config: EventLoopConfig,
    transport: Arc<dyn HttpTransport>,
    registry: Arc<EventLoopRegistry>,
    /// Lifecycle control; the poll task watches this for suspension and
    /// termination, which also cancels the in-flight request
    control: watch::Sender<LoopState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LoopInner {
    /// Build one long-poll request. `timeout` and `ack` query parameters
    /// and the 200/204 status contract are the wire protocol the backend
    /// expects; the request timeout leaves a margin over the poll
    /// duration and the request bypasses the transport's fairness queue.
    fn poll_request(&self, poll: Duration, ack: Option<&str>) -> HttpRequest {
        let mut url = format!(
            "{}/v1/gamer/event/{}?timeout={}",
            self.base_url,
            self.domain,
            poll.as_millis()
        );
        if let Some(ack) = ack {
            url.push_str("&ack=");
            url.push_str(ack);
        }
        HttpRequest::get(url)
            .with_header("Authorization", self.credentials.authorization())
            .with_timeout(self.config.request_timeout(poll))
            .bypass_queue()
    }
}

/// Polls the server waiting for new events on one (gamer, domain) pair.
///
/// Create one per domain you listen on, start it once the gamer is
/// logged in, and stop it at logout. Cloning is shallow; all clones
/// drive the same loop.
#[derive(Clone)]
pub struct DomainEventLoop {
    inner: Arc<LoopInner>,
}

impl DomainEventLoop {
    /// Create a loop for the given identity. The loop does nothing until
    /// [`DomainEventLoop::start`] is called.
    pub fn new(
        credentials: Credentials,
        domain: impl Into<String>,
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        registry: Arc<EventLoopRegistry>,
        config: EventLoopConfig,
    ) -> Self {
        let (control, _) = watch::channel(LoopState::Created);
        Self {
            inner: Arc::new(LoopInner {
                credentials,
                domain: domain.into(),
                base_url: base_url.trim_end_matches('/').to_string(),
                config,
                transport,
                registry,
                control,
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// The gamer this loop is authenticated as
    pub fn gamer_id(&self) -> &str {
        &self.inner.credentials.gamer_id
    }

    /// The domain this loop is listening on
    pub fn domain(&self) -> &str {
        &self.inner.domain
    }

    /// Current lifecycle state
    pub fn state(&self) -> LoopState {
        *self.inner.control.borrow()
    }

    /// Start polling. Registers the loop in its registry and spawns the
    /// poll task; calling `start` on a loop that is already running is a
    /// no-op. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the loop was stopped: a stopped loop is
    /// terminal and must never be restarted.
    pub fn start(&self) -> Result<()> {
        let mut task = self.inner.task.lock().unwrap();
        if self.state() == LoopState::Stopped {
            return Err(GamecloudError::InvalidState(
                "never restart an event loop that was stopped".to_string(),
            ));
        }
        if task.is_some() {
            return Ok(());
        }
        self.inner.control.send_replace(LoopState::Running);
        self.inner.registry.register(self.clone());
        tracing::debug!(gamer_id = %self.gamer_id(), domain = %self.domain(), "starting event loop");

        let run = self.clone();
        *task = Some(tokio::spawn(async move { run.run().await }));
        Ok(())
    }

    /// Suspend polling. Aborts the in-flight request (best-effort; the
    /// server may already have answered, which is harmless because acks
    /// are idempotent) and halts iterations until [`DomainEventLoop::resume`].
    /// The acknowledgment cursor is preserved.
    pub fn suspend(&self) {
        self.inner.control.send_if_modified(|state| {
            if *state == LoopState::Running {
                *state = LoopState::Suspended;
                true
            } else {
                false
            }
        });
    }

    /// Resume a suspended loop
    pub fn resume(&self) {
        self.inner.control.send_if_modified(|state| {
            if *state == LoopState::Suspended {
                *state = LoopState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Stop the loop permanently: aborts the in-flight request, removes
    /// the loop from its registry, and ends the poll task. Terminal;
    /// idempotent.
    pub fn stop(&self) {
        let previous = self.inner.control.send_replace(LoopState::Stopped);
        if previous == LoopState::Stopped {
            return;
        }
        self.inner.registry.unregister(self);
        tracing::debug!(gamer_id = %self.gamer_id(), domain = %self.domain(), "event loop stopped");
    }

    /// Register a listener for received events.
    ///
    /// The returned token keeps the listener alive; dropping it
    /// unregisters. Listeners run on the poll task; a panicking listener
    /// is logged and isolated, never fatal to the loop.
    #[must_use = "dropping the subscription immediately unregisters the listener"]
    pub fn subscribe<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));
        EventSubscription {
            owner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of listeners currently registered
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }

    pub(crate) fn same_loop(&self, other: &DomainEventLoop) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Poll cycle. One dedicated task per loop; messages are handled
    /// strictly one at a time, and a new poll is never issued before the
    /// previous response has been fully processed and acknowledged.
    async fn run(self) {
        let inner = &self.inner;
        let mut control = inner.control.subscribe();
        let mut ack: Option<String> = None;
        let mut last_ok = true;
        let mut poll = inner.config.iteration;

        'poll: loop {
            // Wait out suspension; exit on stop. Cursor and failure flag
            // survive a suspend/resume cycle.
            loop {
                // Copy the state out so the watch borrow is not held
                // across the await below
                let state = *control.borrow_and_update();
                match state {
                    LoopState::Stopped => break 'poll,
                    LoopState::Suspended => {
                        if control.changed().await.is_err() {
                            break 'poll;
                        }
                    }
                    _ => break,
                }
            }

            if !last_ok {
                // Last iteration failed: cool down before retrying, then
                // poll with a short duration so connectivity coming back
                // is noticed quickly.
                tokio::select! {
                    _ = tokio::time::sleep(inner.config.failure_cooldown) => {}
                    _ = control.changed() => continue,
                }
                poll = inner.config.retry_poll;
            }

            let request = inner.poll_request(poll, ack.as_deref());
            let response = tokio::select! {
                response = inner.transport.execute(request) => response,
                // Suspend/stop aborts the in-flight poll by dropping it
                _ = control.changed() => continue,
            };

            match response {
                Ok(resp) if resp.status == 200 => {
                    last_ok = true;
                    poll = inner.config.iteration;
                    match resp.body_json() {
                        Some(message) => {
                            if let Some(id) = message.get("id").and_then(Value::as_str) {
                                ack = Some(id.to_string());
                            }
                            self.dispatch(&message);
                        }
                        None => {
                            tracing::error!(domain = %inner.domain, "event body is not valid JSON");
                        }
                    }
                }
                Ok(resp) if resp.status == 204 => {
                    // No event within the poll duration; poll again
                    last_ok = true;
                    poll = inner.config.iteration;
                }
                Ok(resp) if (400..500).contains(&resp.status) => {
                    // Credentials or domain permanently invalid
                    tracing::warn!(
                        domain = %inner.domain,
                        status = resp.status,
                        "event poll rejected, stopping loop"
                    );
                    self.stop();
                    break;
                }
                Ok(resp) => {
                    tracing::warn!(domain = %inner.domain, status = resp.status, "event poll failed");
                    last_ok = false;
                }
                Err(err) => {
                    tracing::warn!(domain = %inner.domain, error = %err, "event poll transport error");
                    last_ok = false;
                }
            }
        }
        tracing::debug!(gamer_id = %inner.credentials.gamer_id, domain = %inner.domain, "event loop finished");
    }

    /// Deliver one received message to every loop listener and to the
    /// registry's any-loop broadcast. Listener panics must never
    /// terminate the loop.
    fn dispatch(&self, message: &Value) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(message))).is_err() {
                tracing::error!(domain = %self.inner.domain, "panic in event listener");
            }
        }
        self.inner.registry.dispatch_message(self, message);
    }
}

/// Capability token for a loop listener; dropping it unregisters the
/// listener (at zero listeners the loop keeps polling, it just has no
/// local subscribers).
#[must_use = "dropping the subscription immediately unregisters the listener"]
pub struct EventSubscription {
    owner: Weak<LoopInner>,
    id: u64,
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap()
                .retain(|(id, _)| *id != self.id);
        }
    }
}
