//! Registry of active event loops
//!
//! Tracks every started loop so a host can broadcast suspend/resume on
//! visibility changes, look a loop up by identity to share it instead of
//! opening a redundant long poll, and stop everything at shutdown. The
//! registry is an explicit, injectable object (not a hidden static) so
//! tests run against independent instances.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::event_loop::DomainEventLoop;

type MessageListener = Arc<dyn Fn(&DomainEventLoop, &Value) + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, MessageListener)>>;

/// Process-wide (per instance) registry of running event loops
#[derive(Default)]
pub struct EventLoopRegistry {
    loops: Mutex<Vec<DomainEventLoop>>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
}

impl EventLoopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from a loop's start transition
    pub(crate) fn register(&self, event_loop: DomainEventLoop) {
        let mut loops = self.loops.lock().unwrap();
        if loops.iter().any(|l| l.same_loop(&event_loop)) {
            return;
        }
        loops.push(event_loop);
    }

    /// Called from a loop's stop transition
    pub(crate) fn unregister(&self, event_loop: &DomainEventLoop) {
        self.loops
            .lock()
            .unwrap()
            .retain(|l| !l.same_loop(event_loop));
    }

    /// Find the running loop for an identity, if any. Feature code uses
    /// this to share one loop per (gamer, domain) instead of opening
    /// redundant long polls.
    pub fn find(&self, gamer_id: &str, domain: &str) -> Option<DomainEventLoop> {
        self.loops
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.gamer_id() == gamer_id && l.domain() == domain)
            .cloned()
    }

    /// Number of registered loops
    pub fn running_count(&self) -> usize {
        self.loops.lock().unwrap().len()
    }

    /// Suspend or resume every registered loop. Hosts call this on
    /// foreground/background transitions; the registry does not assume
    /// any particular host callback shape.
    pub fn set_paused(&self, paused: bool) {
        for event_loop in self.snapshot() {
            if paused {
                event_loop.suspend();
            } else {
                event_loop.resume();
            }
        }
    }

    /// Suspend every registered loop
    pub fn pause_all(&self) {
        self.set_paused(true);
    }

    /// Resume every suspended loop
    pub fn resume_all(&self) {
        self.set_paused(false);
    }

    /// Stop every registered loop, e.g. at application shutdown. Loops
    /// deregister themselves while stopping, hence the snapshot.
    pub fn stop_all(&self) {
        for event_loop in self.snapshot() {
            event_loop.stop();
        }
    }

    /// Register a callback for every message received by any loop in
    /// this registry. Dropping the token unregisters it.
    #[must_use = "dropping the subscription immediately unregisters the listener"]
    pub fn subscribe_messages<F>(&self, listener: F) -> MessageSubscription
    where
        F: Fn(&DomainEventLoop, &Value) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().push((id, Arc::new(listener)));
        MessageSubscription {
            owner: Arc::downgrade(&self.listeners),
            id,
        }
    }

    /// Broadcast one received message; called by the source loop's
    /// dispatch. Panics in callbacks are isolated.
    pub(crate) fn dispatch_message(&self, source: &DomainEventLoop, message: &Value) {
        let listeners: Vec<MessageListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(source, message))).is_err() {
                tracing::error!(domain = %source.domain(), "panic in registry message listener");
            }
        }
    }

    fn snapshot(&self) -> Vec<DomainEventLoop> {
        self.loops.lock().unwrap().clone()
    }
}

/// Capability token for a registry message listener
#[must_use = "dropping the subscription immediately unregisters the listener"]
pub struct MessageSubscription {
    owner: Weak<ListenerList>,
    id: u64,
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.owner.upgrade() {
            listeners.lock().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventLoopConfig;
    use crate::credentials::Credentials;
    use crate::transport::MockTransport;
    use std::time::Duration;

    fn make_loop(registry: &Arc<EventLoopRegistry>, gamer_id: &str, domain: &str) -> DomainEventLoop {
        DomainEventLoop::new(
            Credentials::new(gamer_id, "secret"),
            domain,
            "http://backend",
            Arc::new(MockTransport::new()),
            registry.clone(),
            EventLoopConfig::with_iteration(Duration::from_secs(10)),
        )
    }

    #[tokio::test]
    async fn test_find_by_identity() {
        let registry = Arc::new(EventLoopRegistry::new());
        let loop_a = make_loop(&registry, "u1", "private");
        let loop_b = make_loop(&registry, "u2", "private");
        loop_a.start().unwrap();
        loop_b.start().unwrap();

        let found = registry.find("u1", "private").unwrap();
        assert!(found.same_loop(&loop_a));
        assert!(registry.find("u1", "matches").is_none());
        assert!(registry.find("u3", "private").is_none());

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = Arc::new(EventLoopRegistry::new());
        let event_loop = make_loop(&registry, "u1", "private");
        registry.register(event_loop.clone());
        registry.register(event_loop.clone());
        assert_eq!(registry.running_count(), 1);
    }

    #[tokio::test]
    async fn test_pause_and_resume_broadcast() {
        let registry = Arc::new(EventLoopRegistry::new());
        let loop_a = make_loop(&registry, "u1", "private");
        let loop_b = make_loop(&registry, "u1", "matches");
        loop_a.start().unwrap();
        loop_b.start().unwrap();

        registry.pause_all();
        assert_eq!(loop_a.state(), crate::event_loop::LoopState::Suspended);
        assert_eq!(loop_b.state(), crate::event_loop::LoopState::Suspended);

        registry.resume_all();
        assert_eq!(loop_a.state(), crate::event_loop::LoopState::Running);
        assert_eq!(loop_b.state(), crate::event_loop::LoopState::Running);

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_stop_all_empties_registry() {
        let registry = Arc::new(EventLoopRegistry::new());
        let loop_a = make_loop(&registry, "u1", "private");
        let loop_b = make_loop(&registry, "u2", "private");
        loop_a.start().unwrap();
        loop_b.start().unwrap();
        assert_eq!(registry.running_count(), 2);

        registry.stop_all();
        assert_eq!(registry.running_count(), 0);
        assert_eq!(loop_a.state(), crate::event_loop::LoopState::Stopped);
        assert_eq!(loop_b.state(), crate::event_loop::LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_message_subscription_drop_unregisters() {
        let registry = Arc::new(EventLoopRegistry::new());
        let event_loop = make_loop(&registry, "u1", "private");

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let subscription = registry.subscribe_messages(move |_, message| {
            received_clone.lock().unwrap().push(message.clone());
        });

        registry.dispatch_message(&event_loop, &serde_json::json!({"id": "m1"}));
        assert_eq!(received.lock().unwrap().len(), 1);

        drop(subscription);
        registry.dispatch_message(&event_loop, &serde_json::json!({"id": "m2"}));
        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
