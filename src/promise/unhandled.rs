//! Process-wide unhandled-rejection channel
//!
//! A promise chain that ends in a `done` sink without a rejection handler
//! delivers its error here instead of dropping it. Hosts subscribe for
//! diagnostics or crash reporting; with no subscriber installed the error
//! is logged so it is never lost silently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::ApiError;

type Callback = Arc<dyn Fn(&ApiError) + Send + Sync>;

static SUBSCRIBERS: OnceLock<Mutex<Vec<(u64, Callback)>>> = OnceLock::new();
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn subscribers() -> &'static Mutex<Vec<(u64, Callback)>> {
    SUBSCRIBERS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Capability token returned by [`subscribe`]; dropping it unregisters
/// the callback.
#[must_use = "dropping the subscription immediately unregisters the callback"]
pub struct UnhandledSubscription {
    id: u64,
}

impl Drop for UnhandledSubscription {
    fn drop(&mut self) {
        subscribers().lock().unwrap().retain(|(id, _)| *id != self.id);
    }
}

/// Register a callback invoked for every unhandled promise rejection.
///
/// The callback may run on any thread that settles a promise.
pub fn subscribe<F>(callback: F) -> UnhandledSubscription
where
    F: Fn(&ApiError) + Send + Sync + 'static,
{
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    subscribers().lock().unwrap().push((id, Arc::new(callback)));
    UnhandledSubscription { id }
}

/// Deliver an unhandled rejection to all subscribers
pub(crate) fn notify(err: &ApiError) {
    let callbacks: Vec<Callback> = subscribers()
        .lock()
        .unwrap()
        .iter()
        .map(|(_, cb)| Arc::clone(cb))
        .collect();
    if callbacks.is_empty() {
        tracing::error!(error = %err, "unhandled promise rejection");
        return;
    }
    for callback in callbacks {
        callback(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscription_drop_unregisters() {
        let marker = "drop-unregisters-marker";
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let sub = subscribe(move |err| {
            if err.message.contains(marker) {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        notify(&ApiError::logic(marker));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(sub);
        notify(&ApiError::logic(marker));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multiple_subscribers_all_notified() {
        let marker = "fan-out-marker";
        let count = Arc::new(AtomicUsize::new(0));

        let count_a = count.clone();
        let _sub_a = subscribe(move |err| {
            if err.message.contains(marker) {
                count_a.fetch_add(1, Ordering::SeqCst);
            }
        });
        let count_b = count.clone();
        let _sub_b = subscribe(move |err| {
            if err.message.contains(marker) {
                count_b.fetch_add(1, Ordering::SeqCst);
            }
        });

        notify(&ApiError::logic(marker));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
