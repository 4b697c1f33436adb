//! Event loop configuration
//!
//! Timing knobs for the long-poll cycle. Defaults reproduce the backend's
//! historical constants; they are exposed as fields so tests (and callers
//! with unusual network conditions) can tighten them.

use std::time::Duration;

/// Default long-poll iteration duration (~10 min)
const DEFAULT_ITERATION: Duration = Duration::from_secs(590);

/// Pause after a failed iteration before polling again
const DEFAULT_FAILURE_COOLDOWN: Duration = Duration::from_secs(20);

/// Shortened poll duration used right after a failure, so that
/// connectivity coming back is noticed quickly
const DEFAULT_RETRY_POLL: Duration = Duration::from_secs(2);

/// Margin added to the poll duration for the HTTP request's own timeout
const DEFAULT_REQUEST_MARGIN: Duration = Duration::from_secs(30);

/// Configuration for a [`DomainEventLoop`](crate::event_loop::DomainEventLoop)
#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    /// How long the server may hold one poll open waiting for an event.
    /// Should be high (at least 60 s); the server answers 204 when it
    /// elapses without an event.
    pub iteration: Duration,
    /// Wait between iterations after a failure, to avoid hammering an
    /// unreachable or erroring server
    pub failure_cooldown: Duration,
    /// Poll duration used for the first request after a failure
    pub retry_poll: Duration,
    /// Added to the poll duration to obtain the request timeout
    pub request_margin: Duration,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            iteration: DEFAULT_ITERATION,
            failure_cooldown: DEFAULT_FAILURE_COOLDOWN,
            retry_poll: DEFAULT_RETRY_POLL,
            request_margin: DEFAULT_REQUEST_MARGIN,
        }
    }
}

impl EventLoopConfig {
    /// Config with a custom iteration duration, other fields at defaults
    pub fn with_iteration(iteration: Duration) -> Self {
        Self {
            iteration,
            ..Default::default()
        }
    }

    /// Set the cooldown applied after a failed iteration
    pub fn with_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    /// Set the shortened poll duration used after a failure
    pub fn with_retry_poll(mut self, retry_poll: Duration) -> Self {
        self.retry_poll = retry_poll;
        self
    }

    /// Request timeout for a poll of the given duration
    pub fn request_timeout(&self, poll: Duration) -> Duration {
        poll + self.request_margin
    }
}
