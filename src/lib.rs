//! gamecloud - async coordination core for the GameCloud backend client
//!
//! Two subsystems shared by every API call: a single-assignment
//! [`Promise`](promise::Promise) runtime used to sequence and combine
//! asynchronous results (with unhandled-rejection detection), and a
//! long-poll [`DomainEventLoop`](event_loop::DomainEventLoop) that
//! delivers server-pushed events per (gamer, domain) pair, tracked in an
//! injectable [`EventLoopRegistry`](event_loop::EventLoopRegistry) so a
//! host can pause, resume, or stop all polling at once.

pub mod config;
pub mod credentials;
pub mod error;
pub mod event_loop;
pub mod promise;
pub mod transport;

pub use config::EventLoopConfig;
pub use credentials::Credentials;
pub use error::{ApiError, ApiErrorKind, GamecloudError, Result};
pub use event_loop::{
    DomainEventLoop, EventLoopRegistry, EventSubscription, LoopState, MessageSubscription,
};
pub use promise::{Promise, PromiseState};
