//! Promise of a future result
//!
//! Every asynchronous operation in the SDK hands back a [`Promise`]: a
//! single-assignment container settled exactly once, either fulfilled with
//! a value or rejected with an [`ApiError`]. Continuations chain with
//! [`Promise::then`] / [`Promise::and_then`], failures are observed with
//! [`Promise::catch`] or recovered with [`Promise::or_else`], and chains
//! end in one of the `done` sinks so that rejections nobody caught reach
//! the process-wide [`unhandled`] channel instead of vanishing.
//!
//! Promises are pure synchronization objects, not schedulers: a
//! continuation registered before settlement runs synchronously on
//! whatever thread calls [`Promise::resolve`] / [`Promise::reject`], and
//! one registered after settlement runs immediately on the registering
//! thread. Handlers must not assume a particular thread.

pub mod unhandled;

use std::sync::{Arc, Mutex};

use crate::error::ApiError;

/// Continuation run when the promise is fulfilled
type FulfillHandler<T> = Box<dyn FnOnce(T) + Send>;

/// Continuation run when the promise is rejected
type RejectHandler = Box<dyn FnOnce(ApiError) + Send>;

/// Observable settlement state of a promise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

enum State<T> {
    Pending,
    Fulfilled(T),
    Rejected(ApiError),
}

struct Inner<T> {
    state: State<T>,
    on_fulfilled: Vec<FulfillHandler<T>>,
    on_rejected: Vec<RejectHandler>,
}

/// Single-assignment result of an asynchronous operation.
///
/// Cloning is shallow: all clones observe the same settlement. The
/// producer settles the promise exactly once; settling it a second time
/// is a programming error and panics.
pub struct Promise<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    /// Create a pending promise
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
            })),
        }
    }

    /// Current settlement state
    pub fn state(&self) -> PromiseState {
        match self.inner.lock().unwrap().state {
            State::Pending => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Shorthand for a promise that is already fulfilled
    pub fn fulfilled(value: T) -> Self {
        let promise = Self::new();
        promise.resolve(value);
        promise
    }

    /// Shorthand for a promise that is already rejected
    pub fn rejected(err: ApiError) -> Self {
        let promise = Self::new();
        promise.reject(err);
        promise
    }

    /// Fulfill the promise with the result of the operation.
    ///
    /// Queued continuations run synchronously on the calling thread, in
    /// registration order, and the queues are cleared.
    ///
    /// # Panics
    ///
    /// Panics if the promise is already settled.
    pub fn resolve(&self, value: T) {
        let handlers = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Pending => {}
                State::Fulfilled(_) => {
                    panic!("illegal promise state transition (Fulfilled to Fulfilled)")
                }
                State::Rejected(_) => {
                    panic!("illegal promise state transition (Rejected to Fulfilled)")
                }
            }
            inner.state = State::Fulfilled(value.clone());
            inner.on_rejected.clear();
            std::mem::take(&mut inner.on_fulfilled)
        };
        // Lock released: a continuation may chain further promises or
        // inspect this one without deadlocking.
        for handler in handlers {
            handler(value.clone());
        }
    }

    /// Reject the promise, indicating that the operation failed.
    ///
    /// # Panics
    ///
    /// Panics if the promise is already settled.
    pub fn reject(&self, err: ApiError) {
        tracing::debug!(error = %err, "promise rejected");
        let handlers = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Pending => {}
                State::Fulfilled(_) => {
                    panic!("illegal promise state transition (Fulfilled to Rejected)")
                }
                State::Rejected(_) => {
                    panic!("illegal promise state transition (Rejected to Rejected)")
                }
            }
            inner.state = State::Rejected(err.clone());
            inner.on_fulfilled.clear();
            std::mem::take(&mut inner.on_rejected)
        };
        for handler in handlers {
            handler(err.clone());
        }
    }

    /// Chain a continuation, optionally changing the result type.
    ///
    /// On fulfillment `on_fulfilled` runs and its `Ok` becomes the derived
    /// promise's value; an `Err` rejects the derived promise instead (the
    /// path by which failures inside a handler become asynchronous
    /// rejections). A rejection of this promise passes through to the
    /// derived one unchanged.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, ApiError> + Send + 'static,
    {
        let derived = Promise::new();
        let fulfill = derived.clone();
        let reject = derived.clone();
        self.register(
            Box::new(move |value| match on_fulfilled(value) {
                Ok(mapped) => fulfill.resolve(mapped),
                Err(err) => fulfill.reject(err),
            }),
            Box::new(move |err| reject.reject(err)),
        );
        derived
    }

    /// Chain a continuation that itself returns a promise.
    ///
    /// The derived promise settles when the returned promise does,
    /// forwarding its value or rejection. Used to sequence dependent
    /// asynchronous operations without nesting.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let derived = Promise::new();
        let fulfill = derived.clone();
        let reject = derived.clone();
        self.register(
            Box::new(move |value| on_fulfilled(value).forward_to(&fulfill)),
            Box::new(move |err| reject.reject(err)),
        );
        derived
    }

    /// Observe a failure at this point in the chain.
    ///
    /// The derived promise is rejected either way, with the same error;
    /// recovery must be explicit via [`Promise::or_else`]. Follow a
    /// `catch` with a `done` sink so an error inside the handler chain
    /// still reaches the unhandled channel.
    pub fn catch<F>(&self, on_rejected: F) -> Promise<T>
    where
        F: FnOnce(ApiError) + Send + 'static,
    {
        let derived = Promise::new();
        let fulfill = derived.clone();
        let reject = derived.clone();
        self.register(
            Box::new(move |value| fulfill.resolve(value)),
            Box::new(move |err| {
                on_rejected(err.clone());
                reject.reject(err);
            }),
        );
        derived
    }

    /// Recover from a failure by substituting another promise.
    ///
    /// On rejection `on_rejected` runs and the promise it returns drives
    /// the derived one, so a fulfilled replacement turns the chain back
    /// into a success.
    pub fn or_else<F>(&self, on_rejected: F) -> Promise<T>
    where
        F: FnOnce(ApiError) -> Promise<T> + Send + 'static,
    {
        let derived = Promise::new();
        let fulfill = derived.clone();
        let recover = derived.clone();
        self.register(
            Box::new(move |value| fulfill.resolve(value)),
            Box::new(move |err| on_rejected(err).forward_to(&recover)),
        );
        derived
    }

    /// Terminal sink for a chain.
    ///
    /// A rejection that reaches this point without having been caught is
    /// surfaced on the process-wide [`unhandled`] channel, exactly once.
    pub fn done(&self) {
        self.register(
            Box::new(|_| {}),
            Box::new(|err| unhandled::notify(&err)),
        );
    }

    /// Terminal sink observing the success value; rejections go to the
    /// [`unhandled`] channel.
    pub fn done_ok<F>(&self, on_fulfilled: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.register(
            Box::new(on_fulfilled),
            Box::new(|err| unhandled::notify(&err)),
        );
    }

    /// Terminal sink observing both outcomes. The rejection handler makes
    /// this chain "handled", so nothing reaches the unhandled channel.
    pub fn done_or<F, G>(&self, on_fulfilled: F, on_rejected: G)
    where
        F: FnOnce(T) + Send + 'static,
        G: FnOnce(ApiError) + Send + 'static,
    {
        self.register(Box::new(on_fulfilled), Box::new(on_rejected));
    }

    /// Settle `target` the same way this promise settles
    fn forward_to(&self, target: &Promise<T>) {
        let fulfill = target.clone();
        let reject = target.clone();
        self.register(
            Box::new(move |value| fulfill.resolve(value)),
            Box::new(move |err| reject.reject(err)),
        );
    }

    /// Queue both continuations, or run the matching one immediately if
    /// the promise has already settled
    fn register(&self, on_fulfilled: FulfillHandler<T>, on_rejected: RejectHandler) {
        enum Immediate<T> {
            Fulfilled(T),
            Rejected(ApiError),
        }

        let immediate = {
            let mut inner = self.inner.lock().unwrap();
            match &inner.state {
                State::Pending => {
                    inner.on_fulfilled.push(on_fulfilled);
                    inner.on_rejected.push(on_rejected);
                    return;
                }
                State::Fulfilled(value) => Immediate::Fulfilled(value.clone()),
                State::Rejected(err) => Immediate::Rejected(err.clone()),
            }
        };
        // Lock released: the handler may chain further promises
        match immediate {
            Immediate::Fulfilled(value) => on_fulfilled(value),
            Immediate::Rejected(err) => on_rejected(err),
        }
    }
}
