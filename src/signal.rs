//! Synchronous one-to-many notifications.
//!
//! Dirty regions, layer property changes and stack reorders are published
//! through [`Signal`]s. Subscribers are plain closures invoked on the
//! emitting thread, in subscription order. Dropping the returned
//! [`Subscription`] disconnects the closure.
//!
//! Subscribers are snapshotted before invocation, so a callback may safely
//! subscribe, unsubscribe or emit on the same signal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::sync::lock;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Subscribers<T> = Mutex<Vec<(u64, Callback<T>)>>;

/// A list of subscribers for values of type `T`.
pub struct Signal<T> {
    subscribers: Arc<Subscribers<T>>,
    next_id: AtomicU64,
}

impl<T: 'static> Signal<T> {
    /// Create a signal with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register `callback`; it stays connected until the returned guard is dropped.
    #[must_use = "dropping the subscription disconnects the callback"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).push((id, Arc::new(callback)));

        let weak: Weak<Subscribers<T>> = Arc::downgrade(&self.subscribers);
        Subscription {
            disconnect: Some(Box::new(move || {
                if let Some(subscribers) = weak.upgrade() {
                    lock(&subscribers).retain(|(sub_id, _)| *sub_id != id);
                }
            })),
        }
    }

    /// Invoke every connected subscriber with `value`.
    pub fn emit(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = lock(&self.subscribers)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &lock(&self.subscribers).len())
            .finish()
    }
}

/// Connection guard returned by [`Signal::subscribe`].
pub struct Subscription {
    disconnect: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Disconnect now instead of at drop.
    pub fn disconnect(mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("connected", &self.disconnect.is_some())
            .finish()
    }
}
