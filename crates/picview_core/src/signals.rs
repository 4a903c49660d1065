//! Signal hub with explicit subscription tokens.
//!
//! Subscribing returns a [`Subscription`]; handing it back to
//! [`SignalHub::unsubscribe`] revokes the listener. Listeners run while the
//! hub lock is held, so once `unsubscribe` returns the listener will not be
//! called again. Listeners must not subscribe to or unsubscribe from the
//! hub that is calling them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

type Listener<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Token identifying one listener on one hub.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping a subscription leaks the listener until the hub is dropped"]
pub struct Subscription(u64);

impl Subscription {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A set of listeners for events of type `E`.
pub struct SignalHub<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<E>)>>,
}

impl<E> SignalHub<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Box::new(listener)));
        Subscription(id)
    }

    /// Revoke a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription.0);
        listeners.len() != before
    }

    /// Deliver an event to every current listener.
    pub fn emit(&self, event: &E) {
        let listeners = self.listeners.lock();
        for (_, listener) in listeners.iter() {
            listener(event);
        }
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for SignalHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for SignalHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHub")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn emit_reaches_all_listeners() {
        let hub = SignalHub::<u32>::new();
        let total = Arc::new(AtomicU64::new(0));

        let t1 = Arc::clone(&total);
        let _a = hub.subscribe(move |v| {
            t1.fetch_add(u64::from(*v), Ordering::SeqCst);
        });
        let t2 = Arc::clone(&total);
        let _b = hub.subscribe(move |v| {
            t2.fetch_add(u64::from(*v) * 10, Ordering::SeqCst);
        });

        hub.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let hub = SignalHub::<()>::new();
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let sub = hub.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(&());
        assert!(hub.unsubscribe(sub));
        hub.emit(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(hub.is_empty());
    }

    #[test]
    fn double_unsubscribe_reports_missing() {
        let hub = SignalHub::<()>::new();
        let sub = hub.subscribe(|_| {});
        let stale = Subscription(sub.id());
        assert!(hub.unsubscribe(sub));
        assert!(!hub.unsubscribe(stale));
    }
}
