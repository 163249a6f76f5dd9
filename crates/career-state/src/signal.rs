//! Handlers and stateless signals.
//!
//! A [`Handler`] pairs a callback with a [`HandlerId`]. Subscription sets are
//! keyed by that id, so subscribing the same handler twice is a no-op and
//! unsubscribing requires the handler (or a clone of it) that was subscribed.
//!
//! Handlers are held strongly by the sets they join. Callbacks that refer
//! back to their owner should capture a `Weak` so a subscription never keeps
//! its owner alive.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use career_core::HandlerId;

/// A callback with a stable identity.
pub struct Handler<T> {
    id: HandlerId,
    callback: Rc<dyn Fn(&T)>,
}

impl<T> Handler<T> {
    /// Wrap a callback under a fresh id.
    pub fn new(callback: impl Fn(&T) + 'static) -> Self {
        Self {
            id: HandlerId::new(),
            callback: Rc::new(callback),
        }
    }

    /// The identity of this handler.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Invoke the callback.
    pub fn call(&self, value: &T) {
        (self.callback)(value)
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}

/// A multicast event without a current value.
pub struct Signal<T> {
    handlers: RefCell<HashMap<HandlerId, Handler<T>>>,
}

impl<T> Signal<T> {
    /// Create a signal with no subscribers.
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(HashMap::new()),
        }
    }

    /// Add a handler. Returns false if it was already subscribed.
    pub fn subscribe(&self, handler: &Handler<T>) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        if handlers.contains_key(&handler.id) {
            return false;
        }
        handlers.insert(handler.id, handler.clone());
        true
    }

    /// Remove a handler. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, handler: &Handler<T>) -> bool {
        self.handlers.borrow_mut().remove(&handler.id).is_some()
    }

    /// Check whether a handler is currently subscribed.
    pub fn contains(&self, id: HandlerId) -> bool {
        self.handlers.borrow().contains_key(&id)
    }

    /// Number of subscribed handlers.
    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Check if no handler is subscribed.
    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }

    /// Copy of the current subscriber set, safe to iterate while handlers
    /// subscribe or unsubscribe.
    pub fn snapshot(&self) -> Vec<Handler<T>> {
        self.handlers.borrow().values().cloned().collect()
    }

    /// Deliver `value` to every handler.
    ///
    /// Handlers removed by an earlier handler during the same emission are
    /// skipped. Handlers added during the emission are not called.
    pub fn emit(&self, value: &T) {
        for handler in self.snapshot() {
            if self.contains(handler.id) {
                handler.call(value);
            }
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.len())
            .finish()
    }
}
