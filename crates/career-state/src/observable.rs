//! Observable state cells.
//!
//! An [`Observable`] holds a value and a set of subscribers. Subscribing
//! pushes the current value to the new subscriber immediately; setting a
//! different value pushes it to everyone. A second set of listeners hears
//! about [`Lifecycle`] transitions: the cell gaining its first subscriber or
//! losing its last one. Owners use those transitions to acquire and release
//! whatever feeds the cell, so nothing is evaluated while nobody listens.
//!
//! All delivery is synchronous and reentrant: a subscriber may read, set,
//! subscribe or unsubscribe on the same cell from inside its callback.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::signal::{Handler, Signal};

/// Subscriber-count transitions of an [`Observable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// The subscriber count went from zero to one.
    Subscribed,
    /// The subscriber count went from one to zero.
    Unsubscribed,
}

struct ObservableInner<T> {
    value: RefCell<T>,
    /// Bumped on every stored change.
    version: Cell<u64>,
    subscribers: Signal<T>,
    lifecycle: Signal<Lifecycle>,
}

/// A shared, single-threaded state cell. Clones refer to the same cell.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq> Observable<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                version: Cell::new(0),
                subscribers: Signal::new(),
                lifecycle: Signal::new(),
            }),
        }
    }

    /// Copy of the current value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Read the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Number of stored changes since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Store `value` and push it to every subscriber, unless it equals the
    /// current value. Returns true if the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }

        let version = self.inner.version.get() + 1;
        self.inner.version.set(version);

        for handler in self.inner.subscribers.snapshot() {
            // A subscriber set a newer value; that nested set has already
            // reached everyone still waiting here.
            if self.inner.version.get() != version {
                trace!("observable superseded during delivery at version {}", version);
                break;
            }
            if self.inner.subscribers.contains(handler.id()) {
                handler.call(&value);
            }
        }

        true
    }

    /// Subscribe a handler and push the current value to it.
    ///
    /// The first subscriber triggers [`Lifecycle::Subscribed`] before the
    /// push. If a lifecycle listener unsubscribes the handler again, the
    /// push is skipped. Returns false if the handler was already subscribed.
    pub fn subscribe(&self, handler: &Handler<T>) -> bool {
        if !self.inner.subscribers.subscribe(handler) {
            return false;
        }

        if self.inner.subscribers.len() == 1 {
            trace!("observable gained first subscriber {}", handler.id());
            self.inner.lifecycle.emit(&Lifecycle::Subscribed);
        }

        if self.inner.subscribers.contains(handler.id()) {
            let value = self.get();
            handler.call(&value);
        }

        true
    }

    /// Unsubscribe a handler. The last unsubscription triggers
    /// [`Lifecycle::Unsubscribed`]. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, handler: &Handler<T>) -> bool {
        if !self.inner.subscribers.unsubscribe(handler) {
            return false;
        }

        if self.inner.subscribers.is_empty() {
            trace!("observable lost last subscriber {}", handler.id());
            self.inner.lifecycle.emit(&Lifecycle::Unsubscribed);
        }

        true
    }

    /// Check whether a handler is subscribed.
    pub fn is_subscribed(&self, handler: &Handler<T>) -> bool {
        self.inner.subscribers.contains(handler.id())
    }

    /// Number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Check if the cell has at least one subscriber.
    pub fn has_subscribers(&self) -> bool {
        !self.inner.subscribers.is_empty()
    }

    /// Listen for first/last subscriber transitions.
    pub fn watch_lifecycle(&self, listener: &Handler<Lifecycle>) -> bool {
        self.inner.lifecycle.subscribe(listener)
    }

    /// Stop listening for lifecycle transitions.
    pub fn unwatch_lifecycle(&self, listener: &Handler<Lifecycle>) -> bool {
        self.inner.lifecycle.unsubscribe(listener)
    }

    /// Check whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + PartialEq + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("subscribers", &self.inner.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: Clone + 'static>() -> (Handler<T>, Rc<RefCell<Vec<T>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let handler = Handler::new({
            let seen = seen.clone();
            move |value: &T| seen.borrow_mut().push(value.clone())
        });
        (handler, seen)
    }

    fn lifecycle_recorder<T: Clone + PartialEq>(
        cell: &Observable<T>,
    ) -> (Handler<Lifecycle>, Rc<RefCell<Vec<Lifecycle>>>) {
        let (listener, seen) = recorder::<Lifecycle>();
        cell.watch_lifecycle(&listener);
        (listener, seen)
    }

    #[test]
    fn test_subscribe_pushes_current_value() {
        let cell = Observable::new(7);
        let (handler, seen) = recorder();

        assert!(cell.subscribe(&handler));
        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn test_duplicate_subscribe_has_no_effect() {
        let cell = Observable::new(1);
        let (handler, seen) = recorder();

        assert!(cell.subscribe(&handler));
        assert!(!cell.subscribe(&handler));
        cell.set(2);

        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(cell.subscriber_count(), 1);
    }

    #[test]
    fn test_set_equal_value_is_silent() {
        let cell = Observable::new("idle".to_string());
        let (handler, seen) = recorder();
        cell.subscribe(&handler);

        assert!(!cell.set("idle".to_string()));
        assert!(cell.set("busy".to_string()));
        assert_eq!(*seen.borrow(), vec!["idle".to_string(), "busy".to_string()]);
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn test_lifecycle_fires_once_per_crossing() {
        let cell = Observable::new(0);
        let (_listener, events) = lifecycle_recorder(&cell);
        let (a, _) = recorder();
        let (b, _) = recorder();

        cell.subscribe(&a);
        cell.subscribe(&b);
        cell.subscribe(&a);
        cell.unsubscribe(&a);
        cell.unsubscribe(&a);
        cell.unsubscribe(&b);

        assert_eq!(
            *events.borrow(),
            vec![Lifecycle::Subscribed, Lifecycle::Unsubscribed]
        );

        cell.subscribe(&b);
        assert_eq!(events.borrow().len(), 3);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let cell = Observable::new(0);
        let (_listener, events) = lifecycle_recorder(&cell);
        let (handler, _) = recorder();

        assert!(!cell.unsubscribe(&handler));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_lifecycle_runs_before_first_push() {
        let cell = Observable::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        let listener = Handler::new({
            let order = order.clone();
            let cell = cell.clone();
            move |event: &Lifecycle| {
                if *event == Lifecycle::Subscribed {
                    order.borrow_mut().push("bound".to_string());
                    // Acquire the source: the first push must already see it.
                    cell.set(42);
                }
            }
        });
        cell.watch_lifecycle(&listener);

        let handler = Handler::new({
            let order = order.clone();
            move |value: &i32| order.borrow_mut().push(format!("value {}", value))
        });
        cell.subscribe(&handler);

        // The nested set delivers 42, then the subscribe push delivers 42 again.
        assert_eq!(
            *order.borrow(),
            vec!["bound".to_string(), "value 42".to_string(), "value 42".to_string()]
        );
    }

    #[test]
    fn test_push_skipped_when_lifecycle_unsubscribes() {
        let cell = Observable::new(5);
        let (handler, seen) = recorder();

        let listener = Handler::new({
            let cell = cell.clone();
            let handler = handler.clone();
            move |event: &Lifecycle| {
                if *event == Lifecycle::Subscribed {
                    cell.unsubscribe(&handler);
                }
            }
        });
        cell.watch_lifecycle(&listener);

        assert!(cell.subscribe(&handler));
        assert!(seen.borrow().is_empty());
        assert!(!cell.has_subscribers());
    }

    #[test]
    fn test_nested_set_keeps_sequences_monotonic() {
        let cell = Observable::new(0);
        let (a, seen_a) = recorder();
        let (b, seen_b) = recorder();

        // Bumps odd values to the next even value from inside delivery.
        let bumper = Handler::new({
            let cell = cell.clone();
            move |value: &i32| {
                if value % 2 == 1 {
                    cell.set(value + 1);
                }
            }
        });

        cell.subscribe(&a);
        cell.subscribe(&bumper);
        cell.subscribe(&b);
        seen_a.borrow_mut().clear();
        seen_b.borrow_mut().clear();

        cell.set(1);

        assert_eq!(cell.get(), 2);
        for seen in [&seen_a, &seen_b] {
            let seen = seen.borrow();
            assert_eq!(seen.last(), Some(&2));
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_clones_share_state() {
        let cell = Observable::new(false);
        let other = cell.clone();
        other.set(true);
        assert!(cell.get());
        assert!(cell.ptr_eq(&other));
    }
}
