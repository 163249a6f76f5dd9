//! Conditions.
//!
//! A condition caches the result of its assertion in `satisfied` and
//! announces changes through two signals, [`Condition::on_satisfied`] and
//! [`Condition::on_dissatisfied`]. Its bind and unbind hooks connect the
//! assertion to whatever should re-run it: an external signal, an
//! observable cell, or, for composites, the child conditions.
//!
//! Conditions are created detached and may be bound and unbound any number
//! of times. Unbinding never changes `satisfied` and never fires.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use career_core::ConditionKind;
use career_state::{Handler, Observable, Signal};
use tracing::{debug, trace};

/// The three closures behind a condition.
pub struct Hooks {
    assertion: Box<dyn Fn() -> bool>,
    bind: Box<dyn Fn()>,
    unbind: Box<dyn Fn()>,
}

impl Hooks {
    /// Hooks from an assertion and a bind/unbind pair.
    pub fn new(
        assertion: impl Fn() -> bool + 'static,
        bind: impl Fn() + 'static,
        unbind: impl Fn() + 'static,
    ) -> Self {
        Self {
            assertion: Box::new(assertion),
            bind: Box::new(bind),
            unbind: Box::new(unbind),
        }
    }

    /// Hooks with no triggers; the assertion only runs when asked.
    pub fn passive(assertion: impl Fn() -> bool + 'static) -> Self {
        Self::new(assertion, || {}, || {})
    }
}

struct ConditionInner {
    kind: ConditionKind,
    satisfied: Cell<bool>,
    bound: Cell<bool>,
    /// Set while the bind hook runs; assertions update silently then.
    binding: Cell<bool>,
    children: Vec<Condition>,
    hooks: Hooks,
    on_satisfied: Signal<()>,
    on_dissatisfied: Signal<()>,
}

/// A boolean observable with explicit bind/unbind. Clones share state.
#[derive(Clone)]
pub struct Condition {
    inner: Rc<ConditionInner>,
}

/// A non-owning handle to a condition, for use inside its own hooks.
#[derive(Clone)]
pub struct WeakCondition {
    inner: Weak<ConditionInner>,
}

impl WeakCondition {
    /// Get the condition if it is still alive.
    pub fn upgrade(&self) -> Option<Condition> {
        self.inner.upgrade().map(|inner| Condition { inner })
    }

    /// Re-assert the condition if it is still alive.
    pub fn assert(&self) {
        if let Some(condition) = self.upgrade() {
            condition.assert();
        }
    }

    /// A handler that re-asserts the condition whenever it is called.
    pub fn reasserter<E>(&self) -> Handler<E> {
        let this = self.clone();
        Handler::new(move |_: &E| this.assert())
    }
}

impl Condition {
    fn build(
        kind: ConditionKind,
        children: Vec<Condition>,
        hooks: impl FnOnce(&WeakCondition) -> Hooks,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak| {
            let this = WeakCondition {
                inner: weak.clone(),
            };
            ConditionInner {
                kind,
                satisfied: Cell::new(false),
                bound: Cell::new(false),
                binding: Cell::new(false),
                children,
                hooks: hooks(&this),
                on_satisfied: Signal::new(),
                on_dissatisfied: Signal::new(),
            }
        });
        let condition = Condition { inner };
        condition
            .inner
            .satisfied
            .set((condition.inner.hooks.assertion)());
        condition
    }

    /// An atomic condition with caller-supplied hooks.
    ///
    /// `hooks` receives a weak handle to the condition being built, so its
    /// bind closure can register [`WeakCondition::reasserter`] handlers.
    pub fn custom(hooks: impl FnOnce(&WeakCondition) -> Hooks) -> Self {
        Self::build(ConditionKind::Atomic, Vec::new(), hooks)
    }

    /// An atomic condition without triggers. Something outside has to call
    /// [`Condition::assert`] (typically once per frame).
    pub fn polled(assertion: impl Fn() -> bool + 'static) -> Self {
        Self::build(ConditionKind::Atomic, Vec::new(), |_| {
            Hooks::passive(assertion)
        })
    }

    /// An atomic condition re-asserted on every emission of `trigger` while
    /// bound.
    pub fn when<E: 'static>(
        trigger: &Rc<Signal<E>>,
        assertion: impl Fn() -> bool + 'static,
    ) -> Self {
        let trigger = Rc::clone(trigger);
        Self::build(ConditionKind::Atomic, Vec::new(), move |this| {
            let handler = this.reasserter::<E>();
            let unbind_trigger = Rc::clone(&trigger);
            let unbind_handler = handler.clone();
            Hooks::new(
                assertion,
                move || {
                    trigger.subscribe(&handler);
                },
                move || {
                    unbind_trigger.unsubscribe(&unbind_handler);
                },
            )
        })
    }

    /// An atomic condition over an observable cell, re-asserted whenever the
    /// cell changes while bound.
    pub fn observe<T: Clone + PartialEq + 'static>(
        cell: &Observable<T>,
        predicate: impl Fn(&T) -> bool + 'static,
    ) -> Self {
        let cell = cell.clone();
        Self::build(ConditionKind::Atomic, Vec::new(), move |this| {
            let handler = this.reasserter::<T>();
            let bind_cell = cell.clone();
            let bind_handler = handler.clone();
            let unbind_cell = cell.clone();
            Hooks::new(
                move || cell.with(|value| predicate(value)),
                move || {
                    bind_cell.subscribe(&bind_handler);
                },
                move || {
                    unbind_cell.unsubscribe(&handler);
                },
            )
        })
    }

    /// A condition that is always satisfied.
    pub fn always() -> Self {
        Self::build(ConditionKind::Always, Vec::new(), |_| Hooks::passive(|| true))
    }

    /// A condition that is never satisfied.
    pub fn never() -> Self {
        Self::build(ConditionKind::Never, Vec::new(), |_| Hooks::passive(|| false))
    }

    /// Satisfied iff every child is satisfied. `all(vec![])` is satisfied.
    pub fn all(children: Vec<Condition>) -> Self {
        Self::composite(ConditionKind::All, children)
    }

    /// Satisfied iff any child is satisfied. `any(vec![])` is not satisfied.
    pub fn any(children: Vec<Condition>) -> Self {
        Self::composite(ConditionKind::Any, children)
    }

    fn composite(kind: ConditionKind, children: Vec<Condition>) -> Self {
        let hook_children = children.clone();
        Self::build(kind, children, move |this| {
            let reassert = this.reasserter::<()>();

            let assertion = {
                let children = hook_children.clone();
                move || match kind {
                    ConditionKind::Any => children.iter().any(Condition::is_satisfied),
                    _ => children.iter().all(Condition::is_satisfied),
                }
            };

            let bind = {
                let children = hook_children.clone();
                let reassert = reassert.clone();
                move || {
                    for child in &children {
                        child.on_satisfied().subscribe(&reassert);
                        child.on_dissatisfied().subscribe(&reassert);
                    }
                    // Declaration order keeps partial-binding effects reproducible.
                    for child in &children {
                        child.bind();
                    }
                }
            };

            let unbind = {
                let children = hook_children;
                move || {
                    for child in &children {
                        child.on_satisfied().unsubscribe(&reassert);
                        child.on_dissatisfied().unsubscribe(&reassert);
                    }
                    for child in &children {
                        child.unbind();
                    }
                }
            };

            Hooks::new(assertion, bind, unbind)
        })
    }

    /// The shape of this condition.
    pub fn kind(&self) -> ConditionKind {
        self.inner.kind
    }

    /// Result of the last assertion.
    pub fn is_satisfied(&self) -> bool {
        self.inner.satisfied.get()
    }

    /// Whether the bind hook has run without a matching unbind.
    pub fn is_bound(&self) -> bool {
        self.inner.bound.get()
    }

    /// Child conditions of a composite; empty otherwise.
    pub fn children(&self) -> &[Condition] {
        &self.inner.children
    }

    /// Fired when an assertion flips to satisfied, and on bind if satisfied.
    pub fn on_satisfied(&self) -> &Signal<()> {
        &self.inner.on_satisfied
    }

    /// Fired when an assertion flips to dissatisfied, and on bind if not
    /// satisfied.
    pub fn on_dissatisfied(&self) -> &Signal<()> {
        &self.inner.on_dissatisfied
    }

    /// A weak handle to this condition.
    pub fn downgrade(&self) -> WeakCondition {
        WeakCondition {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Check whether two handles refer to the same condition.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Re-run the assertion. Fires the signal for the new state only if the
    /// result changed. Returns the new result.
    pub fn assert(&self) -> bool {
        let satisfied = (self.inner.hooks.assertion)();
        let previous = self.inner.satisfied.replace(satisfied);

        if previous != satisfied && !self.inner.binding.get() {
            trace!(kind = ?self.inner.kind, satisfied, "condition changed");
            self.announce(satisfied);
        }

        satisfied
    }

    /// Re-assert the whole tree, leaves first.
    pub fn refresh(&self) -> bool {
        for child in &self.inner.children {
            child.refresh();
        }
        self.assert()
    }

    /// Run the bind hook, re-assert, and fire exactly one signal for the
    /// current state whether or not it changed.
    pub fn bind(&self) {
        debug!(kind = ?self.inner.kind, "binding condition");

        let was_binding = self.inner.binding.replace(true);
        (self.inner.hooks.bind)();
        self.inner.binding.set(was_binding);
        self.inner.bound.set(true);

        let satisfied = (self.inner.hooks.assertion)();
        self.inner.satisfied.set(satisfied);
        self.announce(satisfied);
    }

    /// Run the unbind hook. Leaves `satisfied` untouched and fires nothing.
    pub fn unbind(&self) {
        debug!(kind = ?self.inner.kind, "unbinding condition");
        (self.inner.hooks.unbind)();
        self.inner.bound.set(false);
    }

    fn announce(&self, satisfied: bool) {
        if satisfied {
            self.inner.on_satisfied.emit(&());
        } else {
            self.inner.on_dissatisfied.emit(&());
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("kind", &self.inner.kind)
            .field("satisfied", &self.inner.satisfied.get())
            .field("bound", &self.inner.bound.get())
            .field("children", &self.inner.children.len())
            .finish()
    }
}
