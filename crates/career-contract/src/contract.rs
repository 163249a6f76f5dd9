//! Contracts.
//!
//! A contract settles exactly once. While bound it listens to the
//! satisfied signal of its obligation and of its violation; the first to
//! fire decides the outcome. At bind time a violation that already holds
//! wins over an obligation that already holds.
//!
//! ```text
//!            obligation satisfied
//!   Pending ---------------------> Fulfilled
//!      |
//!      |     violation satisfied
//!      +-------------------------> Breached
//! ```
//!
//! The status is also exposed as an [`Observable`]. Its first subscriber
//! binds the contract and its last unsubscriber unbinds it, so watching a
//! contract is what makes it evaluate.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use career_core::{ContractId, ContractStatus};
use career_state::{Handler, Lifecycle, Observable};
use tracing::{debug, info, trace};

use crate::condition::Condition;

struct ContractInner {
    id: ContractId,
    title: Option<String>,
    obligation: Condition,
    violation: Condition,
    /// Latched before self-cleanup so reentrant signals cannot settle twice.
    settled: Cell<ContractStatus>,
    bound: Cell<bool>,
    status: Observable<ContractStatus>,
    on_obligation: Handler<()>,
    on_violation: Handler<()>,
    lifecycle: Handler<Lifecycle>,
}

/// A two-condition state machine. Clones refer to the same contract.
#[derive(Clone)]
pub struct Contract {
    inner: Rc<ContractInner>,
}

fn with_contract(weak: &Weak<ContractInner>, f: impl FnOnce(Contract)) {
    if let Some(inner) = weak.upgrade() {
        f(Contract { inner });
    }
}

impl Contract {
    /// Create a pending contract.
    pub fn new(obligation: Condition, violation: Condition) -> Self {
        Self::build(None, obligation, violation)
    }

    /// Create a pending contract with a display title.
    pub fn titled(title: impl Into<String>, obligation: Condition, violation: Condition) -> Self {
        Self::build(Some(title.into()), obligation, violation)
    }

    fn build(title: Option<String>, obligation: Condition, violation: Condition) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ContractInner>| {
            let on_obligation = Handler::new({
                let weak = weak.clone();
                move |_: &()| with_contract(&weak, |c| c.settle(ContractStatus::Fulfilled))
            });
            let on_violation = Handler::new({
                let weak = weak.clone();
                move |_: &()| with_contract(&weak, |c| c.settle(ContractStatus::Breached))
            });
            let lifecycle = Handler::new({
                let weak = weak.clone();
                move |event: &Lifecycle| {
                    with_contract(&weak, |c| match event {
                        Lifecycle::Subscribed => c.bind(),
                        Lifecycle::Unsubscribed => c.unbind(),
                    })
                }
            });

            ContractInner {
                id: ContractId::new(),
                title,
                obligation,
                violation,
                settled: Cell::new(ContractStatus::Pending),
                bound: Cell::new(false),
                status: Observable::new(ContractStatus::Pending),
                on_obligation,
                on_violation,
                lifecycle,
            }
        });

        inner.status.watch_lifecycle(&inner.lifecycle);
        Contract { inner }
    }

    /// Unique id of this contract.
    pub fn id(&self) -> ContractId {
        self.inner.id
    }

    /// Display title, if any.
    pub fn title(&self) -> Option<&str> {
        self.inner.title.as_deref()
    }

    /// Title if present, id otherwise.
    pub fn display_name(&self) -> String {
        match &self.inner.title {
            Some(title) => title.clone(),
            None => self.inner.id.to_string(),
        }
    }

    /// Current status.
    pub fn status(&self) -> ContractStatus {
        self.inner.settled.get()
    }

    /// Check if the contract has not settled yet.
    pub fn is_pending(&self) -> bool {
        self.status().is_pending()
    }

    /// Whether the contract is currently listening to its conditions.
    pub fn is_bound(&self) -> bool {
        self.inner.bound.get()
    }

    /// The condition that fulfills this contract.
    pub fn obligation(&self) -> &Condition {
        &self.inner.obligation
    }

    /// The condition that breaches this contract.
    pub fn violation(&self) -> &Condition {
        &self.inner.violation
    }

    /// The status as an observable cell. Subscribing binds the contract.
    pub fn status_cell(&self) -> Observable<ContractStatus> {
        self.inner.status.clone()
    }

    /// Check whether two handles refer to the same contract.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Start listening to both conditions and settle immediately if either
    /// already holds, violation first. No-op once settled.
    pub fn bind(&self) {
        if !self.is_pending() {
            trace!(contract = %self.inner.id, status = %self.status(), "bind ignored, contract settled");
            return;
        }

        debug!(contract = %self.inner.id, "binding contract");
        let inner = &self.inner;
        inner.bound.set(true);

        inner.obligation.bind();
        inner.violation.bind();
        inner.obligation.on_satisfied().subscribe(&inner.on_obligation);
        inner.violation.on_satisfied().subscribe(&inner.on_violation);

        if inner.violation.is_satisfied() {
            self.settle(ContractStatus::Breached);
        } else if inner.obligation.is_satisfied() {
            self.settle(ContractStatus::Fulfilled);
        }
    }

    /// Stop listening to both conditions. Leaves the status unchanged.
    /// Safe to call repeatedly and from inside a reaction.
    pub fn unbind(&self) {
        let inner = &self.inner;
        if !inner.bound.replace(false) {
            return;
        }

        debug!(contract = %inner.id, "unbinding contract");
        inner.obligation.on_satisfied().unsubscribe(&inner.on_obligation);
        inner.violation.on_satisfied().unsubscribe(&inner.on_violation);
        inner.obligation.unbind();
        inner.violation.unbind();
    }

    /// Re-assert both condition trees of a bound, pending contract.
    ///
    /// The violation is refreshed first, so a frame in which both become
    /// true breaches the contract.
    pub fn refresh(&self) {
        if !self.is_pending() || !self.is_bound() {
            return;
        }
        self.inner.violation.refresh();
        if self.is_pending() {
            self.inner.obligation.refresh();
        }
    }

    fn settle(&self, outcome: ContractStatus) {
        if !self.is_pending() {
            return;
        }
        self.inner.settled.set(outcome);
        info!(contract = %self.inner.id, title = ?self.inner.title, status = %outcome, "contract settled");

        self.unbind();
        self.inner.status.set(outcome);
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("id", &self.inner.id)
            .field("title", &self.inner.title)
            .field("status", &self.status())
            .field("bound", &self.is_bound())
            .finish()
    }
}
