//! Progression nodes.
//!
//! A progression exposes its outcome as an [`Observable<Branch>`]. The
//! branch starts as [`Branch::Pending`] and moves once to the fulfilled or
//! rejected child list when the contract settles. The contract is only
//! watched while the branch cell has subscribers: subscribing to a
//! progression binds its contract, unsubscribing unbinds it.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use career_contract::Contract;
use career_core::{ContractStatus, ProgressionId};
use career_state::{Handler, Lifecycle, Observable};
use tracing::{debug, trace};

/// The active child collection of a progression.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Branch {
    /// The contract has not settled.
    #[default]
    Pending,
    /// The contract was fulfilled; these are issued next.
    Fulfilled(Vec<Progression>),
    /// The contract was breached; these are issued next.
    Rejected(Vec<Progression>),
}

impl Branch {
    /// The children to issue, or `None` while pending.
    pub fn next(&self) -> Option<&[Progression]> {
        match self {
            Branch::Pending => None,
            Branch::Fulfilled(next) | Branch::Rejected(next) => Some(next.as_slice()),
        }
    }

    /// Check if the branch is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, Branch::Pending)
    }

    /// The contract outcome this branch corresponds to.
    pub fn outcome(&self) -> ContractStatus {
        match self {
            Branch::Pending => ContractStatus::Pending,
            Branch::Fulfilled(_) => ContractStatus::Fulfilled,
            Branch::Rejected(_) => ContractStatus::Breached,
        }
    }
}

type Build = Box<dyn FnOnce() -> Vec<Progression>>;

/// A child list that is either given up front or built on first use.
struct Children {
    built: OnceCell<Vec<Progression>>,
    deferred: RefCell<Option<Build>>,
}

impl Children {
    fn ready(children: Vec<Progression>) -> Self {
        let built = OnceCell::new();
        let _ = built.set(children);
        Self {
            built,
            deferred: RefCell::new(None),
        }
    }

    fn deferred(build: Build) -> Self {
        Self {
            built: OnceCell::new(),
            deferred: RefCell::new(Some(build)),
        }
    }

    fn is_built(&self) -> bool {
        self.built.get().is_some()
    }

    fn get(&self) -> Vec<Progression> {
        if let Some(children) = self.built.get() {
            return children.clone();
        }
        let build = self.deferred.borrow_mut().take();
        let children = build.map(|build| build()).unwrap_or_default();
        self.built.get_or_init(|| children).clone()
    }
}

struct ProgressionInner {
    id: ProgressionId,
    step: OnceCell<String>,
    contract: Contract,
    on_fulfilled: Children,
    on_rejected: Children,
    branch: Observable<Branch>,
    on_status: Handler<ContractStatus>,
    lifecycle: Handler<Lifecycle>,
}

/// A contract plus its follow-up progressions. Clones refer to the same
/// node; equality is identity.
#[derive(Clone)]
pub struct Progression {
    inner: Rc<ProgressionInner>,
}

fn with_progression(weak: &Weak<ProgressionInner>, f: impl FnOnce(Progression)) {
    if let Some(inner) = weak.upgrade() {
        f(Progression { inner });
    }
}

impl Progression {
    /// Create a progression with child lists given up front.
    pub fn new(
        contract: Contract,
        next_on_fulfilled: Vec<Progression>,
        next_on_rejected: Vec<Progression>,
    ) -> Self {
        Self::build(
            contract,
            Children::ready(next_on_fulfilled),
            Children::ready(next_on_rejected),
        )
    }

    /// Create a progression with no children; settling it ends the branch.
    pub fn leaf(contract: Contract) -> Self {
        Self::new(contract, Vec::new(), Vec::new())
    }

    /// Create a progression whose child lists are built when, and only if,
    /// the corresponding outcome happens.
    pub fn lazy(
        contract: Contract,
        build_fulfilled: impl FnOnce() -> Vec<Progression> + 'static,
        build_rejected: impl FnOnce() -> Vec<Progression> + 'static,
    ) -> Self {
        Self::build(
            contract,
            Children::deferred(Box::new(build_fulfilled)),
            Children::deferred(Box::new(build_rejected)),
        )
    }

    fn build(contract: Contract, on_fulfilled: Children, on_rejected: Children) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ProgressionInner>| {
            let on_status = Handler::new({
                let weak = weak.clone();
                move |status: &ContractStatus| {
                    with_progression(&weak, |p| p.advance(*status))
                }
            });
            let lifecycle = Handler::new({
                let weak = weak.clone();
                move |event: &Lifecycle| {
                    with_progression(&weak, |p| {
                        let status = p.inner.contract.status_cell();
                        match event {
                            Lifecycle::Subscribed => {
                                debug!(progression = %p.inner.id, "progression observed");
                                status.subscribe(&p.inner.on_status);
                            }
                            Lifecycle::Unsubscribed => {
                                debug!(progression = %p.inner.id, "progression released");
                                status.unsubscribe(&p.inner.on_status);
                            }
                        }
                    })
                }
            });

            ProgressionInner {
                id: ProgressionId::new(),
                step: OnceCell::new(),
                contract,
                on_fulfilled,
                on_rejected,
                branch: Observable::new(Branch::Pending),
                on_status,
                lifecycle,
            }
        });

        inner.branch.watch_lifecycle(&inner.lifecycle);
        Progression { inner }
    }

    fn advance(&self, status: ContractStatus) {
        let branch = match status {
            ContractStatus::Pending => return,
            ContractStatus::Fulfilled => Branch::Fulfilled(self.inner.on_fulfilled.get()),
            ContractStatus::Breached => Branch::Rejected(self.inner.on_rejected.get()),
        };
        trace!(progression = %self.inner.id, outcome = %status, "progression advancing");
        self.inner.branch.set(branch);
    }

    /// Unique id of this node.
    pub fn id(&self) -> ProgressionId {
        self.inner.id
    }

    /// Tag this node with the id of the definition step it was built from.
    /// The first tag sticks.
    pub fn with_step(self, step: impl Into<String>) -> Self {
        let _ = self.inner.step.set(step.into());
        self
    }

    /// The definition step this node was built from, if tagged.
    pub fn step(&self) -> Option<&str> {
        self.inner.step.get().map(String::as_str)
    }

    /// The contract this node waits on.
    pub fn contract(&self) -> &Contract {
        &self.inner.contract
    }

    /// The current branch.
    pub fn branch(&self) -> Branch {
        self.inner.branch.get()
    }

    /// The branch as an observable cell.
    pub fn branch_cell(&self) -> Observable<Branch> {
        self.inner.branch.clone()
    }

    /// Watch the branch. The first watcher binds the contract.
    pub fn subscribe(&self, handler: &Handler<Branch>) -> bool {
        self.inner.branch.subscribe(handler)
    }

    /// Stop watching. The last watcher leaving unbinds the contract.
    pub fn unsubscribe(&self, handler: &Handler<Branch>) -> bool {
        self.inner.branch.unsubscribe(handler)
    }

    /// Check if anything is watching this node.
    pub fn is_observed(&self) -> bool {
        self.inner.branch.has_subscribers()
    }

    /// Whether the child list for `outcome` has been materialized.
    pub fn is_expanded(&self, outcome: ContractStatus) -> bool {
        match outcome {
            ContractStatus::Pending => false,
            ContractStatus::Fulfilled => self.inner.on_fulfilled.is_built(),
            ContractStatus::Breached => self.inner.on_rejected.is_built(),
        }
    }

    /// Check whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Progression {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Progression {}

impl fmt::Debug for Progression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progression")
            .field("id", &self.inner.id)
            .field("contract", &self.inner.contract.display_name())
            .field("status", &self.inner.contract.status())
            .field("observed", &self.is_observed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use career_contract::Condition;
    use std::cell::Cell;

    fn branch_log(progression: &Progression) -> (Handler<Branch>, Rc<RefCell<Vec<ContractStatus>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let handler = Handler::new({
            let log = log.clone();
            move |branch: &Branch| log.borrow_mut().push(branch.outcome())
        });
        progression.subscribe(&handler);
        (handler, log)
    }

    #[test]
    fn test_unobserved_progression_never_binds() {
        let progression = Progression::leaf(Contract::new(Condition::always(), Condition::never()));
        assert!(progression.contract().is_pending());
        assert!(progression.branch().is_pending());
        assert!(!progression.is_observed());
    }

    #[test]
    fn test_subscribing_binds_contract() {
        let done = Observable::new(false);
        let contract = Contract::new(Condition::observe(&done, |v| *v), Condition::never());
        let progression = Progression::leaf(contract.clone());

        let (handler, log) = branch_log(&progression);
        assert!(contract.is_bound());
        assert_eq!(*log.borrow(), vec![ContractStatus::Pending]);

        progression.unsubscribe(&handler);
        assert!(!contract.is_bound());
        assert!(!contract.status_cell().has_subscribers());
    }

    #[test]
    fn test_fulfilled_exposes_fulfilled_children() {
        let done = Observable::new(false);
        let next = Progression::leaf(Contract::new(Condition::never(), Condition::never()));
        let fallback = Progression::leaf(Contract::new(Condition::never(), Condition::never()));
        let progression = Progression::new(
            Contract::new(Condition::observe(&done, |v| *v), Condition::never()),
            vec![next.clone()],
            vec![fallback],
        );

        let (_handler, log) = branch_log(&progression);
        done.set(true);

        assert_eq!(progression.branch(), Branch::Fulfilled(vec![next.clone()]));
        assert_eq!(progression.branch().next().unwrap(), &[next][..]);
        assert_eq!(
            *log.borrow(),
            vec![ContractStatus::Pending, ContractStatus::Fulfilled]
        );
    }

    #[test]
    fn test_breached_exposes_rejected_children() {
        let fallback = Progression::leaf(Contract::new(Condition::never(), Condition::never()));
        let progression = Progression::new(
            Contract::new(Condition::never(), Condition::always()),
            Vec::new(),
            vec![fallback.clone()],
        );

        let (_handler, log) = branch_log(&progression);
        assert_eq!(progression.branch(), Branch::Rejected(vec![fallback]));
        assert_eq!(log.borrow().last(), Some(&ContractStatus::Breached));
    }

    #[test]
    fn test_branch_never_reverts() {
        let progression = Progression::leaf(Contract::new(Condition::always(), Condition::never()));
        let (handler, _log) = branch_log(&progression);
        progression.unsubscribe(&handler);

        // Rebinding a settled contract is a no-op; the branch stays put.
        let (_again, log) = branch_log(&progression);
        assert_eq!(progression.branch(), Branch::Fulfilled(Vec::new()));
        assert_eq!(*log.borrow(), vec![ContractStatus::Fulfilled]);
    }

    #[test]
    fn test_lazy_builds_only_taken_branch() {
        let built = Rc::new(Cell::new(0));
        let progression = Progression::lazy(
            Contract::new(Condition::always(), Condition::never()),
            {
                let built = built.clone();
                move || {
                    built.set(built.get() + 1);
                    vec![Progression::leaf(Contract::new(Condition::never(), Condition::never()))]
                }
            },
            || panic!("rejected branch must not be built"),
        );

        assert!(!progression.is_expanded(ContractStatus::Fulfilled));
        let (_handler, _log) = branch_log(&progression);

        assert_eq!(built.get(), 1);
        assert!(progression.is_expanded(ContractStatus::Fulfilled));
        assert!(!progression.is_expanded(ContractStatus::Breached));
        assert_eq!(progression.branch().next().map(|n| n.len()), Some(1));
    }

    #[test]
    fn test_identity_equality() {
        let contract = Contract::new(Condition::never(), Condition::never());
        let a = Progression::leaf(contract.clone());
        let b = Progression::leaf(contract);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_step_tag() {
        let progression = Progression::leaf(Contract::new(Condition::never(), Condition::never()));
        assert_eq!(progression.step(), None);

        let progression = progression.with_step("smelt").with_step("ignored");
        assert_eq!(progression.step(), Some("smelt"));
    }
}
