//! The career frontier.
//!
//! A career holds the progressions currently waiting on their contracts.
//! Issuing a progression adds it to the frontier, announces its contract on
//! [`Career::on_issued`], and subscribes to its branch, which binds the
//! contract. When the branch resolves, the progression leaves the frontier
//! and each of its children is issued in turn. Only the taken branch of the
//! tree is ever visited.
//!
//! Resolutions cascade synchronously: a child whose contract already holds
//! settles inside its own issue. A step that would re-enter its own chain of
//! resolving ancestors is parked instead and issued by the next
//! [`Career::refresh`], so a repeatable step advances once per refresh.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use career_contract::Contract;
use career_core::ProgressionId;
use career_state::{Handler, Signal};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::progression::{Branch, Progression};

/// Announcement of a newly active contract.
#[derive(Debug, Clone)]
pub struct Issued {
    /// The contract now pending.
    pub contract: Contract,

    /// The progression node that carries it.
    pub progression: ProgressionId,

    /// When it was issued.
    pub issued_at: DateTime<Utc>,
}

/// A frontier member and the handler watching it.
struct Entry {
    progression: Progression,
    handler: Handler<Branch>,
}

struct CareerInner {
    frontier: RefCell<Vec<Entry>>,
    issued: Signal<Issued>,
    issued_total: Cell<usize>,
    settled_total: Cell<usize>,
    /// Steps of the progressions currently issuing their children.
    resolving: RefCell<Vec<String>>,
    parked: RefCell<Vec<Progression>>,
}

impl Drop for CareerInner {
    fn drop(&mut self) {
        // Release every pending contract so nothing stays bound to the world.
        for entry in self.frontier.get_mut().drain(..) {
            entry.progression.unsubscribe(&entry.handler);
        }
    }
}

/// Tracker of the pending frontier. Clones refer to the same career.
#[derive(Clone)]
pub struct Career {
    inner: Rc<CareerInner>,
}

impl Career {
    /// Create a career with an empty frontier.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(CareerInner {
                frontier: RefCell::new(Vec::new()),
                issued: Signal::new(),
                issued_total: Cell::new(0),
                settled_total: Cell::new(0),
                resolving: RefCell::new(Vec::new()),
                parked: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Issue a progression.
    ///
    /// Issuing a progression that is already pending is absorbed: it is not
    /// announced again and its resolution is processed once.
    pub fn issue(&self, progression: Progression) {
        if self.contains(&progression) {
            warn!(progression = %progression.id(), "progression already pending, ignoring reissue");
            return;
        }

        if let Some(step) = progression.step() {
            if self.inner.resolving.borrow().iter().any(|s| s == step) {
                debug!(progression = %progression.id(), step, "step repeats within one cascade, parking");
                self.inner.parked.borrow_mut().push(progression);
                return;
            }
        }

        let handler = self.resolution_handler(progression.id());
        self.inner.frontier.borrow_mut().push(Entry {
            progression: progression.clone(),
            handler: handler.clone(),
        });
        self.inner.issued_total.set(self.inner.issued_total.get() + 1);

        let contract = progression.contract().clone();
        info!(
            progression = %progression.id(),
            contract = %contract.display_name(),
            "contract issued"
        );
        self.inner.issued.emit(&Issued {
            contract,
            progression: progression.id(),
            issued_at: Utc::now(),
        });

        // An issued listener may have abandoned it already.
        if self.contains(&progression) {
            progression.subscribe(&handler);
        }
    }

    /// Issue a bare contract as a leaf progression and return that leaf.
    pub fn issue_contract(&self, contract: Contract) -> Progression {
        let progression = Progression::leaf(contract);
        self.issue(progression.clone());
        progression
    }

    /// Remove a pending progression without settling it, unbinding its
    /// contract.
    ///
    /// # Panics
    ///
    /// Panics if the progression is not pending in this career.
    pub fn abandon(&self, progression: &Progression) {
        let entry = self.take(progression.id());
        info!(progression = %progression.id(), "progression abandoned");
        entry.progression.unsubscribe(&entry.handler);
    }

    /// Contracts of every pending progression, in issue order.
    pub fn pending(&self) -> Vec<Contract> {
        self.inner
            .frontier
            .borrow()
            .iter()
            .map(|e| e.progression.contract().clone())
            .collect()
    }

    /// Every pending progression, in issue order.
    pub fn pending_progressions(&self) -> Vec<Progression> {
        self.inner
            .frontier
            .borrow()
            .iter()
            .map(|e| e.progression.clone())
            .collect()
    }

    /// Check whether a progression is pending in this career.
    pub fn contains(&self, progression: &Progression) -> bool {
        let id = progression.id();
        self.inner
            .frontier
            .borrow()
            .iter()
            .any(|e| e.progression.id() == id)
    }

    /// Number of pending progressions.
    pub fn len(&self) -> usize {
        self.inner.frontier.borrow().len()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.frontier.borrow().is_empty()
    }

    /// Progressions parked until the next refresh. They are not pending and
    /// have not been announced yet.
    pub fn parked(&self) -> Vec<Progression> {
        self.inner.parked.borrow().clone()
    }

    /// Check if nothing is pending or parked.
    pub fn is_idle(&self) -> bool {
        self.is_empty() && self.inner.parked.borrow().is_empty()
    }

    /// Total number of progressions issued so far.
    pub fn issued_total(&self) -> usize {
        self.inner.issued_total.get()
    }

    /// Total number of progressions that settled so far.
    pub fn settled_total(&self) -> usize {
        self.inner.settled_total.get()
    }

    /// Fired once for every issued contract.
    pub fn on_issued(&self) -> &Signal<Issued> {
        &self.inner.issued
    }

    /// Issue parked progressions, then re-assert the conditions of every
    /// pending contract. Meant for a per-frame driver; conditions with
    /// discrete triggers do not need the second half.
    pub fn refresh(&self) {
        let parked = std::mem::take(&mut *self.inner.parked.borrow_mut());
        for progression in parked {
            self.issue(progression);
        }
        for contract in self.pending() {
            contract.refresh();
        }
    }

    fn resolution_handler(&self, id: ProgressionId) -> Handler<Branch> {
        let career: Weak<CareerInner> = Rc::downgrade(&self.inner);
        Handler::new(move |branch: &Branch| {
            let Some(next) = branch.next() else {
                return;
            };
            if let Some(inner) = career.upgrade() {
                Career { inner }.advance(id, branch, next);
            }
        })
    }

    fn advance(&self, id: ProgressionId, branch: &Branch, next: &[Progression]) {
        let entry = self.take(id);
        // Unsubscribe first so the progression's own subscribe call cannot
        // deliver the resolved branch a second time.
        entry.progression.unsubscribe(&entry.handler);
        self.inner.settled_total.set(self.inner.settled_total.get() + 1);

        debug!(
            progression = %id,
            outcome = %branch.outcome(),
            children = next.len(),
            "progression resolved"
        );
        let step = entry.progression.step().map(str::to_string);
        if let Some(step) = &step {
            self.inner.resolving.borrow_mut().push(step.clone());
        }
        for child in next {
            self.issue(child.clone());
        }
        if step.is_some() {
            self.inner.resolving.borrow_mut().pop();
        }
    }

    fn take(&self, id: ProgressionId) -> Entry {
        let mut frontier = self.inner.frontier.borrow_mut();
        let index = frontier
            .iter()
            .position(|e| e.progression.id() == id)
            .unwrap_or_else(|| panic!("progression {} is not pending in this career", id));
        frontier.remove(index)
    }
}

impl Default for Career {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Career {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Career")
            .field("pending", &self.len())
            .field("issued_total", &self.issued_total())
            .field("settled_total", &self.settled_total())
            .field("parked", &self.inner.parked.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use career_contract::Condition;
    use career_core::ContractStatus;
    use career_state::Observable;

    fn issued_log(career: &Career) -> (Handler<Issued>, Rc<RefCell<Vec<Contract>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let handler = Handler::new({
            let log = log.clone();
            move |issued: &Issued| log.borrow_mut().push(issued.contract.clone())
        });
        career.on_issued().subscribe(&handler);
        (handler, log)
    }

    fn stuck() -> Contract {
        Contract::new(Condition::never(), Condition::never())
    }

    fn flag(cell: &Observable<bool>) -> Condition {
        Condition::observe(cell, |v| *v)
    }

    #[test]
    fn test_immediate_resolution_issues_child() {
        let career = Career::new();
        let (_handler, log) = issued_log(&career);

        let child = Progression::leaf(stuck());
        let parent = Progression::new(
            Contract::new(Condition::always(), Condition::never()),
            vec![child.clone()],
            Vec::new(),
        );
        career.issue(parent.clone());

        let issued = log.borrow();
        assert_eq!(issued.len(), 2);
        assert!(issued[0].ptr_eq(parent.contract()));
        assert!(issued[1].ptr_eq(child.contract()));

        let pending = career.pending();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].ptr_eq(child.contract()));
        assert_eq!(parent.contract().status(), ContractStatus::Fulfilled);
        assert!(!parent.is_observed());
    }

    #[test]
    fn test_unresolved_progression_stays_pending() {
        let career = Career::new();
        let (_handler, log) = issued_log(&career);

        let child = Progression::leaf(stuck());
        let root = Progression::new(stuck(), vec![child.clone()], vec![child]);
        career.issue(root.clone());
        career.refresh();
        career.refresh();

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(career.pending_progressions(), vec![root.clone()]);
        assert!(root.contract().is_bound());
    }

    #[test]
    fn test_resolution_follows_taken_branch() {
        let career = Career::new();
        let done = Observable::new(false);
        let failed = Observable::new(false);

        let promoted = Progression::leaf(stuck());
        let demoted = Progression::leaf(stuck());
        let root = Progression::new(
            Contract::new(flag(&done), flag(&failed)),
            vec![promoted.clone()],
            vec![demoted.clone()],
        );
        career.issue(root.clone());
        assert_eq!(career.len(), 1);

        failed.set(true);
        assert_eq!(career.pending_progressions(), vec![demoted]);
        assert!(!career.contains(&root));
        assert!(!career.contains(&promoted));
        assert!(!done.has_subscribers());
        assert_eq!(career.settled_total(), 1);
    }

    #[test]
    fn test_leaf_resolution_shrinks_frontier() {
        let career = Career::new();
        let done = Observable::new(false);

        career.issue_contract(Contract::new(flag(&done), Condition::never()));
        career.issue_contract(stuck());
        assert_eq!(career.len(), 2);

        done.set(true);
        assert_eq!(career.len(), 1);
        assert_eq!(career.issued_total(), 2);
    }

    #[test]
    fn test_fan_out_issues_children_in_order() {
        let career = Career::new();
        let (_handler, log) = issued_log(&career);

        let children: Vec<Progression> = (0..3).map(|_| Progression::leaf(stuck())).collect();
        let root = Progression::new(
            Contract::new(Condition::always(), Condition::never()),
            children.clone(),
            Vec::new(),
        );
        career.issue(root);

        assert_eq!(career.pending_progressions(), children);
        let issued = log.borrow();
        for (contract, child) in issued[1..].iter().zip(&children) {
            assert!(contract.ptr_eq(child.contract()));
        }
    }

    #[test]
    fn test_chain_resolves_through_several_levels() {
        let career = Career::new();
        let (_handler, log) = issued_log(&career);

        let last = Progression::leaf(stuck());
        let middle = Progression::new(
            Contract::new(Condition::always(), Condition::never()),
            vec![last.clone()],
            Vec::new(),
        );
        let first = Progression::new(
            Contract::new(Condition::always(), Condition::never()),
            vec![middle],
            Vec::new(),
        );
        career.issue(first);

        assert_eq!(log.borrow().len(), 3);
        assert_eq!(career.pending_progressions(), vec![last]);
        assert_eq!(career.settled_total(), 2);
    }

    #[test]
    fn test_duplicate_issue_is_absorbed() {
        let career = Career::new();
        let (_handler, log) = issued_log(&career);
        let done = Observable::new(false);

        let progression = Progression::leaf(Contract::new(flag(&done), Condition::never()));
        career.issue(progression.clone());
        career.issue(progression.clone());

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(career.len(), 1);

        done.set(true);
        assert!(career.is_empty());
        assert_eq!(career.settled_total(), 1);
    }

    #[test]
    fn test_abandon_unbinds_contract() {
        let career = Career::new();
        let done = Observable::new(false);
        let progression = Progression::leaf(Contract::new(flag(&done), Condition::never()));

        career.issue(progression.clone());
        assert!(done.has_subscribers());

        career.abandon(&progression);
        assert!(career.is_empty());
        assert!(!progression.contract().is_bound());
        assert!(!done.has_subscribers());

        done.set(true);
        assert!(progression.contract().is_pending());
    }

    #[test]
    #[should_panic(expected = "is not pending in this career")]
    fn test_abandon_unknown_progression_panics() {
        let career = Career::new();
        career.abandon(&Progression::leaf(stuck()));
    }

    #[test]
    fn test_abandon_from_issued_listener() {
        let career = Career::new();
        let progression = Progression::leaf(Contract::new(Condition::always(), Condition::never()));

        let handler = Handler::new({
            let career = Rc::downgrade(&career.inner);
            move |issued: &Issued| {
                if let Some(inner) = career.upgrade() {
                    let career = Career { inner };
                    for p in career.pending_progressions() {
                        if p.id() == issued.progression {
                            career.abandon(&p);
                        }
                    }
                }
            }
        });
        career.on_issued().subscribe(&handler);

        career.issue(progression.clone());
        assert!(career.is_empty());
        assert!(progression.contract().is_pending());
    }

    #[test]
    fn test_refresh_drives_polled_conditions() {
        let career = Career::new();
        let ticks = Rc::new(Cell::new(0));
        let obligation = Condition::polled({
            let ticks = ticks.clone();
            move || ticks.get() >= 3
        });
        let next = Progression::leaf(stuck());
        career.issue(Progression::new(
            Contract::new(obligation, Condition::never()),
            vec![next.clone()],
            Vec::new(),
        ));

        for _ in 0..3 {
            assert!(!career.contains(&next));
            ticks.set(ticks.get() + 1);
            career.refresh();
        }
        assert_eq!(career.pending_progressions(), vec![next]);
    }

    #[test]
    fn test_repeating_step_parks_until_refresh() {
        let career = Career::new();
        let (_handler, log) = issued_log(&career);

        let again = Progression::leaf(Contract::new(Condition::always(), Condition::never()))
            .with_step("chores");
        let first = Progression::new(
            Contract::new(Condition::always(), Condition::never()),
            vec![again.clone()],
            Vec::new(),
        )
        .with_step("chores");
        career.issue(first);

        assert_eq!(log.borrow().len(), 1);
        assert!(career.is_empty());
        assert!(!career.is_idle());
        assert_eq!(career.parked(), vec![again.clone()]);
        assert!(again.contract().is_pending());

        career.refresh();
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(again.contract().status(), ContractStatus::Fulfilled);
        assert!(career.is_idle());
    }

    #[test]
    fn test_distinct_steps_cascade_in_one_call() {
        let career = Career::new();
        let shared = Progression::leaf(stuck()).with_step("report");
        let left = Progression::new(
            Contract::new(Condition::always(), Condition::never()),
            vec![shared.clone()],
            Vec::new(),
        )
        .with_step("left");
        let root = Progression::new(
            Contract::new(Condition::always(), Condition::never()),
            vec![left],
            Vec::new(),
        )
        .with_step("root");
        career.issue(root);

        assert_eq!(career.pending_progressions(), vec![shared]);
        assert!(career.parked().is_empty());
    }

    #[test]
    fn test_dropping_career_releases_contracts() {
        let done = Observable::new(false);
        let progression = Progression::leaf(Contract::new(flag(&done), Condition::never()));
        {
            let career = Career::new();
            career.issue(progression.clone());
            assert!(done.has_subscribers());
        }
        assert!(!done.has_subscribers());
        assert!(!progression.is_observed());
    }
}
