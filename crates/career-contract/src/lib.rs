//! # Career Contract
//!
//! Conditions and contracts.
//!
//! A [`Condition`] is a boolean that re-evaluates when its triggers fire
//! while bound. A [`Contract`] watches an obligation and a violation
//! condition and settles once, on whichever is satisfied first.

pub mod condition;
pub mod contract;

pub use condition::{Condition, Hooks, WeakCondition};
pub use contract::Contract;
