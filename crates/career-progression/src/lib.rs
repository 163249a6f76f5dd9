//! # Career Progression
//!
//! Progression trees and the career that walks them.
//!
//! A [`Progression`] is a contract plus the progressions to issue after it
//! is fulfilled or breached. A [`Career`] holds the frontier of pending
//! progressions and replaces each one with its children as it settles.
//! [`CareerBuilder`] turns a [`career_core::CareerDefinition`] into live
//! progressions, lazily by default.

pub mod builder;
pub mod career;
pub mod progression;

pub use builder::{BuildMode, BuilderConfig, CareerBuilder, StateSource};
pub use career::{Career, Issued};
pub use progression::{Branch, Progression};

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::builder::{BuildMode, BuilderConfig, CareerBuilder, StateSource};
    pub use crate::career::{Career, Issued};
    pub use crate::progression::{Branch, Progression};
    pub use career_contract::{Condition, Contract};
    pub use career_core::prelude::*;
    pub use career_state::{Handler, Observable, Signal, WorldState};
}
