//! # Career Core
//!
//! Core identifiers and data types shared by the career progression crates.
//!
//! This crate provides the fundamental building blocks:
//! - [`ContractStatus`] - Tri-state outcome of a contract
//! - [`CareerDefinition`] - Serializable arena of progression steps
//! - [`CareerError`] - Errors raised by the definition and state surfaces

pub mod definition;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use definition::{CareerDefinition, ConditionDefinition, StepDefinition};
pub use error::{CareerError, Result};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::definition::{CareerDefinition, ConditionDefinition, StepDefinition};
    pub use crate::error::{CareerError, Result};
    pub use crate::types::{ConditionKind, ContractId, ContractStatus, HandlerId, ProgressionId};
}
