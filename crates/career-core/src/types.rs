//! Common types used across the career crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identity of a subscription handler. Two handlers are the same
    /// subscriber exactly when their ids are equal.
    HandlerId
);

define_id!(
    /// Identity of a live contract.
    ContractId
);

define_id!(
    /// Identity of a live progression node.
    ProgressionId
);

/// Status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Neither condition has been satisfied yet.
    #[default]
    Pending,
    /// The obligation was satisfied first.
    Fulfilled,
    /// The violation was satisfied first (or together with the obligation).
    Breached,
}

impl ContractStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Fulfilled | ContractStatus::Breached)
    }

    /// Returns true if the contract is still awaiting resolution.
    pub fn is_pending(&self) -> bool {
        matches!(self, ContractStatus::Pending)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContractStatus::Pending => "pending",
            ContractStatus::Fulfilled => "fulfilled",
            ContractStatus::Breached => "breached",
        };
        f.write_str(s)
    }
}

/// The shape of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Wraps an external boolean source.
    Atomic,
    /// Satisfied iff every child is satisfied.
    All,
    /// Satisfied iff at least one child is satisfied.
    Any,
    /// Always satisfied.
    Always,
    /// Never satisfied.
    Never,
}

impl ConditionKind {
    /// Returns true for the aggregating kinds.
    pub fn is_composite(&self) -> bool {
        matches!(self, ConditionKind::All | ConditionKind::Any)
    }

    /// Returns true for the constant kinds.
    pub fn is_constant(&self) -> bool {
        matches!(self, ConditionKind::Always | ConditionKind::Never)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_status_terminal() {
        assert!(ContractStatus::Fulfilled.is_terminal());
        assert!(ContractStatus::Breached.is_terminal());
        assert!(!ContractStatus::Pending.is_terminal());
        assert!(ContractStatus::default().is_pending());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(HandlerId::new(), HandlerId::new());
        assert_ne!(ContractId::new(), ContractId::new());
    }

    #[test]
    fn test_condition_kind() {
        assert!(ConditionKind::All.is_composite());
        assert!(ConditionKind::Never.is_constant());
        assert!(!ConditionKind::Atomic.is_composite());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ContractStatus::Breached).unwrap();
        assert_eq!(json, "\"breached\"");
    }
}
