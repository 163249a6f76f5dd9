//! Error types for the career progression crates.
//!
//! The reactive core (conditions, contracts, progressions) has no fallible
//! operations. These errors belong to the outer surfaces: loading and
//! validating definitions, resolving state keys, and configuration.

use thiserror::Error;

/// Main error type for career operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CareerError {
    /// The definition has no steps or no roots.
    #[error("Career definition '{name}' is empty: {message}")]
    EmptyDefinition { name: String, message: String },

    /// Two steps share the same id.
    #[error("Duplicate step id: {step}")]
    DuplicateStep { step: String },

    /// A step names a follow-up step that does not exist.
    #[error("Step '{referenced_by}' references unknown step '{step}'")]
    UnknownStep { step: String, referenced_by: String },

    /// A root names a step that does not exist.
    #[error("Root references unknown step '{step}'")]
    UnknownRoot { step: String },

    /// Eager construction reached a step that is its own ancestor.
    #[error("Step '{step}' is part of a cycle and cannot be built eagerly")]
    CyclicDefinition { step: String },

    /// Eager construction went deeper than the configured limit.
    #[error("Eager build exceeded the maximum depth of {limit}")]
    DepthExceeded { limit: usize },

    /// A condition refers to a state key the source does not know.
    #[error("Unknown state key: {key}")]
    UnknownKey { key: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CareerError {
    /// Returns true if this error describes a malformed definition.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            CareerError::EmptyDefinition { .. }
                | CareerError::DuplicateStep { .. }
                | CareerError::UnknownStep { .. }
                | CareerError::UnknownRoot { .. }
                | CareerError::CyclicDefinition { .. }
        )
    }

    /// Returns the step id the error is about, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            CareerError::DuplicateStep { step } => Some(step),
            CareerError::UnknownStep { step, .. } => Some(step),
            CareerError::UnknownRoot { step } => Some(step),
            CareerError::CyclicDefinition { step } => Some(step),
            _ => None,
        }
    }
}

/// Convenience Result type for career operations.
pub type Result<T> = std::result::Result<T, CareerError>;

impl From<serde_json::Error> for CareerError {
    fn from(err: serde_json::Error) -> Self {
        CareerError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CareerError::UnknownStep {
            step: "forge".to_string(),
            referenced_by: "apprentice".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Step 'apprentice' references unknown step 'forge'"
        );
    }

    #[test]
    fn test_definition_errors() {
        assert!(CareerError::DuplicateStep { step: "a".into() }.is_definition_error());
        assert!(!CareerError::UnknownKey { key: "gold".into() }.is_definition_error());
        assert_eq!(
            CareerError::UnknownRoot { step: "root".into() }.step(),
            Some("root")
        );
    }

    #[test]
    fn test_from_serde_error() {
        let err: CareerError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, CareerError::SerializationError(_)));
    }
}
