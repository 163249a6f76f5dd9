//! Serializable career definitions.
//!
//! A definition is an arena of steps addressed by string id. Each step
//! describes one contract (its obligation and violation conditions) and
//! the ids of the steps issued when that contract is fulfilled or breached.
//! Nothing here is live: the progression crate instantiates contracts and
//! progressions from a definition on demand.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CareerError, Result};

/// Description of a condition tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionDefinition {
    /// Always satisfied.
    Always,

    /// Never satisfied.
    Never,

    /// Satisfied while the state value under `key` is non-zero.
    Flag { key: String },

    /// Satisfied while the state value under `key` is at least `value`.
    AtLeast { key: String, value: i64 },

    /// Satisfied while the state value under `key` is at most `value`.
    AtMost { key: String, value: i64 },

    /// Satisfied iff every child is satisfied.
    All { of: Vec<ConditionDefinition> },

    /// Satisfied iff any child is satisfied.
    Any { of: Vec<ConditionDefinition> },
}

impl Default for ConditionDefinition {
    fn default() -> Self {
        ConditionDefinition::Never
    }
}

impl ConditionDefinition {
    /// A flag condition over `key`.
    pub fn flag(key: impl Into<String>) -> Self {
        ConditionDefinition::Flag { key: key.into() }
    }

    /// A lower-bound condition over `key`.
    pub fn at_least(key: impl Into<String>, value: i64) -> Self {
        ConditionDefinition::AtLeast {
            key: key.into(),
            value,
        }
    }

    /// An upper-bound condition over `key`.
    pub fn at_most(key: impl Into<String>, value: i64) -> Self {
        ConditionDefinition::AtMost {
            key: key.into(),
            value,
        }
    }

    /// Conjunction of `of`.
    pub fn all(of: Vec<ConditionDefinition>) -> Self {
        ConditionDefinition::All { of }
    }

    /// Disjunction of `of`.
    pub fn any(of: Vec<ConditionDefinition>) -> Self {
        ConditionDefinition::Any { of }
    }

    /// State keys referenced anywhere in this tree, in first-seen order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            ConditionDefinition::Always | ConditionDefinition::Never => {}
            ConditionDefinition::Flag { key }
            | ConditionDefinition::AtLeast { key, .. }
            | ConditionDefinition::AtMost { key, .. } => {
                if !keys.contains(&key.as_str()) {
                    keys.push(key);
                }
            }
            ConditionDefinition::All { of } | ConditionDefinition::Any { of } => {
                for child in of {
                    child.collect_keys(keys);
                }
            }
        }
    }
}

/// One step of a career: a contract and its follow-ups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepDefinition {
    /// Unique id of this step within its definition.
    pub id: String,

    /// Human readable objective shown when the contract is issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Condition that fulfills the contract.
    pub obligation: ConditionDefinition,

    /// Condition that breaches the contract.
    #[serde(default)]
    pub violation: ConditionDefinition,

    /// Steps issued when the contract is fulfilled.
    #[serde(default)]
    pub on_fulfilled: Vec<String>,

    /// Steps issued when the contract is breached.
    #[serde(default)]
    pub on_rejected: Vec<String>,
}

impl StepDefinition {
    /// Create a step that can only be fulfilled.
    pub fn new(id: impl Into<String>, obligation: ConditionDefinition) -> Self {
        Self {
            id: id.into(),
            title: None,
            obligation,
            violation: ConditionDefinition::Never,
            on_fulfilled: Vec::new(),
            on_rejected: Vec::new(),
        }
    }

    /// Set the display title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the violation condition.
    pub fn violation(mut self, violation: ConditionDefinition) -> Self {
        self.violation = violation;
        self
    }

    /// Add a follow-up issued on fulfillment.
    pub fn on_fulfilled(mut self, step: impl Into<String>) -> Self {
        self.on_fulfilled.push(step.into());
        self
    }

    /// Add a follow-up issued on breach.
    pub fn on_rejected(mut self, step: impl Into<String>) -> Self {
        self.on_rejected.push(step.into());
        self
    }

    /// Display name: the title if present, the id otherwise.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    fn successors(&self) -> impl Iterator<Item = &String> {
        self.on_fulfilled.iter().chain(self.on_rejected.iter())
    }
}

/// A complete career: its steps and the steps issued first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CareerDefinition {
    /// Name of the career.
    pub name: String,

    /// Ids of the steps issued when the career starts.
    pub roots: Vec<String>,

    /// All steps, in declaration order.
    pub steps: Vec<StepDefinition>,
}

impl CareerDefinition {
    /// Create an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roots: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Add a step.
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Add a root step id.
    pub fn root(mut self, id: impl Into<String>) -> Self {
        self.roots.push(id.into());
        self
    }

    /// Parse a definition from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: CareerDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Look up a step by id.
    pub fn get(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Index of steps by id.
    pub fn index(&self) -> HashMap<&str, &StepDefinition> {
        self.steps.iter().map(|s| (s.id.as_str(), s)).collect()
    }

    /// Every state key referenced by any step, in first-seen order.
    pub fn state_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for step in &self.steps {
            for key in step
                .obligation
                .keys()
                .into_iter()
                .chain(step.violation.keys())
            {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Validate the definition.
    ///
    /// Cycles are not an error here: a lazily built career can revisit a
    /// step. Use [`CareerDefinition::find_cycle`] when building eagerly.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(CareerError::EmptyDefinition {
                name: self.name.clone(),
                message: "no steps defined".to_string(),
            });
        }

        if self.roots.is_empty() {
            return Err(CareerError::EmptyDefinition {
                name: self.name.clone(),
                message: "no root steps".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(CareerError::DuplicateStep {
                    step: step.id.clone(),
                });
            }
        }

        for step in &self.steps {
            for next in step.successors() {
                if !seen.contains(next.as_str()) {
                    return Err(CareerError::UnknownStep {
                        step: next.clone(),
                        referenced_by: step.id.clone(),
                    });
                }
            }
        }

        for root in &self.roots {
            if !seen.contains(root.as_str()) {
                return Err(CareerError::UnknownRoot { step: root.clone() });
            }
        }

        Ok(())
    }

    /// Find a step reachable from the roots that lies on a cycle.
    pub fn find_cycle(&self) -> Option<&str> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            id: &'a str,
            index: &HashMap<&'a str, &'a StepDefinition>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Option<&'a str> {
            match marks.get(id) {
                Some(Mark::Visiting) => return Some(id),
                Some(Mark::Done) => return None,
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(&step) = index.get(id) {
                for next in step.successors() {
                    if let Some(found) = visit(next, index, marks) {
                        return Some(found);
                    }
                }
            }
            marks.insert(id, Mark::Done);
            None
        }

        let index = self.index();
        let mut marks = HashMap::new();
        self.roots
            .iter()
            .find_map(|root| visit(root, &index, &mut marks))
    }
}
