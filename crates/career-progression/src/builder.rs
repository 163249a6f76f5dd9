//! Building live progressions from a [`CareerDefinition`].

use std::collections::HashMap;
use std::rc::Rc;

use career_contract::{Condition, Contract};
use career_core::{CareerDefinition, CareerError, ConditionDefinition, Result, StepDefinition};
use career_state::{Observable, WorldState};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::career::Career;
use crate::progression::Progression;

/// How follow-up steps are instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Build a step's children when its contract settles, and only the
    /// taken branch. Cyclic definitions are allowed.
    #[default]
    Lazy,

    /// Build the whole reachable tree up front. Cyclic definitions are
    /// rejected.
    Eager,
}

/// Configuration for the builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// How follow-up steps are instantiated.
    pub build_mode: BuildMode,

    /// Maximum tree depth in eager mode.
    pub max_eager_depth: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            build_mode: BuildMode::Lazy,
            max_eager_depth: 64,
        }
    }
}

/// Source of the observable counters that definitions refer to by key.
pub trait StateSource {
    /// Get the cell for a key.
    fn cell(&self, key: &str) -> Result<Observable<i64>>;
}

impl StateSource for WorldState {
    fn cell(&self, key: &str) -> Result<Observable<i64>> {
        WorldState::cell(self, key)
    }
}

impl<S: StateSource + ?Sized> StateSource for Rc<S> {
    fn cell(&self, key: &str) -> Result<Observable<i64>> {
        (**self).cell(key)
    }
}

struct BuilderInner {
    definition: CareerDefinition,
    cells: HashMap<String, Observable<i64>>,
    config: BuilderConfig,
}

/// Instantiates contracts and progressions from a definition.
///
/// Every state key is resolved when the builder is created, so building
/// later never fails on a missing key. Clones share the same definition.
#[derive(Clone)]
pub struct CareerBuilder {
    inner: Rc<BuilderInner>,
}

impl CareerBuilder {
    /// Create a builder with the default (lazy) configuration.
    pub fn new(definition: CareerDefinition, source: &dyn StateSource) -> Result<Self> {
        Self::with_config(definition, source, BuilderConfig::default())
    }

    /// Create a builder with a custom configuration.
    pub fn with_config(
        definition: CareerDefinition,
        source: &dyn StateSource,
        config: BuilderConfig,
    ) -> Result<Self> {
        definition.validate()?;
        if config.build_mode == BuildMode::Eager {
            if let Some(step) = definition.find_cycle() {
                return Err(CareerError::CyclicDefinition {
                    step: step.to_string(),
                });
            }
        }

        let mut cells = HashMap::new();
        for key in definition.state_keys() {
            cells.insert(key.to_string(), source.cell(key)?);
        }

        debug!(
            career = %definition.name,
            steps = definition.steps.len(),
            keys = cells.len(),
            mode = ?config.build_mode,
            "career builder ready"
        );

        Ok(Self {
            inner: Rc::new(BuilderInner {
                definition,
                cells,
                config,
            }),
        })
    }

    /// The definition being built.
    pub fn definition(&self) -> &CareerDefinition {
        &self.inner.definition
    }

    /// The builder configuration.
    pub fn config(&self) -> &BuilderConfig {
        &self.inner.config
    }

    /// Build a condition tree.
    pub fn condition(&self, definition: &ConditionDefinition) -> Result<Condition> {
        Ok(match definition {
            ConditionDefinition::Always => Condition::always(),
            ConditionDefinition::Never => Condition::never(),
            ConditionDefinition::Flag { key } => Condition::observe(self.cell(key)?, |v| *v != 0),
            ConditionDefinition::AtLeast { key, value } => {
                let bound = *value;
                Condition::observe(self.cell(key)?, move |v| *v >= bound)
            }
            ConditionDefinition::AtMost { key, value } => {
                let bound = *value;
                Condition::observe(self.cell(key)?, move |v| *v <= bound)
            }
            ConditionDefinition::All { of } => Condition::all(self.conditions(of)?),
            ConditionDefinition::Any { of } => Condition::any(self.conditions(of)?),
        })
    }

    /// Build a fresh contract for a step.
    pub fn contract(&self, step: &str) -> Result<Contract> {
        let step = self.step(step)?;
        self.contract_for(step)
    }

    /// Build a progression rooted at a step.
    pub fn progression(&self, step: &str) -> Result<Progression> {
        match self.inner.config.build_mode {
            BuildMode::Lazy => self.lazy(step),
            BuildMode::Eager => self.eager(step, 0),
        }
    }

    /// Build a progression for every root, in declaration order.
    pub fn roots(&self) -> Result<Vec<Progression>> {
        self.inner
            .definition
            .roots
            .iter()
            .map(|root| self.progression(root))
            .collect()
    }

    /// Build every root and issue it into `career`. Nothing is issued if
    /// any root fails to build. Returns the number of roots issued.
    pub fn start(&self, career: &Career) -> Result<usize> {
        let roots = self.roots()?;
        let count = roots.len();
        info!(career = %self.inner.definition.name, roots = count, "starting career");
        for root in roots {
            career.issue(root);
        }
        Ok(count)
    }

    fn cell(&self, key: &str) -> Result<&Observable<i64>> {
        self.inner
            .cells
            .get(key)
            .ok_or_else(|| CareerError::UnknownKey {
                key: key.to_string(),
            })
    }

    fn conditions(&self, of: &[ConditionDefinition]) -> Result<Vec<Condition>> {
        of.iter().map(|c| self.condition(c)).collect()
    }

    fn step(&self, id: &str) -> Result<&StepDefinition> {
        self.inner
            .definition
            .get(id)
            .ok_or_else(|| CareerError::UnknownStep {
                step: id.to_string(),
                referenced_by: self.inner.definition.name.clone(),
            })
    }

    fn contract_for(&self, step: &StepDefinition) -> Result<Contract> {
        Ok(Contract::titled(
            step.display_name(),
            self.condition(&step.obligation)?,
            self.condition(&step.violation)?,
        ))
    }

    fn lazy(&self, id: &str) -> Result<Progression> {
        let step = self.step(id)?;
        let contract = self.contract_for(step)?;
        Ok(Progression::lazy(
            contract,
            self.deferred(step.on_fulfilled.clone()),
            self.deferred(step.on_rejected.clone()),
        )
        .with_step(id))
    }

    fn deferred(&self, ids: Vec<String>) -> impl FnOnce() -> Vec<Progression> + 'static {
        let builder = self.clone();
        move || {
            ids.iter()
                .filter_map(|id| match builder.lazy(id) {
                    Ok(progression) => Some(progression),
                    Err(err) => {
                        error!(step = %id, error = %err, "failed to build follow-up step");
                        None
                    }
                })
                .collect()
        }
    }

    fn eager(&self, id: &str, depth: usize) -> Result<Progression> {
        let limit = self.inner.config.max_eager_depth;
        if depth >= limit {
            return Err(CareerError::DepthExceeded { limit });
        }
        let step = self.step(id)?;
        let contract = self.contract_for(step)?;
        let children = |ids: &[String]| -> Result<Vec<Progression>> {
            ids.iter().map(|next| self.eager(next, depth + 1)).collect()
        };
        Ok(Progression::new(
            contract,
            children(&step.on_fulfilled)?,
            children(&step.on_rejected)?,
        )
        .with_step(id))
    }
}

impl std::fmt::Debug for CareerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CareerBuilder")
            .field("career", &self.inner.definition.name)
            .field("config", &self.inner.config)
            .finish()
    }
}
