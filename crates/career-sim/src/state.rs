//! Simulation state.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use career_core::CareerDefinition;
use career_progression::{Career, CareerBuilder, Issued};
use career_state::{Handler, WorldSnapshot, WorldState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SimConfig;

/// State writes applied in one frame. `set` runs before `add`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Absolute values.
    #[serde(default)]
    pub set: BTreeMap<String, i64>,

    /// Increments.
    #[serde(default)]
    pub add: BTreeMap<String, i64>,
}

/// A sequence of frames, one per tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    /// Frames in play order.
    #[serde(default)]
    pub frames: Vec<Frame>,
}

impl Script {
    /// Load a script file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid script {}", path.display()))
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

/// One issued contract, as recorded by the simulator.
#[derive(Debug, Clone, Serialize)]
pub struct IssueRecord {
    /// Frame during which the contract was issued.
    pub frame: u64,

    /// Display name of the contract.
    pub title: String,

    /// Wall-clock issue time.
    pub issued_at: DateTime<Utc>,
}

/// Summary printed at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Name of the career definition.
    pub career: String,

    /// Number of frames run.
    pub frames: u64,

    /// Contracts that settled during the run.
    pub settled: usize,

    /// Every contract issued, in order.
    pub issued: Vec<IssueRecord>,

    /// Display names of the contracts still pending.
    pub pending: Vec<String>,

    /// Step ids parked for the next refresh.
    pub parked: Vec<String>,

    /// Final world state.
    pub world: WorldSnapshot,
}

/// The world, the career, and the record of everything issued.
pub struct SimState {
    pub world: Rc<WorldState>,
    pub career: Career,
    pub builder: CareerBuilder,
    frame: Rc<Cell<u64>>,
    log: Rc<RefCell<Vec<IssueRecord>>>,
    // Kept alive for as long as the career may issue.
    _recorder: Handler<Issued>,
}

impl SimState {
    /// Create the state for a definition. The world only knows the keys the
    /// definition refers to, so scripts with misspelled keys fail loudly.
    pub fn new(definition: CareerDefinition, config: &SimConfig) -> Result<Self> {
        let world = Rc::new(WorldState::strict(definition.state_keys()));
        let name = definition.name.clone();
        let builder = CareerBuilder::with_config(definition, &world, config.builder.clone())
            .with_context(|| format!("failed to prepare career '{}'", name))?;

        let frame = Rc::new(Cell::new(0));
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = Handler::new({
            let frame = frame.clone();
            let log = log.clone();
            move |issued: &Issued| {
                log.borrow_mut().push(IssueRecord {
                    frame: frame.get(),
                    title: issued.contract.display_name(),
                    issued_at: issued.issued_at,
                });
            }
        });

        let career = Career::new();
        career.on_issued().subscribe(&recorder);

        Ok(Self {
            world,
            career,
            builder,
            frame,
            log,
            _recorder: recorder,
        })
    }

    /// Issue the root steps.
    pub fn start(&self) -> Result<usize> {
        let roots = self.builder.start(&self.career)?;
        Ok(roots)
    }

    /// Set the frame number stamped on issue records.
    pub fn set_frame(&self, frame: u64) {
        self.frame.set(frame);
    }

    /// Apply one frame of writes and re-assert every pending contract.
    pub fn apply(&self, frame: &Frame) -> Result<()> {
        self.world
            .apply(&frame.set)
            .with_context(|| format!("frame {}: bad write", self.frame.get()))?;
        for (key, delta) in &frame.add {
            self.world
                .add(key, *delta)
                .with_context(|| format!("frame {}: bad increment", self.frame.get()))?;
        }
        self.career.refresh();
        Ok(())
    }

    /// Everything issued so far.
    pub fn issued(&self) -> Vec<IssueRecord> {
        self.log.borrow().clone()
    }

    /// Build the end-of-run report.
    pub fn report(&self, frames: u64) -> Report {
        let report = Report {
            career: self.builder.definition().name.clone(),
            frames,
            settled: self.career.settled_total(),
            issued: self.issued(),
            pending: self
                .career
                .pending()
                .iter()
                .map(|c| c.display_name())
                .collect(),
            parked: self
                .career
                .parked()
                .iter()
                .filter_map(|p| p.step().map(str::to_string))
                .collect(),
            world: self.world.snapshot(),
        };
        info!(
            frames,
            issued = report.issued.len(),
            settled = report.settled,
            pending = report.pending.len(),
            "simulation finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use career_core::{ConditionDefinition, StepDefinition};

    fn forge() -> CareerDefinition {
        CareerDefinition::new("forge")
            .step(
                StepDefinition::new("smelt", ConditionDefinition::at_least("ingots", 2))
                    .title("Smelt two ingots")
                    .on_fulfilled("temper"),
            )
            .step(StepDefinition::new("temper", ConditionDefinition::flag("quenched")))
            .root("smelt")
    }

    #[test]
    fn test_records_issued_contracts() {
        let state = SimState::new(forge(), &SimConfig::default()).unwrap();
        assert_eq!(state.start().unwrap(), 1);

        state.set_frame(3);
        let mut frame = Frame::default();
        frame.add.insert("ingots".to_string(), 2);
        state.apply(&frame).unwrap();

        let issued = state.issued();
        assert_eq!(issued.len(), 2);
        assert_eq!(issued[0].title, "Smelt two ingots");
        assert_eq!(issued[0].frame, 0);
        assert_eq!(issued[1].title, "temper");
        assert_eq!(issued[1].frame, 3);
    }

    #[test]
    fn test_unknown_key_in_frame_fails() {
        let state = SimState::new(forge(), &SimConfig::default()).unwrap();
        state.start().unwrap();

        let mut frame = Frame::default();
        frame.set.insert("ingtos".to_string(), 1);
        assert!(state.apply(&frame).is_err());
    }

    #[test]
    fn test_report() {
        let state = SimState::new(forge(), &SimConfig::default()).unwrap();
        state.start().unwrap();

        let report = state.report(0);
        assert_eq!(report.career, "forge");
        assert_eq!(report.pending, vec!["Smelt two ingots".to_string()]);
        assert_eq!(report.world.get("quenched"), Some(0));
    }

    #[test]
    fn test_script_parses_partial_frames() {
        let script: Script =
            serde_json::from_str(r#"{"frames": [{"set": {"a": 1}}, {}, {"add": {"a": 2}}]}"#)
                .unwrap();
        assert_eq!(script.len(), 3);
        assert!(script.frames[1].set.is_empty());
        assert_eq!(script.frames[2].add.get("a"), Some(&2));
    }
}
