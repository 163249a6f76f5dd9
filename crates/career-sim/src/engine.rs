//! Frame loop.

use anyhow::Result;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::state::{Report, Script, SimState};

/// Plays a script against a career, one frame per tick.
pub struct Engine {
    state: SimState,
    script: Script,
    config: SimConfig,
}

impl Engine {
    /// Create a new engine.
    pub fn new(state: SimState, script: Script, config: SimConfig) -> Self {
        Self {
            state,
            script,
            config,
        }
    }

    /// The simulation state.
    pub fn state(&self) -> &SimState {
        &self.state
    }

    /// Issue the roots and run frames until the script runs out, the career
    /// goes idle, or `max_ticks` is reached.
    pub async fn run(&self) -> Result<Report> {
        let roots = self.state.start()?;
        info!(roots, frames = self.script.len(), "🔧 Engine started");

        let mut ticker = interval(Duration::from_millis(self.config.tick_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut frame = 0u64;
        while frame < self.config.max_ticks {
            if self.config.stop_when_idle && self.is_idle(frame) {
                break;
            }
            ticker.tick().await;
            self.step(frame)?;
            frame += 1;
        }

        Ok(self.state.report(frame))
    }

    fn step(&self, frame: u64) -> Result<()> {
        self.state.set_frame(frame);
        let writes = usize::try_from(frame)
            .ok()
            .and_then(|i| self.script.frames.get(i));
        match writes {
            Some(writes) => self.state.apply(writes)?,
            None => self.state.career.refresh(),
        }
        debug!(frame, pending = self.state.career.len(), "frame complete");
        Ok(())
    }

    fn is_idle(&self, frame: u64) -> bool {
        self.state.career.is_idle() || frame >= self.script.len() as u64
    }
}
