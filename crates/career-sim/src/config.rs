//! Simulator configuration.

use std::path::Path;

use anyhow::{Context, Result};
use career_core::CareerError;
use career_progression::BuilderConfig;
use serde::{Deserialize, Serialize};

/// Configuration for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Delay between frames in milliseconds.
    pub tick_ms: u64,

    /// Hard limit on the number of frames.
    pub max_ticks: u64,

    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,

    /// Stop once the career is empty or the script has run out.
    pub stop_when_idle: bool,

    /// How the career is built from its definition.
    pub builder: BuilderConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            max_ticks: 1_000,
            log_level: "info".to_string(),
            stop_when_idle: true,
            builder: BuilderConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load a configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate a configuration.
    pub fn from_json(json: &str) -> career_core::Result<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> career_core::Result<()> {
        if self.tick_ms == 0 {
            return Err(CareerError::ConfigError(
                "tick_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_ticks == 0 {
            return Err(CareerError::ConfigError(
                "max_ticks must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
