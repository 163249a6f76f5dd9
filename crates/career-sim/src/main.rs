//! # Career Simulator
//!
//! Plays a scripted sequence of world-state changes against a career
//! definition and prints what was issued.
//!
//! ```text
//! career-sim <definition.json> [script.json] [config.json]
//! ```

use anyhow::{bail, Context, Result};
use career_core::CareerDefinition;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod engine;
mod state;

use config::SimConfig;
use engine::Engine;
use state::{Script, SimState};

const USAGE: &str = "usage: career-sim <definition.json> [script.json] [config.json]";

fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{}'", level))?,
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_definition(path: &str) -> Result<CareerDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read definition {}", path))?;
    let definition = CareerDefinition::from_json(&raw)
        .with_context(|| format!("invalid definition {}", path))?;
    Ok(definition)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(definition_path) = args.first() else {
        bail!(USAGE);
    };
    if args.len() > 3 {
        bail!(USAGE);
    }

    let config = match args.get(2) {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    init_tracing(&config.log_level)?;

    let definition = load_definition(definition_path)?;
    let script = match args.get(1) {
        Some(path) => Script::load(path)?,
        None => Script::default(),
    };
    info!(
        career = %definition.name,
        steps = definition.steps.len(),
        frames = script.len(),
        "🚀 Career simulator starting"
    );

    let state = SimState::new(definition, &config)?;
    let engine = Engine::new(state, script, config);
    let report = engine.run().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
