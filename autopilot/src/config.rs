use crate::sim::SimConfig;
use crate::trainer::TrainerConfig;
use anyhow::{Context, Result};
use maze_core::{AgentConfig, BrainConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Every tunable of the harness, the agent and the trainer. Missing fields
/// keep their defaults, so a config file only needs the overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub sim: SimConfig,
    pub agent: AgentConfig,
    pub brain: BrainConfig,
    pub trainer: TrainerConfig,
}

impl AutopilotConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed parsing config {}", path.display()))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
