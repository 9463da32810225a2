use crate::config::AutopilotConfig;
use crate::level::Level;
use crate::profiles::ProfileSpec;
use crate::sim::MazeWorld;
use crate::util::seed_to_hex;
use anyhow::{anyhow, Context, Result};
use maze_core::arbiter::LayerCounters;
use maze_core::policy::TacticalPolicy;
use maze_core::qtable::TableSource;
use maze_core::{AgentConfig, AgentSetup, EpisodeOutcome, MazeAgent};
use serde::Serialize;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunLimits {
    pub episodes: u32,
    /// Simulated seconds before the run is cut off.
    pub max_time: f32,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            episodes: 5,
            max_time: 300.0,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EpisodeResult {
    pub index: u32,
    pub outcome: EpisodeOutcome,
    pub survival_time: f32,
    pub coins: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunMetrics {
    pub profile: String,
    pub seed: u64,
    pub seed_hex: String,
    pub episodes: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub coins: u32,
    pub mean_survival_time: f64,
    pub sim_time: f32,
    /// The time cap expired before the episode budget was used up.
    pub timed_out: bool,
    pub table_states: usize,
    pub table_source: String,
    pub layers: LayerCounters,
}

#[derive(Clone, Debug)]
pub struct RunArtifact {
    pub metrics: RunMetrics,
    pub episodes: Vec<EpisodeResult>,
}

/// Plays `limits.episodes` episodes of the hierarchical agent on `level`.
pub fn run_agent(
    level: &Level,
    config: &AutopilotConfig,
    profile: &ProfileSpec,
    policy: TacticalPolicy,
    seed: u64,
    limits: RunLimits,
) -> Result<RunArtifact> {
    if limits.episodes == 0 {
        return Err(anyhow!("episodes must be > 0"));
    }
    if limits.max_time <= 0.0 {
        return Err(anyhow!("max_time must be > 0"));
    }
    let dt = config.sim.physics_dt;
    if dt <= 0.0 {
        return Err(anyhow!("physics_dt must be > 0"));
    }

    let table_states = policy.table().len();
    let table_source = source_label(policy.source());
    let (spawn_min, spawn_max) = level.spawn_bounds();
    let setup = AgentSetup {
        agent: AgentConfig {
            spawn_min,
            spawn_max,
            ..config.agent
        },
        brain: profile.apply(config.brain),
        grid: level.grid_spec(),
        policy,
        seed,
    };

    let mut world = MazeWorld::new(level.clone(), config.sim, seed);
    let mut agent = MazeAgent::activate(&mut world, setup, 0.0)
        .with_context(|| format!("failed activating agent for seed={}", seed_to_hex(seed)))?;

    let mut episodes = Vec::with_capacity(limits.episodes as usize);
    let mut now = 0.0f32;
    while episodes.len() < limits.episodes as usize && now < limits.max_time {
        let mut ended = agent.tick(&mut world, now, dt);
        let contacts = world.step(dt);
        if ended.is_none() {
            for contact in contacts {
                if let Some(outcome) = agent.handle_contact(&mut world, contact) {
                    ended = Some(outcome);
                    break;
                }
            }
        }
        if let Some(outcome) = ended {
            let stats = agent.stats();
            debug!(
                seed = %seed_to_hex(seed),
                episode = episodes.len() + 1,
                outcome = ?outcome,
                "run episode finished"
            );
            episodes.push(EpisodeResult {
                index: episodes.len() as u32 + 1,
                outcome,
                survival_time: stats.survival_time,
                coins: stats.coins,
            });
        }
        now += dt;
    }

    let stats = agent.stats();
    let completed = episodes.len() as u32;
    let mean_survival_time = if episodes.is_empty() {
        0.0
    } else {
        episodes.iter().map(|e| e.survival_time as f64).sum::<f64>() / episodes.len() as f64
    };

    Ok(RunArtifact {
        metrics: RunMetrics {
            profile: profile.id.to_string(),
            seed,
            seed_hex: seed_to_hex(seed),
            episodes: completed,
            wins: stats.wins,
            losses: stats.losses,
            win_rate: if completed == 0 {
                0.0
            } else {
                stats.wins as f64 / completed as f64
            },
            coins: episodes.iter().map(|e| e.coins).sum(),
            mean_survival_time,
            sim_time: now,
            timed_out: completed < limits.episodes,
            table_states,
            table_source,
            layers: stats.layers,
        },
        episodes,
    })
}

pub fn source_label(source: TableSource) -> String {
    match source {
        TableSource::Best => "best",
        TableSource::LastSaved => "last_saved",
        TableSource::Empty => "empty",
    }
    .to_string()
}
