//! Episode lifecycle of the hierarchical agent: activation, per-tick
//! actuation, terminal outcomes and the delayed world reset.

use crate::arbiter::{BrainConfig, Decision, DecisionLayer, HierarchicalBrain, LayerCounters, Observation};
use crate::constants::{AGENT_MOVE_SPEED, EXIT_REACH_DISTANCE, RESTART_DELAY_S};
use crate::error::GridError;
use crate::grid::{Grid, GridSpec};
use crate::policy::TacticalPolicy;
use crate::vec2::Vec2;
use crate::world::{Contact, Environment};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub move_speed: f32,
    pub exit_reach_distance: f32,
    pub restart_delay: f32,
    /// Opposite corners of the respawn rectangle.
    pub spawn_min: Vec2,
    pub spawn_max: Vec2,
    /// Re-snapshot threat positions every tick instead of only on reset.
    pub track_threats: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            move_speed: AGENT_MOVE_SPEED,
            exit_reach_distance: EXIT_REACH_DISTANCE,
            restart_delay: RESTART_DELAY_S,
            spawn_min: Vec2::new(-8.0, -4.0),
            spawn_max: Vec2::new(8.0, 4.0),
            track_threats: true,
        }
    }
}

impl AgentConfig {
    /// Respawn rotation: max, (max.x, min.y), (min.x, max.y), min.
    pub fn spawn_corners(&self) -> [Vec2; 4] {
        let (min, max) = (self.spawn_min, self.spawn_max);
        [max, Vec2::new(max.x, min.y), Vec2::new(min.x, max.y), min]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    Win,
    Loss,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AgentPhase {
    Playing,
    GameOver { outcome: EpisodeOutcome, remaining: f32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub layers: LayerCounters,
    pub coins: u32,
    pub survival_time: f32,
    pub wins: u32,
    pub losses: u32,
    pub episodes: u32,
}

/// Everything needed to bring an agent up inside an environment.
#[derive(Clone, Debug)]
pub struct AgentSetup {
    pub agent: AgentConfig,
    pub brain: BrainConfig,
    pub grid: GridSpec,
    pub policy: TacticalPolicy,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub struct MazeAgent {
    config: AgentConfig,
    brain: HierarchicalBrain,
    rng: ChaCha8Rng,
    phase: AgentPhase,
    goal: Option<Vec2>,
    spawn_index: usize,
    start_time: f32,
    last_decision: Option<Decision>,
    stats: AgentStats,
}

impl MazeAgent {
    /// Discovers the goal, builds the grid from the environment's occupancy
    /// and snapshots the threats.
    pub fn activate<E: Environment + ?Sized>(
        env: &mut E,
        setup: AgentSetup,
        now: f32,
    ) -> Result<Self, GridError> {
        let grid = Grid::build(&*env, setup.grid)?;
        info!(
            cols = grid.cols(),
            rows = grid.rows(),
            walkable = grid.walkable_count(),
            "agent grid built"
        );
        let brain = HierarchicalBrain::new(&setup.brain, grid, setup.policy);
        let mut agent = Self {
            config: setup.agent,
            brain,
            rng: ChaCha8Rng::seed_from_u64(setup.seed),
            phase: AgentPhase::Playing,
            goal: None,
            spawn_index: 0,
            start_time: now,
            last_decision: None,
            stats: AgentStats::default(),
        };
        agent.goal = env.goal();
        agent.brain.reflex_mut().refresh_threats(&*env);
        agent.brain.reset(env.position());
        Ok(agent)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn brain(&self) -> &HierarchicalBrain {
        &self.brain
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn is_game_over(&self) -> bool {
        matches!(self.phase, AgentPhase::GameOver { .. })
    }

    pub fn goal(&self) -> Option<Vec2> {
        self.goal
    }

    pub fn last_decision(&self) -> Option<Decision> {
        self.last_decision
    }

    pub fn current_layer(&self) -> DecisionLayer {
        self.brain.state().layer
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            layers: *self.brain.counters(),
            ..self.stats
        }
    }

    /// One control step. Returns the outcome when this tick ends the episode.
    pub fn tick<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        now: f32,
        dt: f32,
    ) -> Option<EpisodeOutcome> {
        if let AgentPhase::GameOver { outcome, remaining } = self.phase {
            env.zero_velocity();
            let remaining = remaining - dt;
            if remaining <= 0.0 {
                self.reset_world(env, now);
            } else {
                self.phase = AgentPhase::GameOver { outcome, remaining };
            }
            return None;
        }

        self.stats.survival_time = now - self.start_time;
        let position = env.position();
        self.brain.check_stuck(position, dt);

        if let Some(goal) = self.goal {
            if position.distance(goal) <= self.config.exit_reach_distance {
                return Some(self.end_episode(env, EpisodeOutcome::Win));
            }
        }

        if self.config.track_threats {
            self.brain.reflex_mut().refresh_threats(&*env);
        }
        let obs = Observation {
            now,
            dt,
            position,
            heading: env.velocity(),
            goal: self.goal,
        };
        let decision = self.brain.decide(&*env, &obs, &mut self.rng);
        self.last_decision = Some(decision);
        if decision.direction.is_zero() {
            env.zero_velocity();
        } else {
            env.set_velocity(decision.direction * self.config.move_speed);
        }
        None
    }

    pub fn handle_contact<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        contact: Contact,
    ) -> Option<EpisodeOutcome> {
        if self.is_game_over() {
            return None;
        }
        match contact {
            Contact::Threat => Some(self.end_episode(env, EpisodeOutcome::Loss)),
            Contact::Collectible { id, .. } => {
                self.stats.coins += 1;
                env.deactivate_collectible(id);
                None
            }
            Contact::Goal | Contact::Wall => None,
        }
    }

    fn end_episode<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        outcome: EpisodeOutcome,
    ) -> EpisodeOutcome {
        env.zero_velocity();
        match outcome {
            EpisodeOutcome::Win => self.stats.wins += 1,
            EpisodeOutcome::Loss => self.stats.losses += 1,
        }
        self.stats.episodes += 1;
        info!(
            outcome = ?outcome,
            survival = self.stats.survival_time,
            coins = self.stats.coins,
            "agent episode over"
        );
        self.phase = AgentPhase::GameOver {
            outcome,
            remaining: self.config.restart_delay,
        };
        outcome
    }

    fn reset_world<E: Environment + ?Sized>(&mut self, env: &mut E, now: f32) {
        env.reset_threats();
        env.reactivate_collectibles();
        self.brain.reflex_mut().refresh_threats(&*env);

        let corner = self.config.spawn_corners()[self.spawn_index];
        self.spawn_index = (self.spawn_index + 1) % 4;
        env.teleport(corner);
        env.zero_velocity();

        self.brain.reset(corner);
        self.phase = AgentPhase::Playing;
        self.start_time = now;
        self.last_decision = None;
        self.stats.coins = 0;
        self.stats.survival_time = 0.0;
    }
}
