//! Fixed-priority arbitration between the decision layers.
//!
//! Order per tick: magnet, reflex, tactical (unless locked out), strategic,
//! otherwise halt. Stuck detection runs first and may lock the tactical
//! layer out for a while so the strategic path gets a chance.

use crate::constants::{
    CONFLICT_REPLAN_S, FINAL_APPROACH_DISTANCE, STUCK_EPSILON, STUCK_THRESHOLD_S, TACTICAL_LOCKOUT_S,
};
use crate::follower::{FollowerConfig, StrategicFollower};
use crate::grid::Grid;
use crate::policy::{PolicyConfig, TacticalPolicy};
use crate::reflex::{ReflexAvoidance, ReflexConfig};
use crate::vec2::Vec2;
use crate::world::SpatialQuery;
use core::fmt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub use_reflex: bool,
    pub use_tactical: bool,
    pub use_strategic: bool,
    pub final_approach_distance: f32,
    pub conflict_duration: f32,
    pub stuck_threshold: f32,
    pub stuck_epsilon: f32,
    pub lockout_duration: f32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            use_reflex: true,
            use_tactical: true,
            use_strategic: true,
            final_approach_distance: FINAL_APPROACH_DISTANCE,
            conflict_duration: CONFLICT_REPLAN_S,
            stuck_threshold: STUCK_THRESHOLD_S,
            stuck_epsilon: STUCK_EPSILON,
            lockout_duration: TACTICAL_LOCKOUT_S,
        }
    }
}

/// Every tunable of the hierarchical brain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    pub arbiter: ArbiterConfig,
    pub follower: FollowerConfig,
    pub reflex: ReflexConfig,
    pub policy: PolicyConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecisionLayer {
    Starting,
    Magnet,
    Reflex,
    Tactical,
    Strategic,
    Halted,
}

impl DecisionLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Magnet => "magnet",
            Self::Reflex => "reflex",
            Self::Tactical => "tactical",
            Self::Strategic => "strategic",
            Self::Halted => "halted",
        }
    }
}

impl fmt::Display for DecisionLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecisionState {
    pub layer: DecisionLayer,
    pub fleeing: bool,
    pub conflict_timer: f32,
    pub stuck_timer: f32,
    pub lockout_timer: f32,
    pub last_position: Vec2,
}

impl DecisionState {
    pub fn new(position: Vec2) -> Self {
        Self {
            layer: DecisionLayer::Starting,
            fleeing: false,
            conflict_timer: 0.0,
            stuck_timer: 0.0,
            lockout_timer: 0.0,
            last_position: position,
        }
    }

    pub fn tactical_locked(&self) -> bool {
        self.lockout_timer > 0.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerCounters {
    pub magnet: u64,
    pub reflex: u64,
    pub tactical: u64,
    pub strategic: u64,
    pub halted: u64,
    pub lockouts: u64,
    pub conflict_replans: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    pub direction: Vec2,
    pub layer: DecisionLayer,
}

/// Per-tick view of the agent handed to the arbiter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub now: f32,
    pub dt: f32,
    pub position: Vec2,
    pub heading: Vec2,
    pub goal: Option<Vec2>,
}

#[derive(Clone, Debug)]
pub struct HierarchicalBrain {
    config: ArbiterConfig,
    grid: Grid,
    follower: StrategicFollower,
    reflex: ReflexAvoidance,
    policy: TacticalPolicy,
    state: DecisionState,
    counters: LayerCounters,
}

impl HierarchicalBrain {
    pub fn new(config: &BrainConfig, grid: Grid, policy: TacticalPolicy) -> Self {
        Self {
            config: config.arbiter,
            grid,
            follower: StrategicFollower::new(config.follower),
            reflex: ReflexAvoidance::new(config.reflex),
            policy,
            state: DecisionState::new(Vec2::ZERO),
            counters: LayerCounters::default(),
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn follower(&self) -> &StrategicFollower {
        &self.follower
    }

    pub fn reflex(&self) -> &ReflexAvoidance {
        &self.reflex
    }

    pub fn reflex_mut(&mut self) -> &mut ReflexAvoidance {
        &mut self.reflex
    }

    pub fn policy(&self) -> &TacticalPolicy {
        &self.policy
    }

    pub fn state(&self) -> &DecisionState {
        &self.state
    }

    pub fn counters(&self) -> &LayerCounters {
        &self.counters
    }

    /// Clears decision state for a new episode. Counters survive.
    pub fn reset(&mut self, position: Vec2) {
        self.state = DecisionState::new(position);
        self.follower.reset();
    }

    pub fn tick<Q, R>(&mut self, query: &Q, obs: &Observation, rng: &mut R) -> Decision
    where
        Q: SpatialQuery + ?Sized,
        R: Rng + ?Sized,
    {
        self.check_stuck(obs.position, obs.dt);
        self.decide(query, obs, rng)
    }

    pub fn check_stuck(&mut self, position: Vec2, dt: f32) {
        let state = &mut self.state;
        // A halt while tactical is locked out is the strategic fallback idling.
        let exempt = match state.layer {
            DecisionLayer::Magnet | DecisionLayer::Strategic => true,
            DecisionLayer::Halted => state.tactical_locked(),
            _ => false,
        };
        if state.lockout_timer > 0.0 {
            state.lockout_timer = (state.lockout_timer - dt).max(0.0);
        }

        if position.distance(state.last_position) < self.config.stuck_epsilon {
            state.stuck_timer += dt;
            if state.stuck_timer > self.config.stuck_threshold && !exempt {
                debug!(layer = %state.layer, "agent stuck, locking out tactical layer");
                state.lockout_timer = self.config.lockout_duration;
                state.stuck_timer = 0.0;
                self.counters.lockouts += 1;
            }
        } else {
            state.stuck_timer = 0.0;
            state.last_position = position;
        }
    }

    pub fn decide<Q, R>(&mut self, query: &Q, obs: &Observation, rng: &mut R) -> Decision
    where
        Q: SpatialQuery + ?Sized,
        R: Rng + ?Sized,
    {
        let decision = self.arbitrate(query, obs, rng);
        self.state.layer = decision.layer;
        trace!(layer = %decision.layer, x = decision.direction.x, y = decision.direction.y, "decision");
        decision
    }

    fn arbitrate<Q, R>(&mut self, query: &Q, obs: &Observation, rng: &mut R) -> Decision
    where
        Q: SpatialQuery + ?Sized,
        R: Rng + ?Sized,
    {
        if let Some(goal) = obs.goal {
            if obs.position.distance(goal) < self.config.final_approach_distance && !self.state.fleeing {
                self.counters.magnet += 1;
                self.state.conflict_timer = 0.0;
                return Decision {
                    direction: (goal - obs.position).normalize_or_zero(),
                    layer: DecisionLayer::Magnet,
                };
            }
        }

        if self.config.use_reflex {
            let escape = self.reflex.escape_direction(
                query,
                obs.position,
                obs.heading,
                self.state.fleeing,
                rng,
            );
            if !escape.is_zero() {
                self.state.fleeing = true;
                self.counters.reflex += 1;
                if self.config.use_strategic && self.follower.is_active() {
                    self.state.conflict_timer += obs.dt;
                    if self.state.conflict_timer > self.config.conflict_duration {
                        debug!("reflex keeps overriding the path, forcing a replan");
                        self.follower.force_replan();
                        self.state.conflict_timer = 0.0;
                        self.counters.conflict_replans += 1;
                    }
                }
                return Decision {
                    direction: escape,
                    layer: DecisionLayer::Reflex,
                };
            }
        }
        self.state.fleeing = false;
        self.state.conflict_timer = 0.0;

        if self.config.use_tactical && !self.state.tactical_locked() {
            let direction = self.policy.direction(query, obs.position, obs.goal, rng);
            if !direction.is_zero() {
                self.counters.tactical += 1;
                return Decision {
                    direction,
                    layer: DecisionLayer::Tactical,
                };
            }
        }

        if self.config.use_strategic {
            let direction = self
                .follower
                .direction(&mut self.grid, obs.now, obs.position, obs.goal);
            if !direction.is_zero() {
                self.counters.strategic += 1;
                return Decision {
                    direction,
                    layer: DecisionLayer::Strategic,
                };
            }
        }

        self.counters.halted += 1;
        Decision {
            direction: Vec2::ZERO,
            layer: DecisionLayer::Halted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::MaskQuery;
    use crate::grid::GridCoord;
    use crate::qtable::QTable;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn brain(query: &MaskQuery, entries: &[(&str, [f32; 4])]) -> HierarchicalBrain {
        let grid = Grid::build(query, query.spec).expect("grid");
        let mut table = QTable::new();
        for (state, values) in entries {
            table.insert(*state, *values);
        }
        let config = BrainConfig::default();
        let policy = TacticalPolicy::new(config.policy, table);
        HierarchicalBrain::new(&config, grid, policy)
    }

    fn obs(now: f32, dt: f32, position: Vec2, goal: Option<Vec2>) -> Observation {
        Observation {
            now,
            dt,
            position,
            heading: Vec2::ZERO,
            goal,
        }
    }

    #[test]
    fn magnet_beats_reflex_near_the_goal() {
        let query = MaskQuery::open(9, 9);
        let mut brain = brain(&query, &[]);
        brain.reflex_mut().set_threats(vec![Vec2::new(0.5, 0.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let goal = Some(Vec2::new(0.0, 0.5));
        let decision = brain.tick(&query, &obs(0.0, 0.1, Vec2::ZERO, goal), &mut rng);
        assert_eq!(decision.layer, DecisionLayer::Magnet);
        assert_eq!(decision.direction, Vec2::UP);
    }

    #[test]
    fn fleeing_disables_the_magnet() {
        let query = MaskQuery::open(9, 9);
        let mut brain = brain(&query, &[]);
        brain.reflex_mut().set_threats(vec![Vec2::new(1.0, 0.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let far_goal = Some(Vec2::new(0.0, 3.0));
        let first = brain.tick(&query, &obs(0.0, 0.1, Vec2::ZERO, far_goal), &mut rng);
        assert_eq!(first.layer, DecisionLayer::Reflex);
        assert!(brain.state().fleeing);

        let near_goal = Some(Vec2::new(0.0, 0.5));
        let second = brain.tick(&query, &obs(0.1, 0.1, Vec2::ZERO, near_goal), &mut rng);
        assert_eq!(second.layer, DecisionLayer::Reflex);
        assert_eq!(second.direction, Vec2::LEFT);
    }

    #[test]
    fn stuck_tactical_gets_locked_out_then_recovers() {
        let query = MaskQuery::open(9, 9);
        let mut brain = brain(&query, &[("R_____", [0.0, 0.0, 0.0, 1.0])]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let goal = Some(Vec2::new(3.0, 0.0));
        let held = Vec2::ZERO;
        brain.reset(held);

        let dt = 0.25;
        let mut now = 0.0;
        for _ in 0..3 {
            let decision = brain.tick(&query, &obs(now, dt, held, goal), &mut rng);
            assert_eq!(decision.layer, DecisionLayer::Tactical);
            now += dt;
        }
        let locked = brain.tick(&query, &obs(now, dt, held, goal), &mut rng);
        now += dt;
        assert!(brain.state().tactical_locked());
        assert_ne!(locked.layer, DecisionLayer::Tactical);
        assert_eq!(brain.counters().lockouts, 1);

        // Keep moving so no new stuck signal fires while the lockout drains.
        let mut position = held;
        for step in 0..8 {
            position = if step % 2 == 0 { Vec2::new(0.0, 0.2) } else { held };
            let decision = brain.tick(&query, &obs(now, dt, position, goal), &mut rng);
            now += dt;
            if step < 7 {
                assert_ne!(decision.layer, DecisionLayer::Tactical, "step {step}");
            } else {
                assert_eq!(decision.layer, DecisionLayer::Tactical);
            }
        }
        assert!(!brain.state().tactical_locked());
        assert_eq!(position, held);
    }

    #[test]
    fn halting_under_lockout_does_not_rearm_it() {
        let query = MaskQuery::open(9, 9);
        let grid = Grid::build(&query, query.spec).expect("grid");
        let mut config = BrainConfig::default();
        config.arbiter.use_reflex = false;
        config.arbiter.use_strategic = false;
        let mut table = QTable::new();
        table.insert("R_____", [0.0, 0.0, 0.0, 1.0]);
        let policy = TacticalPolicy::new(config.policy, table);
        let mut brain = HierarchicalBrain::new(&config, grid, policy);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let goal = Some(Vec2::new(3.0, 0.0));
        let held = Vec2::ZERO;
        brain.reset(held);

        let dt = 0.25;
        let mut now = 0.0;
        for _ in 0..4 {
            brain.tick(&query, &obs(now, dt, held, goal), &mut rng);
            now += dt;
        }
        assert_eq!(brain.counters().lockouts, 1);
        assert_eq!(brain.state().layer, DecisionLayer::Halted);

        // Standing still for the whole lockout only drains it.
        for step in 0..8 {
            let decision = brain.tick(&query, &obs(now, dt, held, goal), &mut rng);
            now += dt;
            if step < 7 {
                assert_eq!(decision.layer, DecisionLayer::Halted, "step {step}");
            } else {
                assert_eq!(decision.layer, DecisionLayer::Tactical);
            }
        }
        assert_eq!(brain.counters().lockouts, 1);
    }

    #[test]
    fn strategic_layer_is_exempt_from_lockout() {
        let query = MaskQuery::bordered(10, 10);
        let mut brain = brain(&query, &[]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let start = brain.grid().cell_to_world(GridCoord::new(1, 1));
        let goal = Some(brain.grid().cell_to_world(GridCoord::new(8, 8)));
        brain.reset(start);
        for i in 0..10 {
            let decision = brain.tick(&query, &obs(i as f32 * 0.25, 0.25, start, goal), &mut rng);
            assert_eq!(decision.layer, DecisionLayer::Strategic);
        }
        assert!(!brain.state().tactical_locked());
    }

    #[test]
    fn long_conflict_forces_a_replan() {
        let query = MaskQuery::bordered(10, 10);
        let mut brain = brain(&query, &[]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let start = brain.grid().cell_to_world(GridCoord::new(4, 4));
        let goal = Some(brain.grid().cell_to_world(GridCoord::new(8, 8)));
        brain.reset(start);
        let first = brain.tick(&query, &obs(0.0, 0.25, start, goal), &mut rng);
        assert_eq!(first.layer, DecisionLayer::Strategic);
        assert!(brain.follower().is_active());

        brain.reflex_mut().set_threats(vec![start + Vec2::new(0.5, 0.0)]);
        for i in 1..=4 {
            brain.tick(&query, &obs(i as f32 * 0.25, 0.25, start, goal), &mut rng);
        }
        assert_eq!(brain.state().conflict_timer, 1.0);
        brain.tick(&query, &obs(1.25, 0.25, start, goal), &mut rng);
        assert_eq!(brain.state().conflict_timer, 0.0);
        assert_eq!(brain.counters().conflict_replans, 1);
    }

    #[test]
    fn disabled_layers_fall_through_to_halt() {
        let query = MaskQuery::open(9, 9);
        let grid = Grid::build(&query, query.spec).expect("grid");
        let mut config = BrainConfig::default();
        config.arbiter.use_reflex = false;
        config.arbiter.use_strategic = false;
        let policy = TacticalPolicy::new(config.policy, QTable::new());
        let mut brain = HierarchicalBrain::new(&config, grid, policy);
        brain.reflex_mut().set_threats(vec![Vec2::new(0.5, 0.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let decision = brain.tick(&query, &obs(0.0, 0.1, Vec2::ZERO, Some(Vec2::new(3.0, 0.0))), &mut rng);
        assert_eq!(decision.layer, DecisionLayer::Halted);
        assert_eq!(decision.direction, Vec2::ZERO);
    }
}
