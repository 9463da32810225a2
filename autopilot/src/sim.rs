//! Kinematic maze world used to run the agent and the trainer headless.
//!
//! Bodies are circles moving through the level's wall cells with
//! axis-separated collision. Threats wander on their own; contacts are
//! reported by [`MazeWorld::step`].

use crate::level::Level;
use maze_core::{AgentBody, Contact, LayerMask, Scene, SpatialQuery, Vec2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Longest distance a body moves between two collision checks.
const MAX_SUBSTEP: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub physics_dt: f32,
    pub agent_radius: f32,
    pub threat_radius: f32,
    pub threat_speed: f32,
    /// Threats pick a fresh heading this often.
    pub threat_turn_interval: f32,
    pub threat_look_ahead: f32,
    pub threat_stuck_interval: f32,
    pub threat_stuck_distance: f32,
    pub collectible_radius: f32,
    pub goal_radius: f32,
    /// Sample spacing for ray casts.
    pub ray_step: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            physics_dt: 1.0 / 60.0,
            agent_radius: 0.3,
            threat_radius: 0.3,
            threat_speed: 2.0,
            threat_turn_interval: 2.0,
            threat_look_ahead: 0.6,
            threat_stuck_interval: 0.5,
            threat_stuck_distance: 0.1,
            collectible_radius: 0.25,
            goal_radius: 0.3,
            ray_step: 0.05,
        }
    }
}

#[derive(Clone, Debug)]
struct Threat {
    spawn: Vec2,
    position: Vec2,
    direction: Vec2,
    turn_timer: f32,
    stuck_timer: f32,
    stuck_anchor: Vec2,
    touching: bool,
}

#[derive(Clone, Copy, Debug)]
struct Collectible {
    position: Vec2,
    active: bool,
}

#[derive(Clone, Debug)]
pub struct MazeWorld {
    level: Level,
    config: SimConfig,
    rng: ChaCha8Rng,
    position: Vec2,
    velocity: Vec2,
    threats: Vec<Threat>,
    collectibles: Vec<Collectible>,
    touching_goal: bool,
    touching_wall: bool,
}

impl MazeWorld {
    pub fn new(level: Level, config: SimConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let threats = level
            .threats()
            .iter()
            .map(|&spawn| Threat {
                spawn,
                position: spawn,
                direction: random_heading(&mut rng),
                turn_timer: 0.0,
                stuck_timer: 0.0,
                stuck_anchor: spawn,
                touching: false,
            })
            .collect();
        let collectibles = level
            .collectibles()
            .iter()
            .map(|&position| Collectible {
                position,
                active: true,
            })
            .collect();
        let position = level.start();
        Self {
            level,
            config,
            rng,
            position,
            velocity: Vec2::ZERO,
            threats,
            collectibles,
            touching_goal: false,
            touching_wall: false,
        }
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn active_collectibles(&self) -> usize {
        self.collectibles.iter().filter(|c| c.active).count()
    }

    /// Advances every body by `dt` and returns the contacts that began (or,
    /// for collectibles, persist) during the step.
    pub fn step(&mut self, dt: f32) -> Vec<Contact> {
        let mut contacts = Vec::new();
        if dt <= 0.0 {
            return contacts;
        }

        let (position, blocked) =
            self.slide(self.position, self.velocity * dt, self.config.agent_radius);
        self.position = position;
        if blocked.0 {
            self.velocity.x = 0.0;
        }
        if blocked.1 {
            self.velocity.y = 0.0;
        }
        let hit_wall = blocked.0 || blocked.1;
        if hit_wall && !self.touching_wall {
            contacts.push(Contact::Wall);
        }
        self.touching_wall = hit_wall;

        for idx in 0..self.threats.len() {
            self.step_threat(idx, dt);
        }

        let agent = self.position;
        let reach = self.config.agent_radius + self.config.threat_radius;
        for threat in &mut self.threats {
            let touching = threat.position.distance(agent) < reach;
            if touching && !threat.touching {
                contacts.push(Contact::Threat);
            }
            threat.touching = touching;
        }

        let reach = self.config.agent_radius + self.config.collectible_radius;
        for (id, item) in self.collectibles.iter().enumerate() {
            if item.active && item.position.distance(agent) < reach {
                contacts.push(Contact::Collectible {
                    id,
                    position: item.position,
                });
            }
        }

        let touching_goal = self
            .level
            .exit()
            .is_some_and(|exit| exit.distance(agent) < self.config.agent_radius + self.config.goal_radius);
        if touching_goal && !self.touching_goal {
            contacts.push(Contact::Goal);
        }
        self.touching_goal = touching_goal;

        contacts
    }

    fn step_threat(&mut self, idx: usize, dt: f32) {
        let config = self.config;
        let mut threat = self.threats[idx].clone();

        threat.turn_timer += dt;
        if threat.turn_timer >= config.threat_turn_interval {
            threat.turn_timer = 0.0;
            threat.direction = random_heading(&mut self.rng);
        }
        if self.level_ray_blocked(threat.position, threat.direction, config.threat_look_ahead) {
            threat.direction = random_heading(&mut self.rng);
        }

        let (position, _) = self.slide(
            threat.position,
            threat.direction * (config.threat_speed * dt),
            config.threat_radius,
        );
        threat.position = position;

        threat.stuck_timer += dt;
        if threat.stuck_timer >= config.threat_stuck_interval {
            if threat.position.distance(threat.stuck_anchor) < config.threat_stuck_distance {
                threat.direction = random_heading(&mut self.rng);
            }
            threat.stuck_anchor = threat.position;
            threat.stuck_timer = 0.0;
        }

        self.threats[idx] = threat;
    }

    /// Moves a circle by `delta`, one axis at a time, stopping each axis at the
    /// first wall. Returns the new centre and which axes were blocked.
    fn slide(&self, from: Vec2, delta: Vec2, radius: f32) -> (Vec2, (bool, bool)) {
        let steps = (delta.length() / MAX_SUBSTEP).ceil().max(1.0) as u32;
        let part = delta * (1.0 / steps as f32);
        let mut position = from;
        let mut blocked = (false, false);
        for _ in 0..steps {
            if !blocked.0 && part.x != 0.0 {
                let next = Vec2::new(position.x + part.x, position.y);
                if self.level.circle_hits_wall(next, radius) {
                    blocked.0 = true;
                } else {
                    position = next;
                }
            }
            if !blocked.1 && part.y != 0.0 {
                let next = Vec2::new(position.x, position.y + part.y);
                if self.level.circle_hits_wall(next, radius) {
                    blocked.1 = true;
                } else {
                    position = next;
                }
            }
        }
        (position, blocked)
    }

    fn level_ray_blocked(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> bool {
        self.ray_hits(origin, direction, max_distance, |point| self.level.is_wall_at(point))
    }

    fn ray_hits<F: Fn(Vec2) -> bool>(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
        hit: F,
    ) -> bool {
        let dir = direction.normalize_or_zero();
        if dir.is_zero() || max_distance <= 0.0 {
            return false;
        }
        let step = self.config.ray_step.max(1e-3);
        let mut t = step.min(max_distance);
        loop {
            if hit(origin + dir * t) {
                return true;
            }
            if t >= max_distance {
                return false;
            }
            t = (t + step).min(max_distance);
        }
    }
}

/// Uniform point in the unit square, normalised; falls back to +x.
fn random_heading<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    let dir = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)).normalize_or_zero();
    if dir.is_zero() {
        Vec2::RIGHT
    } else {
        dir
    }
}

impl SpatialQuery for MazeWorld {
    fn is_occupied(&self, point: Vec2, radius: f32, layers: LayerMask) -> bool {
        if layers.intersects(LayerMask::OBSTACLE) && self.level.circle_hits_wall(point, radius) {
            return true;
        }
        layers.intersects(LayerMask::THREAT)
            && self
                .threats
                .iter()
                .any(|t| t.position.distance(point) < radius + self.config.threat_radius)
    }

    fn raycast_blocked(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
        layers: LayerMask,
    ) -> bool {
        let walls = layers.intersects(LayerMask::OBSTACLE);
        let threats = layers.intersects(LayerMask::THREAT);
        self.ray_hits(origin, direction, max_distance, |point| {
            (walls && self.level.is_wall_at(point))
                || (threats
                    && self
                        .threats
                        .iter()
                        .any(|t| t.position.distance(point) < self.config.threat_radius))
        })
    }
}

impl AgentBody for MazeWorld {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn velocity(&self) -> Vec2 {
        self.velocity
    }

    fn set_velocity(&mut self, velocity: Vec2) {
        self.velocity = velocity;
    }

    /// Targets inside a wall snap to the nearest floor cell centre.
    fn teleport(&mut self, position: Vec2) {
        self.position = if self.level.circle_hits_wall(position, self.config.agent_radius) {
            self.level.nearest_floor(position).unwrap_or(position)
        } else {
            position
        };
        self.touching_goal = false;
        self.touching_wall = false;
        for threat in &mut self.threats {
            threat.touching = false;
        }
    }
}

impl Scene for MazeWorld {
    fn goal(&self) -> Option<Vec2> {
        self.level.exit()
    }

    fn threat_positions(&self) -> Vec<Vec2> {
        self.threats.iter().map(|t| t.position).collect()
    }

    fn reset_threats(&mut self) {
        for idx in 0..self.threats.len() {
            let direction = random_heading(&mut self.rng);
            let threat = &mut self.threats[idx];
            threat.position = threat.spawn;
            threat.direction = direction;
            threat.turn_timer = 0.0;
            threat.stuck_timer = 0.0;
            threat.stuck_anchor = threat.spawn;
            threat.touching = false;
        }
    }

    fn reactivate_collectibles(&mut self) {
        for item in &mut self.collectibles {
            item.active = true;
        }
    }

    fn deactivate_collectible(&mut self, id: usize) {
        if let Some(item) = self.collectibles.get_mut(id) {
            item.active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor() -> MazeWorld {
        let level = Level::parse("#######\n#S.$.E#\n#######").expect("level");
        MazeWorld::new(level, SimConfig::default(), 7)
    }

    #[test]
    fn walls_stop_motion_and_report_once() {
        let mut world = corridor();
        world.set_velocity(Vec2::new(0.0, 5.0));
        let first = world.step(0.1);
        assert_eq!(first, vec![Contact::Wall]);
        assert_eq!(world.velocity(), Vec2::ZERO);
        world.set_velocity(Vec2::new(0.0, 5.0));
        assert!(world.step(0.1).is_empty(), "still pressed against the same wall");
        assert!((world.position().y - world.level().start().y).abs() < 0.25);
    }

    #[test]
    fn collectible_and_goal_contacts_fire_along_the_corridor() {
        let mut world = corridor();
        let mut seen = Vec::new();
        for _ in 0..120 {
            world.set_velocity(Vec2::new(5.0, 0.0));
            for contact in world.step(1.0 / 60.0) {
                if let Contact::Collectible { id, .. } = contact {
                    world.deactivate_collectible(id);
                }
                seen.push(contact);
            }
        }
        assert!(seen.iter().any(|c| matches!(c, Contact::Collectible { id: 0, .. })));
        assert_eq!(seen.iter().filter(|c| **c == Contact::Goal).count(), 1);
        assert_eq!(world.active_collectibles(), 0);
        world.reactivate_collectibles();
        assert_eq!(world.active_collectibles(), 1);
    }

    #[test]
    fn rays_see_walls_within_range_only() {
        let world = corridor();
        let start = world.level().start();
        assert!(world.raycast_blocked(start, Vec2::UP, 0.7, LayerMask::OBSTACLE));
        assert!(!world.raycast_blocked(start, Vec2::RIGHT, 0.7, LayerMask::OBSTACLE));
        assert!(world.raycast_blocked(start, Vec2::RIGHT, 5.0, LayerMask::OBSTACLE));
        assert!(!world.raycast_blocked(start, Vec2::UP, 0.7, LayerMask::THREAT));
        assert!(!world.raycast_blocked(start, Vec2::ZERO, 0.7, LayerMask::ALL));
    }

    #[test]
    fn occupancy_matches_level_cells() {
        let world = corridor();
        let start = world.level().start();
        assert!(!world.is_occupied(start, 0.4, LayerMask::OBSTACLE));
        assert!(world.is_occupied(start + Vec2::UP, 0.4, LayerMask::OBSTACLE));
    }

    #[test]
    fn threats_stay_inside_and_reset_to_spawn() {
        let level = Level::builtin();
        let spawns = level.threats().to_vec();
        let mut world = MazeWorld::new(level, SimConfig::default(), 3);
        for _ in 0..600 {
            world.step(1.0 / 60.0);
        }
        for pos in world.threat_positions() {
            assert!(!world.level().circle_hits_wall(pos, 0.29), "threat in wall at {pos:?}");
        }
        world.reset_threats();
        assert_eq!(world.threat_positions(), spawns);
    }

    #[test]
    fn teleport_into_wall_snaps_to_floor() {
        let mut world = corridor();
        world.teleport(Vec2::new(-2.0, 1.0));
        assert_eq!(world.position(), world.level().start());
    }
}
