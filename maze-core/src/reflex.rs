use crate::constants::{REFLEX_RAY_DISTANCE, THREAT_DETECT_RANGE, THREAT_SAFETY_MARGIN};
use crate::vec2::Vec2;
use crate::world::{RayProbe, Scene, SpatialQuery};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexConfig {
    pub detect_range: f32,
    /// Added to `detect_range` while already fleeing.
    pub safety_margin: f32,
    pub ray_distance: f32,
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            detect_range: THREAT_DETECT_RANGE,
            safety_margin: THREAT_SAFETY_MARGIN,
            ray_distance: REFLEX_RAY_DISTANCE,
        }
    }
}

/// Short-horizon escape layer. Threat positions are a snapshot taken by
/// [`Self::refresh_threats`]; they go stale until the next refresh.
#[derive(Clone, Debug)]
pub struct ReflexAvoidance {
    config: ReflexConfig,
    threats: Vec<Vec2>,
}

impl ReflexAvoidance {
    pub fn new(config: ReflexConfig) -> Self {
        Self {
            config,
            threats: Vec::new(),
        }
    }

    pub fn config(&self) -> &ReflexConfig {
        &self.config
    }

    pub fn threats(&self) -> &[Vec2] {
        &self.threats
    }

    pub fn refresh_threats<S: Scene + ?Sized>(&mut self, scene: &S) {
        self.threats = scene.threat_positions();
    }

    pub fn set_threats(&mut self, threats: Vec<Vec2>) {
        self.threats = threats;
    }

    pub fn threshold(&self, fleeing: bool) -> f32 {
        if fleeing {
            self.config.detect_range + self.config.safety_margin
        } else {
            self.config.detect_range
        }
    }

    /// Escape direction, a wall-reflex sidestep, or zero for "no opinion".
    pub fn escape_direction<Q, R>(
        &self,
        query: &Q,
        position: Vec2,
        heading: Vec2,
        fleeing: bool,
        rng: &mut R,
    ) -> Vec2
    where
        Q: SpatialQuery + ?Sized,
        R: Rng + ?Sized,
    {
        let probe = RayProbe::new(query, position, self.config.ray_distance);
        let threshold = self.threshold(fleeing);

        let mut flee = Vec2::ZERO;
        let mut in_range = 0usize;
        for threat in &self.threats {
            if position.distance(*threat) < threshold {
                in_range += 1;
                flee += (position - *threat).normalize_or_zero();
            }
        }

        if in_range == 0 {
            let heading = heading.normalize_or_zero();
            if !heading.is_zero() && probe.is_blocked(heading) {
                return probe.first_open_cardinal(heading);
            }
            return Vec2::ZERO;
        }

        if flee.is_zero() {
            flee = Vec2::from_angle(rng.gen_range(0.0..TAU));
        }
        let primary = flee.normalize_or_zero();
        if !probe.is_blocked(primary) {
            return primary;
        }
        for side in [primary.perp_ccw(), primary.perp_cw()] {
            if !probe.is_blocked(side) {
                return side;
            }
        }
        probe.first_open_cardinal(primary)
    }
}
