//! Interfaces to the collaborators that own physics, actuation and the scene.
//!
//! The decision core never looks objects up by name; whoever owns the world
//! hands it a value implementing these traits.

use crate::vec2::Vec2;

/// Bit set of collision layers a query applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const OBSTACLE: Self = Self(1 << 0);
    pub const THREAT: Self = Self(1 << 1);
    pub const ALL: Self = Self(u32::MAX);

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

/// Pure, synchronous spatial queries against the current world state.
pub trait SpatialQuery {
    fn is_occupied(&self, point: Vec2, radius: f32, layers: LayerMask) -> bool;
    fn raycast_blocked(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
        layers: LayerMask,
    ) -> bool;
}

/// The physics body the agent drives.
pub trait AgentBody {
    fn position(&self) -> Vec2;
    fn velocity(&self) -> Vec2;
    fn set_velocity(&mut self, velocity: Vec2);
    fn teleport(&mut self, position: Vec2);

    fn zero_velocity(&mut self) {
        self.set_velocity(Vec2::ZERO);
    }
}

/// Registry of the scene objects the agent reasons about.
pub trait Scene {
    fn goal(&self) -> Option<Vec2>;
    fn threat_positions(&self) -> Vec<Vec2>;
    /// Returns every threat to its spawn point.
    fn reset_threats(&mut self);
    fn reactivate_collectibles(&mut self);
    fn deactivate_collectible(&mut self, id: usize);
}

/// Everything an agent needs from its surroundings.
pub trait Environment: SpatialQuery + AgentBody + Scene {}

impl<T: SpatialQuery + AgentBody + Scene> Environment for T {}

/// Collision or trigger event reported by the physics step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Contact {
    Threat,
    Collectible { id: usize, position: Vec2 },
    Goal,
    Wall,
}

/// Short obstacle ray cast from a fixed origin, used as the
/// "is this direction blocked" probe by the reflex and tactical layers.
pub struct RayProbe<'a, Q: SpatialQuery + ?Sized> {
    query: &'a Q,
    origin: Vec2,
    distance: f32,
}

impl<'a, Q: SpatialQuery + ?Sized> RayProbe<'a, Q> {
    pub fn new(query: &'a Q, origin: Vec2, distance: f32) -> Self {
        Self {
            query,
            origin,
            distance,
        }
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn is_blocked(&self, direction: Vec2) -> bool {
        self.query
            .raycast_blocked(self.origin, direction, self.distance, LayerMask::OBSTACLE)
    }

    /// First unblocked cardinal in Up, Down, Left, Right order, skipping `exclude`.
    pub fn first_open_cardinal(&self, exclude: Vec2) -> Vec2 {
        Vec2::CARDINALS
            .into_iter()
            .filter(|dir| *dir != exclude)
            .find(|dir| !self.is_blocked(*dir))
            .unwrap_or(Vec2::ZERO)
    }
}
