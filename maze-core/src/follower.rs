use crate::constants::{REPLAN_INTERVAL_S, WAYPOINT_REACH_DISTANCE};
use crate::grid::Grid;
use crate::search::Path;
use crate::vec2::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    pub replan_interval: f32,
    pub waypoint_reach_distance: f32,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            replan_interval: REPLAN_INTERVAL_S,
            waypoint_reach_distance: WAYPOINT_REACH_DISTANCE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowMode {
    Idle,
    Following,
}

/// Strategic layer: follows an A* path that is refreshed on a fixed cadence
/// rather than every tick, since only threats move in an otherwise static maze.
#[derive(Clone, Debug)]
pub struct StrategicFollower {
    config: FollowerConfig,
    path: Option<Path>,
    index: usize,
    last_replan: Option<f32>,
    mode: FollowMode,
}

impl StrategicFollower {
    pub fn new(config: FollowerConfig) -> Self {
        Self {
            config,
            path: None,
            index: 0,
            last_replan: None,
            mode: FollowMode::Idle,
        }
    }

    pub fn config(&self) -> &FollowerConfig {
        &self.config
    }

    pub fn mode(&self) -> FollowMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode == FollowMode::Following
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn path_index(&self) -> usize {
        self.index
    }

    /// The next call to [`Self::direction`] recomputes the path.
    pub fn force_replan(&mut self) {
        self.last_replan = None;
    }

    pub fn reset(&mut self) {
        self.path = None;
        self.index = 0;
        self.last_replan = None;
        self.mode = FollowMode::Idle;
    }

    /// Unit direction toward the current waypoint, or zero for "no opinion".
    pub fn direction(
        &mut self,
        grid: &mut Grid,
        now: f32,
        position: Vec2,
        goal: Option<Vec2>,
    ) -> Vec2 {
        let Some(goal) = goal else {
            return Vec2::ZERO;
        };

        let replan_due = self
            .last_replan
            .map_or(true, |last| now - last > self.config.replan_interval);
        let path_spent = self.path.as_ref().map_or(true, |path| self.index >= path.len());
        if replan_due || path_spent {
            self.path = grid.find_path(position, goal);
            self.index = 0;
            self.last_replan = Some(now);
            self.mode = match &self.path {
                Some(path) if !path.is_empty() => FollowMode::Following,
                _ => FollowMode::Idle,
            };
        }

        if self.mode == FollowMode::Idle {
            return Vec2::ZERO;
        }
        let Some(path) = self.path.as_ref() else {
            return Vec2::ZERO;
        };
        let Some(mut waypoint) = path.get(self.index).map(|w| w.position) else {
            self.mode = FollowMode::Idle;
            return Vec2::ZERO;
        };

        if position.distance(waypoint) < self.config.waypoint_reach_distance {
            self.index += 1;
            match path.get(self.index) {
                Some(next) => waypoint = next.position,
                None => {
                    self.mode = FollowMode::Idle;
                    return Vec2::ZERO;
                }
            }
        }

        (waypoint - position).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::MaskQuery;
    use crate::grid::GridCoord;

    fn bordered_grid() -> Grid {
        let query = MaskQuery::bordered(10, 10);
        Grid::build(&query, query.spec).expect("grid")
    }

    #[test]
    fn missing_goal_has_no_opinion() {
        let mut grid = bordered_grid();
        let mut follower = StrategicFollower::new(FollowerConfig::default());
        let start = grid.cell_to_world(GridCoord::new(1, 1));
        assert_eq!(follower.direction(&mut grid, 0.0, start, None), Vec2::ZERO);
        assert!(!follower.is_active());
    }

    #[test]
    fn unreachable_goal_stays_idle() {
        let mut query = MaskQuery::bordered(10, 10);
        for row in 0..10 {
            query.block(5, row);
        }
        let mut grid = Grid::build(&query, query.spec).expect("grid");
        let mut follower = StrategicFollower::new(FollowerConfig::default());
        let start = grid.cell_to_world(GridCoord::new(1, 1));
        let goal = grid.cell_to_world(GridCoord::new(8, 8));
        assert_eq!(follower.direction(&mut grid, 0.0, start, Some(goal)), Vec2::ZERO);
        assert!(follower.current_path().is_none());
        assert_eq!(follower.mode(), FollowMode::Idle);
    }

    #[test]
    fn first_step_heads_to_adjacent_cell() {
        let mut grid = bordered_grid();
        let mut follower = StrategicFollower::new(FollowerConfig::default());
        let start = grid.cell_to_world(GridCoord::new(1, 1));
        let goal = grid.cell_to_world(GridCoord::new(8, 8));
        let dir = follower.direction(&mut grid, 0.0, start, Some(goal));
        assert!(follower.is_active());
        assert!(dir == Vec2::UP || dir == Vec2::RIGHT, "unexpected first step {dir:?}");
    }

    #[test]
    fn replans_only_after_interval_or_on_demand() {
        let mut grid = bordered_grid();
        let mut follower = StrategicFollower::new(FollowerConfig::default());
        let start = grid.cell_to_world(GridCoord::new(1, 1));
        let goal = grid.cell_to_world(GridCoord::new(8, 8));
        follower.direction(&mut grid, 0.0, start, Some(goal));

        let moved_goal = grid.cell_to_world(GridCoord::new(1, 8));
        follower.direction(&mut grid, 1.0, start, Some(moved_goal));
        let stale_end = follower.current_path().and_then(Path::last).map(|w| w.coord);
        assert_eq!(stale_end, Some(GridCoord::new(8, 8)));

        follower.force_replan();
        follower.direction(&mut grid, 1.1, start, Some(moved_goal));
        let fresh_end = follower.current_path().and_then(Path::last).map(|w| w.coord);
        assert_eq!(fresh_end, Some(GridCoord::new(1, 8)));

        follower.direction(&mut grid, 3.2, start, Some(goal));
        let timed_end = follower.current_path().and_then(Path::last).map(|w| w.coord);
        assert_eq!(timed_end, Some(GridCoord::new(8, 8)));
    }
}
