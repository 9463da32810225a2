use crate::constants::REFLEX_RAY_DISTANCE;
use crate::qtable::{load_with_fallback, QTable, QTablePaths, TableSource, TieBreak};
use crate::state::StateKey;
use crate::vec2::Vec2;
use crate::world::{RayProbe, SpatialQuery};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub ray_distance: f32,
    pub tie_break: TieBreak,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            ray_distance: REFLEX_RAY_DISTANCE,
            tie_break: TieBreak::FirstIndex,
        }
    }
}

/// Read-only tactical layer over a trained table.
#[derive(Clone, Debug)]
pub struct TacticalPolicy {
    config: PolicyConfig,
    table: QTable,
    source: TableSource,
}

impl TacticalPolicy {
    pub fn new(config: PolicyConfig, table: QTable) -> Self {
        Self {
            config,
            table,
            source: TableSource::Empty,
        }
    }

    pub fn load(config: PolicyConfig, paths: &QTablePaths) -> Self {
        let (table, source) = load_with_fallback(paths);
        info!(source = ?source, states = table.len(), "tactical table loaded");
        Self {
            config,
            table,
            source,
        }
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn source(&self) -> TableSource {
        self.source
    }

    pub fn observe<Q: SpatialQuery + ?Sized>(
        &self,
        query: &Q,
        position: Vec2,
        goal: Option<Vec2>,
    ) -> StateKey {
        let probe = RayProbe::new(query, position, self.config.ray_distance);
        StateKey::observe(&probe, goal)
    }

    /// Greedy action for the observed state, or zero when the state is
    /// unknown or the chosen move would run into a wall.
    pub fn direction<Q, R>(&self, query: &Q, position: Vec2, goal: Option<Vec2>, rng: &mut R) -> Vec2
    where
        Q: SpatialQuery + ?Sized,
        R: Rng + ?Sized,
    {
        if self.table.is_empty() {
            return Vec2::ZERO;
        }
        let key = self.observe(query, position, goal);
        let Some(action) = self
            .table
            .best_action(&key.to_string(), self.config.tie_break, rng)
        else {
            return Vec2::ZERO;
        };
        if key.is_blocked(action) {
            return Vec2::ZERO;
        }
        action.vector()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::MaskQuery;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn policy(entries: &[(&str, [f32; 4])]) -> TacticalPolicy {
        let mut table = QTable::new();
        for (state, values) in entries {
            table.insert(*state, *values);
        }
        TacticalPolicy::new(PolicyConfig::default(), table)
    }

    #[test]
    fn empty_table_has_no_opinion() {
        let query = MaskQuery::open(5, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let policy = policy(&[]);
        assert_eq!(policy.direction(&query, Vec2::ZERO, None, &mut rng), Vec2::ZERO);
    }

    #[test]
    fn unknown_state_has_no_opinion() {
        let query = MaskQuery::open(5, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let policy = policy(&[("L_____", [0.0, 0.0, 9.0, 0.0])]);
        let goal = Some(Vec2::new(2.0, 0.0));
        assert_eq!(policy.direction(&query, Vec2::ZERO, goal, &mut rng), Vec2::ZERO);
    }

    #[test]
    fn follows_the_best_known_action() {
        let query = MaskQuery::open(5, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let policy = policy(&[("R_____", [0.0, 1.0, 0.5, 3.0])]);
        let goal = Some(Vec2::new(2.0, 0.0));
        assert_eq!(policy.direction(&query, Vec2::ZERO, goal, &mut rng), Vec2::RIGHT);
    }

    #[test]
    fn never_recommends_a_blocked_move() {
        let query = MaskQuery::bordered(5, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        // Cell (1, 2): wall on the left.
        let policy = policy(&[("R___L_", [0.0, 0.0, 5.0, 1.0])]);
        let position = Vec2::new(-1.0, 0.0);
        let goal = Some(Vec2::new(1.0, 0.0));
        assert_eq!(policy.direction(&query, position, goal, &mut rng), Vec2::ZERO);
    }
}
