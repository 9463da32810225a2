//! Tabular action values keyed by [`StateKey`](crate::state::StateKey) text,
//! plus the JSON snapshot format shared by the trainer and the policy.

use crate::constants::{ACTION_COUNT, BEST_TABLE_FILE, OPTIMISTIC_INITIAL_VALUE, SAVED_TABLE_FILE};
use crate::error::{QTableError, StateKeyError};
use crate::state::{Action, StateKey};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub type ActionValues = [f32; ACTION_COUNT];

/// How `best_action` resolves equal maxima.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Lowest action index wins; deterministic play.
    FirstIndex,
    /// Uniform choice among actions within `tolerance` of the maximum.
    RandomWithin { tolerance: f32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct QTable {
    values: BTreeMap<String, ActionValues>,
    initial_value: f32,
}

impl Default for QTable {
    fn default() -> Self {
        Self::new()
    }
}

impl QTable {
    pub fn new() -> Self {
        Self::with_initial_value(OPTIMISTIC_INITIAL_VALUE)
    }

    pub fn with_initial_value(initial_value: f32) -> Self {
        Self {
            values: BTreeMap::new(),
            initial_value,
        }
    }

    pub fn initial_value(&self) -> f32 {
        self.initial_value
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, state: &str) -> bool {
        self.values.contains_key(state)
    }

    pub fn get(&self, state: &str) -> Option<&ActionValues> {
        self.values.get(state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActionValues)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Row for `state`, created with the initial value on first visit.
    pub fn ensure(&mut self, state: &str) -> &mut ActionValues {
        let initial = self.initial_value;
        self.values
            .entry(state.to_string())
            .or_insert([initial; ACTION_COUNT])
    }

    pub fn insert(&mut self, state: impl Into<String>, values: ActionValues) {
        self.values.insert(state.into(), values);
    }

    pub fn max_value(&self, state: &str) -> Option<f32> {
        self.values
            .get(state)
            .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
    }

    /// One Q-learning step: `Q(s,a) += alpha * (r + gamma * max Q(s',.) - Q(s,a))`.
    /// Both rows are created if missing. Returns the new `Q(s,a)`.
    pub fn update(
        &mut self,
        state: &str,
        action: Action,
        reward: f32,
        next_state: &str,
        alpha: f32,
        gamma: f32,
    ) -> f32 {
        self.ensure(next_state);
        let next_max = self.max_value(next_state).unwrap_or(self.initial_value);
        let slot = &mut self.ensure(state)[action.index()];
        *slot += alpha * (reward + gamma * next_max - *slot);
        *slot
    }

    /// Greedy action for `state`; `None` when the state has never been seen.
    pub fn best_action<R: Rng + ?Sized>(
        &self,
        state: &str,
        tie_break: TieBreak,
        rng: &mut R,
    ) -> Option<Action> {
        let row = self.values.get(state)?;
        let index = match tie_break {
            TieBreak::FirstIndex => {
                let mut best = 0;
                for i in 1..ACTION_COUNT {
                    if row[i] > row[best] {
                        best = i;
                    }
                }
                best
            }
            TieBreak::RandomWithin { tolerance } => {
                let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let ties: Vec<usize> = (0..ACTION_COUNT)
                    .filter(|&i| (row[i] - max).abs() < tolerance)
                    .collect();
                match ties.len() {
                    0 => 0,
                    n => ties[rng.gen_range(0..n)],
                }
            }
        };
        Action::from_index(index)
    }

    pub fn to_data(&self) -> QTableData {
        QTableData {
            entries: self
                .values
                .iter()
                .map(|(state, values)| QTableEntry {
                    state: state.clone(),
                    values: *values,
                })
                .collect(),
        }
    }

    /// Rebuilds a table from a snapshot. Keys must parse as state keys and
    /// appear once; a snapshot that breaks either rule is rejected whole.
    pub fn from_data(data: QTableData) -> Result<Self, QTableError> {
        let mut table = Self::new();
        for entry in data.entries {
            if let Err(source) = entry.state.parse::<StateKey>() {
                return Err(invalid_key(entry.state, source));
            }
            match table.values.entry(entry.state) {
                Entry::Occupied(slot) => {
                    return Err(QTableError::DuplicateState {
                        state: slot.key().clone(),
                    })
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry.values);
                }
            }
        }
        Ok(table)
    }

    pub fn to_json(&self) -> Result<String, QTableError> {
        serde_json::to_string_pretty(&self.to_data()).map_err(QTableError::Encode)
    }

    pub fn from_json(json: &str, origin: &Path) -> Result<Self, QTableError> {
        let data: QTableData = serde_json::from_str(json).map_err(|source| QTableError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Self::from_data(data)
    }

    pub fn save(&self, path: &Path) -> Result<(), QTableError> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        fs::write(path, json).map_err(|source| io_error(path, source))
    }

    pub fn load(path: &Path) -> Result<Self, QTableError> {
        let json = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        Self::from_json(&json, path)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> QTableError {
    QTableError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn invalid_key(state: String, source: StateKeyError) -> QTableError {
    QTableError::InvalidStateKey { state, source }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QTableData {
    pub entries: Vec<QTableEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QTableEntry {
    pub state: String,
    pub values: ActionValues,
}

/// Where the trainer writes snapshots and the policy looks for them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QTablePaths {
    pub best: PathBuf,
    pub last_saved: PathBuf,
}

impl QTablePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            best: dir.join(BEST_TABLE_FILE),
            last_saved: dir.join(SAVED_TABLE_FILE),
        }
    }
}

impl Default for QTablePaths {
    fn default() -> Self {
        Self::in_dir(Path::new("."))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableSource {
    Best,
    LastSaved,
    Empty,
}

/// Best snapshot, else the last checkpoint, else an empty table. Missing
/// files fall through quietly; unreadable ones are logged first.
pub fn load_with_fallback(paths: &QTablePaths) -> (QTable, TableSource) {
    for (path, source) in [
        (&paths.best, TableSource::Best),
        (&paths.last_saved, TableSource::LastSaved),
    ] {
        match QTable::load(path) {
            Ok(table) => return (table, source),
            Err(err) if err.is_missing() => {}
            Err(err) => warn!(path = %path.display(), error = %err, "skipping q-table snapshot"),
        }
    }
    (QTable::new(), TableSource::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn update_converges_to_reward_without_discount() {
        let mut table = QTable::new();
        let mut last = 0.0;
        for _ in 0..200 {
            last = table.update("R_____", Action::Up, 5.0, "R_____", 0.2, 0.0);
        }
        assert!((last - 5.0).abs() < 1e-4, "q = {last}");
    }

    #[test]
    fn update_bootstraps_from_next_state() {
        let mut table = QTable::new();
        let q = table.update("U_____", Action::Left, 1.0, "D_____", 0.5, 0.9);
        // 2 + 0.5 * (1 + 0.9 * 2 - 2)
        assert!((q - 2.4).abs() < 1e-6);
        assert_eq!(table.get("D_____"), Some(&[2.0; 4]));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn first_index_breaks_ties_low() {
        let mut table = QTable::new();
        table.insert("L_____", [1.0, 3.0, 3.0, 0.0]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(
                table.best_action("L_____", TieBreak::FirstIndex, &mut rng),
                Some(Action::Down)
            );
        }
        assert_eq!(table.best_action("U_____", TieBreak::FirstIndex, &mut rng), None);
    }

    #[test]
    fn random_tie_break_visits_every_near_max() {
        let mut table = QTable::new();
        table.insert("L_____", [3.0, 2.0, 3.0005, 2.9]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let tie = TieBreak::RandomWithin { tolerance: 0.001 };
        let seen: HashSet<_> = (0..200)
            .filter_map(|_| table.best_action("L_____", tie, &mut rng))
            .collect();
        assert_eq!(seen, HashSet::from([Action::Up, Action::Left]));
    }

    #[test]
    fn rejects_duplicate_and_malformed_states() {
        let dup = r#"{"entries":[{"state":"R_____","values":[1,2,3,4]},{"state":"R_____","values":[0,0,0,0]}]}"#;
        assert!(matches!(
            QTable::from_json(dup, Path::new("dup.json")),
            Err(QTableError::DuplicateState { .. })
        ));
        let bad = r#"{"entries":[{"state":"sideways","values":[1,2,3,4]}]}"#;
        assert!(matches!(
            QTable::from_json(bad, Path::new("bad.json")),
            Err(QTableError::InvalidStateKey { .. })
        ));
        let short = r#"{"entries":[{"state":"R_____","values":[1,2,3]}]}"#;
        assert!(matches!(
            QTable::from_json(short, Path::new("short.json")),
            Err(QTableError::Parse { .. })
        ));
    }

    #[test]
    fn fallback_prefers_best_then_saved_then_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = QTablePaths::in_dir(dir.path());

        let (table, source) = load_with_fallback(&paths);
        assert!(table.is_empty());
        assert_eq!(source, TableSource::Empty);

        let mut saved = QTable::new();
        saved.insert("U_____", [1.0, 0.0, 0.0, 0.0]);
        saved.save(&paths.last_saved).expect("save");
        fs::write(&paths.best, "{ not json").expect("write");
        let (table, source) = load_with_fallback(&paths);
        assert_eq!(source, TableSource::LastSaved);
        assert_eq!(table, saved);

        let mut best = QTable::new();
        best.insert("D_____", [0.0, 1.0, 0.0, 0.0]);
        best.save(&paths.best).expect("save");
        let (table, source) = load_with_fallback(&paths);
        assert_eq!(source, TableSource::Best);
        assert_eq!(table, best);
    }
}
