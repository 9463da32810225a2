use core::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub enum GridError {
    NonPositiveCellRadius { cell_radius: f32 },
    EmptyGrid { cols: i32, rows: i32 },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveCellRadius { cell_radius } => {
                write!(f, "cell radius must be positive, got {cell_radius}")
            }
            Self::EmptyGrid { cols, rows } => {
                write!(f, "grid would have no cells: {cols}x{rows}")
            }
        }
    }
}

impl std::error::Error for GridError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateKeyError {
    MissingSeparator(String),
    UnknownGoalBucket(String),
    BadWallFlags(String),
}

impl fmt::Display for StateKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator(raw) => write!(f, "state key without separator: {raw:?}"),
            Self::UnknownGoalBucket(raw) => write!(f, "unknown goal bucket in state key: {raw:?}"),
            Self::BadWallFlags(raw) => write!(f, "malformed wall flags in state key: {raw:?}"),
        }
    }
}

impl std::error::Error for StateKeyError {}

#[derive(Debug)]
pub enum QTableError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Encode(serde_json::Error),
    DuplicateState { state: String },
    InvalidStateKey { state: String, source: StateKeyError },
}

impl QTableError {
    /// True when the file simply does not exist (as opposed to being unreadable).
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

impl fmt::Display for QTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "q-table io at {}: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "q-table file {} is corrupt: {source}", path.display())
            }
            Self::Encode(source) => write!(f, "failed to encode q-table: {source}"),
            Self::DuplicateState { state } => {
                write!(f, "q-table file lists state {state:?} more than once")
            }
            Self::InvalidStateKey { source, .. } => write!(f, "q-table file: {source}"),
        }
    }
}

impl std::error::Error for QTableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } | Self::Encode(source) => Some(source),
            Self::InvalidStateKey { source, .. } => Some(source),
            Self::DuplicateState { .. } => None,
        }
    }
}
