pub mod agent;
pub mod arbiter;
pub mod constants;
pub mod error;
pub mod follower;
pub mod grid;
pub mod policy;
pub mod qtable;
pub mod reflex;
pub mod schedule;
pub mod search;
pub mod state;
pub mod vec2;
pub mod world;

pub use agent::{AgentConfig, AgentSetup, AgentStats, EpisodeOutcome, MazeAgent};
pub use arbiter::{BrainConfig, Decision, DecisionLayer, HierarchicalBrain, Observation};
pub use error::{GridError, QTableError, StateKeyError};
pub use grid::{Grid, GridCoord, GridSpec};
pub use qtable::{QTable, QTablePaths, TieBreak};
pub use schedule::DecisionClock;
pub use state::{Action, GoalBucket, StateKey};
pub use vec2::Vec2;
pub use world::{AgentBody, Contact, Environment, LayerMask, Scene, SpatialQuery};
