//! Tuned defaults for the decision layers and the trainer.
//!
//! Distances are world units (one maze cell is one unit wide), times are
//! simulated seconds.

// Grid
pub const CELL_RADIUS: f32 = 0.5;
pub const OCCUPANCY_EPSILON: f32 = 0.1; // probe shrink so touching walls stay walkable
pub const STEP_COST: u32 = 10;

// Strategic follower
pub const REPLAN_INTERVAL_S: f32 = 2.0;
pub const WAYPOINT_REACH_DISTANCE: f32 = 0.15;

// Reflex
pub const THREAT_DETECT_RANGE: f32 = 1.2;
pub const THREAT_SAFETY_MARGIN: f32 = 0.7; // only added while already fleeing
pub const REFLEX_RAY_DISTANCE: f32 = 0.7;

// Arbitration
pub const AGENT_MOVE_SPEED: f32 = 5.0;
pub const FINAL_APPROACH_DISTANCE: f32 = 0.8;
pub const EXIT_REACH_DISTANCE: f32 = 0.5;
pub const STUCK_THRESHOLD_S: f32 = 0.8;
pub const STUCK_EPSILON: f32 = 0.1;
pub const TACTICAL_LOCKOUT_S: f32 = 2.0;
pub const CONFLICT_REPLAN_S: f32 = 1.0;
pub const RESTART_DELAY_S: f32 = 3.0;

// Q-table
pub const ACTION_COUNT: usize = 4;
pub const OPTIMISTIC_INITIAL_VALUE: f32 = 2.0;
pub const TIE_TOLERANCE: f32 = 0.001;
pub const BEST_TABLE_FILE: &str = "qtable_best.json";
pub const SAVED_TABLE_FILE: &str = "qtable_save.json";

// Trainer schedule
pub const DECISION_PERIOD_S: f32 = 0.12;
pub const TRAINER_MOVE_SPEED: f32 = 10.0;
pub const TRAINER_RAY_DISTANCE: f32 = 1.5;
pub const MAX_EPISODES: u32 = 200;
pub const MAX_EPISODE_DURATION_S: f32 = 40.0;
pub const EVALUATE_INTERVAL: u32 = 20;
pub const EVALUATE_DURATION: u32 = 2;
pub const CHECKPOINT_INTERVAL: u32 = 10;

// Learning rule
pub const ALPHA: f32 = 0.2;
pub const GAMMA: f32 = 0.95;
pub const EPSILON_START: f32 = 1.0;
pub const EPSILON_MIN: f32 = 0.01;
pub const EPSILON_DECAY: f32 = 0.995;
pub const STREAK_FOR_EPSILON_CUT: u32 = 5;
pub const STREAK_EPSILON_FACTOR: f32 = 0.9;

// Rewards
pub const REWARD_EXIT: f32 = 2000.0;
pub const REWARD_SPEED_BONUS: f32 = 50.0;
pub const SPEED_BONUS_WINDOW_S: f32 = 20.0;
pub const REWARD_COIN_NEAR: f32 = 120.0;
pub const REWARD_COIN_FAR: f32 = 80.0;
pub const COIN_NEAR_DISTANCE: f32 = 4.0;
pub const PENALTY_ENEMY: f32 = -200.0;
pub const PENALTY_WALL: f32 = -2.0;
pub const PENALTY_STEP: f32 = -0.02;
pub const PENALTY_TIMEOUT: f32 = -300.0;
pub const PROGRESS_REWARD_SCALE: f32 = 1.0;

// Trainer stuck sampling
pub const STUCK_SAMPLE_INTERVAL_S: f32 = 2.0; // 120 frames at 60 Hz
pub const STUCK_GRACE_S: f32 = 2.0;
pub const STUCK_MIN_DISPLACEMENT: f32 = 0.5;
pub const STUCK_SAMPLE_LIMIT: u32 = 10;
