//! Offline Q-learning trainer.
//!
//! The trainer drives its own body through a [`MazeWorld`] on a fixed decision
//! period, learns a [`QTable`] over the tactical state keys and writes the
//! table snapshots consumed by the tactical layer.

use crate::level::Level;
use crate::sim::{MazeWorld, SimConfig};
use anyhow::{anyhow, Context, Result};
use maze_core::constants::{
    ALPHA, CHECKPOINT_INTERVAL, COIN_NEAR_DISTANCE, DECISION_PERIOD_S, EPSILON_DECAY,
    EPSILON_MIN, EPSILON_START, EVALUATE_DURATION, EVALUATE_INTERVAL, GAMMA, MAX_EPISODES,
    MAX_EPISODE_DURATION_S, OPTIMISTIC_INITIAL_VALUE, PENALTY_ENEMY, PENALTY_STEP,
    PENALTY_TIMEOUT, PENALTY_WALL, PROGRESS_REWARD_SCALE, REWARD_COIN_FAR, REWARD_COIN_NEAR,
    REWARD_EXIT, REWARD_SPEED_BONUS, SPEED_BONUS_WINDOW_S, STREAK_EPSILON_FACTOR,
    STREAK_FOR_EPSILON_CUT, STUCK_GRACE_S, STUCK_MIN_DISPLACEMENT, STUCK_SAMPLE_INTERVAL_S,
    STUCK_SAMPLE_LIMIT, TIE_TOLERANCE, TRAINER_MOVE_SPEED, TRAINER_RAY_DISTANCE,
};
use maze_core::world::RayProbe;
use maze_core::{
    Action, AgentBody, Contact, DecisionClock, QTable, QTablePaths, Scene, StateKey, TieBreak, Vec2,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

pub const LOG_HEADER: &str =
    "experiment,mode,episode,duration,total_reward,table_size,outcome,epsilon,streak";
pub const DEFAULT_LOG_FILE: &str = "qlearning_training.csv";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub exit: f32,
    pub speed_bonus: f32,
    pub speed_bonus_window: f32,
    pub coin_near: f32,
    pub coin_far: f32,
    pub coin_near_distance: f32,
    pub enemy: f32,
    pub wall: f32,
    pub step: f32,
    pub timeout: f32,
    pub progress_scale: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            exit: REWARD_EXIT,
            speed_bonus: REWARD_SPEED_BONUS,
            speed_bonus_window: SPEED_BONUS_WINDOW_S,
            coin_near: REWARD_COIN_NEAR,
            coin_far: REWARD_COIN_FAR,
            coin_near_distance: COIN_NEAR_DISTANCE,
            enemy: PENALTY_ENEMY,
            wall: PENALTY_WALL,
            step: PENALTY_STEP,
            timeout: PENALTY_TIMEOUT,
            progress_scale: PROGRESS_REWARD_SCALE,
        }
    }
}

/// Sampled displacement check that ends episodes where the body barely moves.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StuckConfig {
    pub sample_interval: f32,
    pub grace: f32,
    pub min_displacement: f32,
    pub sample_limit: u32,
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            sample_interval: STUCK_SAMPLE_INTERVAL_S,
            grace: STUCK_GRACE_S,
            min_displacement: STUCK_MIN_DISPLACEMENT,
            sample_limit: STUCK_SAMPLE_LIMIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub experiment: String,
    pub max_episodes: u32,
    pub evaluate_interval: u32,
    pub evaluate_duration: u32,
    pub checkpoint_interval: u32,
    pub alpha: f32,
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    pub epsilon_decay: f32,
    pub streak_for_epsilon_cut: u32,
    pub streak_epsilon_factor: f32,
    pub max_episode_duration: f32,
    pub move_speed: f32,
    pub ray_distance: f32,
    pub decision_period: f32,
    pub initial_value: f32,
    pub tie_tolerance: f32,
    pub rewards: RewardConfig,
    pub stuck: StuckConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            experiment: "qlearning".to_string(),
            max_episodes: MAX_EPISODES,
            evaluate_interval: EVALUATE_INTERVAL,
            evaluate_duration: EVALUATE_DURATION,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            alpha: ALPHA,
            gamma: GAMMA,
            epsilon_start: EPSILON_START,
            epsilon_min: EPSILON_MIN,
            epsilon_decay: EPSILON_DECAY,
            streak_for_epsilon_cut: STREAK_FOR_EPSILON_CUT,
            streak_epsilon_factor: STREAK_EPSILON_FACTOR,
            max_episode_duration: MAX_EPISODE_DURATION_S,
            move_speed: TRAINER_MOVE_SPEED,
            ray_distance: TRAINER_RAY_DISTANCE,
            decision_period: DECISION_PERIOD_S,
            initial_value: OPTIMISTIC_INITIAL_VALUE,
            tie_tolerance: TIE_TOLERANCE,
            rewards: RewardConfig::default(),
            stuck: StuckConfig::default(),
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_episodes == 0 {
            return Err(anyhow!("max_episodes must be > 0"));
        }
        if self.checkpoint_interval == 0 || self.evaluate_interval == 0 {
            return Err(anyhow!("checkpoint and evaluation intervals must be > 0"));
        }
        if self.decision_period <= 0.0 || self.max_episode_duration <= 0.0 {
            return Err(anyhow!("decision period and episode duration must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.epsilon_start) || self.epsilon_min > self.epsilon_start {
            return Err(anyhow!(
                "epsilon must satisfy 0 <= min ({}) <= start ({}) <= 1",
                self.epsilon_min,
                self.epsilon_start
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingOutcome {
    Success,
    Death,
    Timeout,
    Stuck,
}

impl TrainingOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Death => "death",
            Self::Timeout => "timeout",
            Self::Stuck => "stuck",
        }
    }
}

impl fmt::Display for TrainingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub experiment: String,
    pub evaluating: bool,
    pub episode: u32,
    pub duration: f32,
    pub total_reward: f32,
    pub table_size: usize,
    pub outcome: TrainingOutcome,
    pub epsilon: f32,
    pub streak: u32,
}

impl EpisodeRecord {
    pub fn mode(&self) -> &'static str {
        if self.evaluating {
            "EVAL"
        } else {
            "TRAIN"
        }
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{:.2},{:.2},{},{},{:.3},{}",
            self.experiment,
            self.mode(),
            self.episode,
            self.duration,
            self.total_reward,
            self.table_size,
            self.outcome,
            self.epsilon,
            self.streak
        )
    }
}

/// Append-only CSV of finished episodes. The header is written once, when
/// the file does not exist yet.
#[derive(Clone, Debug)]
pub struct TrainingLog {
    path: PathBuf,
}

impl TrainingLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        if !path.exists() {
            fs::write(path, format!("{LOG_HEADER}\n"))
                .with_context(|| format!("failed writing {}", path.display()))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &EpisodeRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed opening {}", self.path.display()))?;
        writeln!(file, "{}", record.to_csv_row())
            .with_context(|| format!("failed appending to {}", self.path.display()))
    }
}

/// Output locations of a training run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainerPaths {
    pub tables: QTablePaths,
    pub log: PathBuf,
}

impl TrainerPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            tables: QTablePaths::in_dir(dir),
            log: dir.join(DEFAULT_LOG_FILE),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TrainingSummary {
    pub experiment: String,
    pub episodes: u32,
    pub successes: u32,
    pub best_score: Option<f32>,
    pub final_epsilon: f32,
    pub table_size: usize,
    pub best_table: PathBuf,
    pub saved_table: PathBuf,
    pub log: PathBuf,
}

#[derive(Clone, Debug)]
struct Transition {
    state: String,
    action: Action,
}

#[derive(Clone, Copy, Debug)]
struct StuckMonitor {
    timer: f32,
    anchor: Vec2,
    count: u32,
}

impl StuckMonitor {
    fn new(anchor: Vec2) -> Self {
        Self {
            timer: 0.0,
            anchor,
            count: 0,
        }
    }
}

pub struct Trainer {
    config: TrainerConfig,
    world: MazeWorld,
    table: QTable,
    rng: ChaCha8Rng,
    clock: DecisionClock,
    log: TrainingLog,
    paths: TrainerPaths,
    start: Vec2,
    episode: u32,
    elapsed: f32,
    total_reward: f32,
    successes: u32,
    streak: u32,
    epsilon: f32,
    evaluating: bool,
    eval_counter: u32,
    best_score: Option<f32>,
    previous: Option<Transition>,
    goal_distance: Option<f32>,
    stuck: StuckMonitor,
    finished: bool,
}

impl Trainer {
    pub fn new(
        level: &Level,
        sim: SimConfig,
        config: TrainerConfig,
        paths: TrainerPaths,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        let log = TrainingLog::open(&paths.log)?;
        let world = MazeWorld::new(level.clone(), sim, seed);
        let start = world.position();
        let mut clock = DecisionClock::new(config.decision_period);
        clock.start();
        let mut trainer = Self {
            table: QTable::with_initial_value(config.initial_value),
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0x7A11_5EED),
            epsilon: config.epsilon_start,
            config,
            world,
            clock,
            log,
            paths,
            start,
            episode: 1,
            elapsed: 0.0,
            total_reward: 0.0,
            successes: 0,
            streak: 0,
            evaluating: false,
            eval_counter: 0,
            best_score: None,
            previous: None,
            goal_distance: None,
            stuck: StuckMonitor::new(start),
            finished: false,
        };
        trainer.goal_distance = trainer.distance_to_goal();
        info!(
            experiment = %trainer.config.experiment,
            max_episodes = trainer.config.max_episodes,
            "training started"
        );
        Ok(trainer)
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn world(&self) -> &MazeWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut MazeWorld {
        &mut self.world
    }

    /// One-based index of the running episode.
    pub fn episode(&self) -> u32 {
        self.episode
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn total_reward(&self) -> f32 {
        self.total_reward
    }

    pub fn successes(&self) -> u32 {
        self.successes
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating
    }

    pub fn best_score(&self) -> Option<f32> {
        self.best_score
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Runs until `max_episodes` have finished.
    pub fn run(&mut self) -> Result<TrainingSummary> {
        let dt = self.world.config().physics_dt;
        if dt <= 0.0 {
            return Err(anyhow!("physics_dt must be > 0"));
        }
        while !self.finished {
            self.step(dt)?;
        }
        Ok(self.summary())
    }

    /// Advances simulated time by `dt`: due decisions, physics, contacts,
    /// then the timeout and stuck checks.
    pub fn step(&mut self, dt: f32) -> Result<Option<TrainingOutcome>> {
        if self.finished {
            return Ok(None);
        }
        self.elapsed += dt;

        for _ in 0..self.clock.advance(dt) {
            self.decide();
        }

        for contact in self.world.step(dt) {
            if let Some(outcome) = self.handle_contact(contact)? {
                return Ok(Some(outcome));
            }
        }

        if let Some(outcome) = self.check_timeout()? {
            return Ok(Some(outcome));
        }

        self.stuck.timer += dt;
        if self.stuck.timer >= self.config.stuck.sample_interval {
            self.stuck.timer -= self.config.stuck.sample_interval;
            return self.check_stuck();
        }
        Ok(None)
    }

    fn observe(&self) -> StateKey {
        let probe = RayProbe::new(&self.world, self.world.position(), self.config.ray_distance);
        StateKey::observe(&probe, self.world.goal())
    }

    fn distance_to_goal(&self) -> Option<f32> {
        self.world.goal().map(|goal| goal.distance(self.world.position()))
    }

    /// One decision tick: settle the previous transition, then pick and
    /// actuate the next action.
    fn decide(&mut self) {
        let state = self.observe().to_string();
        let distance = self.distance_to_goal();

        if let Some(prev) = self.previous.take() {
            let progress = match (self.goal_distance, distance) {
                (Some(before), Some(now)) => before - now,
                _ => 0.0,
            };
            let reward = self.config.rewards.step + self.config.rewards.progress_scale * progress;
            if !self.evaluating {
                self.learn(&prev, reward, &state);
            }
            self.total_reward += reward;
        }
        self.goal_distance = distance;

        let action = self.choose_action(&state);
        trace!(state = %state, action = ?action, "trainer decision");
        self.world
            .set_velocity(action.vector() * self.config.move_speed);
        self.previous = Some(Transition { state, action });
    }

    fn choose_action(&mut self, state: &str) -> Action {
        if !self.evaluating {
            self.table.ensure(state);
            if self.rng.gen::<f32>() < self.epsilon {
                return Action::ALL[self.rng.gen_range(0..Action::ALL.len())];
            }
        }
        let tie_break = TieBreak::RandomWithin {
            tolerance: self.config.tie_tolerance,
        };
        // Unseen states in evaluation behave like a fresh row: all tied.
        self.table
            .best_action(state, tie_break, &mut self.rng)
            .unwrap_or_else(|| Action::ALL[self.rng.gen_range(0..Action::ALL.len())])
    }

    fn learn(&mut self, transition: &Transition, reward: f32, next_state: &str) {
        self.table.update(
            &transition.state,
            transition.action,
            reward,
            next_state,
            self.config.alpha,
            self.config.gamma,
        );
    }

    /// Credits an event reward to the pending transition.
    fn reward_event(&mut self, reward: f32) {
        if reward == 0.0 {
            return;
        }
        self.total_reward += reward;
        if self.evaluating {
            return;
        }
        if let Some(prev) = self.previous.clone() {
            let next = self.observe().to_string();
            self.learn(&prev, reward, &next);
        }
    }

    pub fn handle_contact(&mut self, contact: Contact) -> Result<Option<TrainingOutcome>> {
        if self.finished {
            return Ok(None);
        }
        let rewards = self.config.rewards;
        let (reward, outcome) = match contact {
            Contact::Collectible { id, position } => {
                self.world.deactivate_collectible(id);
                let near = self
                    .world
                    .goal()
                    .is_some_and(|goal| goal.distance(position) < rewards.coin_near_distance);
                let reward = if near { rewards.coin_near } else { rewards.coin_far };
                (reward, None)
            }
            Contact::Threat => {
                self.streak = 0;
                (rewards.enemy, Some(TrainingOutcome::Death))
            }
            Contact::Goal => {
                self.world.zero_velocity();
                let mut reward = rewards.exit;
                if self.elapsed < rewards.speed_bonus_window {
                    reward += rewards.speed_bonus;
                }
                self.successes += 1;
                self.streak += 1;
                if self.streak >= self.config.streak_for_epsilon_cut && !self.evaluating {
                    self.epsilon =
                        (self.epsilon * self.config.streak_epsilon_factor).max(self.config.epsilon_min);
                }
                (reward, Some(TrainingOutcome::Success))
            }
            Contact::Wall => {
                let reward = if self.evaluating { 0.0 } else { rewards.wall };
                (reward, None)
            }
        };

        self.reward_event(reward);

        let Some(outcome) = outcome else {
            return Ok(None);
        };
        if outcome == TrainingOutcome::Success
            && !self.evaluating
            && self.best_score.map_or(true, |best| self.total_reward > best)
        {
            self.best_score = Some(self.total_reward);
            self.save_table(&self.paths.tables.best)?;
            info!(score = self.total_reward, episode = self.episode, "new best score");
        }
        self.end_episode(outcome)?;
        Ok(Some(outcome))
    }

    /// Ends the episode as a timeout once the duration cap is reached.
    pub fn check_timeout(&mut self) -> Result<Option<TrainingOutcome>> {
        if self.finished || self.elapsed < self.config.max_episode_duration {
            return Ok(None);
        }
        self.fail_episode(TrainingOutcome::Timeout).map(Some)
    }

    /// One displacement sample. Ten consecutive near-stationary samples end
    /// the episode the same way a timeout does.
    pub fn check_stuck(&mut self) -> Result<Option<TrainingOutcome>> {
        if self.finished || self.elapsed < self.config.stuck.grace {
            return Ok(None);
        }
        let position = self.world.position();
        let moved = position.distance(self.stuck.anchor);
        self.stuck.anchor = position;
        if moved >= self.config.stuck.min_displacement {
            self.stuck.count = 0;
            return Ok(None);
        }
        self.stuck.count += 1;
        if self.stuck.count < self.config.stuck.sample_limit {
            return Ok(None);
        }
        debug!(episode = self.episode, "trainer body stuck");
        self.fail_episode(TrainingOutcome::Stuck).map(Some)
    }

    fn fail_episode(&mut self, outcome: TrainingOutcome) -> Result<TrainingOutcome> {
        let penalty = self.config.rewards.timeout;
        self.total_reward += penalty;
        if !self.evaluating {
            if let Some(prev) = self.previous.clone() {
                let next = self.observe().to_string();
                self.learn(&prev, penalty, &next);
            }
        }
        self.streak = 0;
        self.end_episode(outcome)?;
        Ok(outcome)
    }

    /// Logs the episode, applies the epsilon schedule, checkpoints and either
    /// finishes the run or resets for the next episode.
    pub fn end_episode(&mut self, outcome: TrainingOutcome) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let record = EpisodeRecord {
            experiment: self.config.experiment.clone(),
            evaluating: self.evaluating,
            episode: self.episode,
            duration: self.elapsed,
            total_reward: self.total_reward,
            table_size: self.table.len(),
            outcome,
            epsilon: self.epsilon,
            streak: self.streak,
        };
        self.log.append(&record)?;
        info!(
            episode = record.episode,
            mode = record.mode(),
            outcome = %outcome,
            reward = record.total_reward,
            epsilon = record.epsilon,
            states = record.table_size,
            "episode finished"
        );

        if !self.evaluating {
            self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        }

        if self.episode % self.config.checkpoint_interval == 0 {
            self.save_table(&self.paths.tables.last_saved)?;
            info!(episode = self.episode, states = self.table.len(), "q-table checkpoint");
        }

        if self.episode >= self.config.max_episodes {
            self.save_table(&self.paths.tables.last_saved)?;
            self.finished = true;
            self.clock.stop();
            self.world.zero_velocity();
            info!(
                successes = self.successes,
                episodes = self.episode,
                best = ?self.best_score,
                states = self.table.len(),
                "training complete"
            );
            return Ok(());
        }

        self.advance_evaluation();
        self.episode += 1;
        self.reset_episode();
        Ok(())
    }

    fn advance_evaluation(&mut self) {
        if self.evaluating {
            self.eval_counter += 1;
            if self.eval_counter >= self.config.evaluate_duration {
                self.evaluating = false;
            }
        } else if self.episode % self.config.evaluate_interval == 0 {
            self.evaluating = true;
            self.eval_counter = 0;
            info!(episode = self.episode + 1, "evaluation started");
        }
    }

    fn reset_episode(&mut self) {
        self.clock.restart();
        self.world.teleport(self.start);
        self.world.zero_velocity();
        self.world.reactivate_collectibles();
        self.total_reward = 0.0;
        self.elapsed = 0.0;
        self.previous = None;
        self.stuck = StuckMonitor::new(self.world.position());
        self.goal_distance = self.distance_to_goal();
    }

    fn save_table(&self, path: &Path) -> Result<()> {
        self.table
            .save(path)
            .with_context(|| format!("failed saving q-table {}", path.display()))
    }

    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            experiment: self.config.experiment.clone(),
            episodes: if self.finished { self.episode } else { self.episode - 1 },
            successes: self.successes,
            best_score: self.best_score,
            final_epsilon: self.epsilon,
            table_size: self.table.len(),
            best_table: self.paths.tables.best.clone(),
            saved_table: self.paths.tables.last_saved.clone(),
            log: self.log.path().to_path_buf(),
        }
    }
}
