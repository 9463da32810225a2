//! Discrete observation shared by the tactical policy and the trainer.
//!
//! A key is the goal bucket, an underscore, then one flag per cardinal in
//! up, down, left, right order (`U`/`D`/`L`/`R` when blocked, `_` when open):
//! `R_U__R`, `NoExit_____`.

use crate::error::StateKeyError;
use crate::vec2::Vec2;
use crate::world::{RayProbe, SpatialQuery};
use core::fmt;
use core::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Action {
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn vector(self) -> Vec2 {
        match self {
            Self::Up => Vec2::UP,
            Self::Down => Vec2::DOWN,
            Self::Left => Vec2::LEFT,
            Self::Right => Vec2::RIGHT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GoalBucket {
    Up,
    Down,
    Left,
    Right,
    NoExit,
}

impl GoalBucket {
    /// Dominant axis of the offset to the goal. Horizontal wins only when
    /// strictly larger; a zero offset lands in `Down`.
    pub fn toward(from: Vec2, goal: Option<Vec2>) -> Self {
        let Some(goal) = goal else {
            return Self::NoExit;
        };
        let dir = (goal - from).normalize_or_zero();
        if dir.x.abs() > dir.y.abs() {
            if dir.x > 0.0 {
                Self::Right
            } else {
                Self::Left
            }
        } else if dir.y > 0.0 {
            Self::Up
        } else {
            Self::Down
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Up => "U",
            Self::Down => "D",
            Self::Left => "L",
            Self::Right => "R",
            Self::NoExit => "NoExit",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub goal: GoalBucket,
    /// Blocked flags indexed like [`Action`].
    pub walls: [bool; 4],
}

const WALL_LETTERS: [char; 4] = ['U', 'D', 'L', 'R'];

impl StateKey {
    pub fn new(goal: GoalBucket, walls: [bool; 4]) -> Self {
        Self { goal, walls }
    }

    pub fn observe<Q: SpatialQuery + ?Sized>(probe: &RayProbe<'_, Q>, goal: Option<Vec2>) -> Self {
        let walls = Action::ALL.map(|action| probe.is_blocked(action.vector()));
        Self::new(GoalBucket::toward(probe.origin(), goal), walls)
    }

    pub fn is_blocked(&self, action: Action) -> bool {
        self.walls[action.index()]
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_", self.goal.as_str())?;
        for (blocked, letter) in self.walls.iter().zip(WALL_LETTERS) {
            write!(f, "{}", if *blocked { letter } else { '_' })?;
        }
        Ok(())
    }
}

impl FromStr for StateKey {
    type Err = StateKeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        // The flags themselves may be underscores, so split at a fixed offset.
        if raw.len() < 5 || !raw.is_char_boundary(raw.len() - 4) {
            return Err(StateKeyError::BadWallFlags(raw.to_string()));
        }
        let (head, flags) = raw.split_at(raw.len() - 4);
        let bucket = head
            .strip_suffix('_')
            .ok_or_else(|| StateKeyError::MissingSeparator(raw.to_string()))?;
        let goal = match bucket {
            "U" => GoalBucket::Up,
            "D" => GoalBucket::Down,
            "L" => GoalBucket::Left,
            "R" => GoalBucket::Right,
            "NoExit" => GoalBucket::NoExit,
            _ => return Err(StateKeyError::UnknownGoalBucket(raw.to_string())),
        };

        let mut walls = [false; 4];
        for ((slot, flag), letter) in walls.iter_mut().zip(flags.chars()).zip(WALL_LETTERS) {
            *slot = match flag {
                '_' => false,
                c if c == letter => true,
                _ => return Err(StateKeyError::BadWallFlags(raw.to_string())),
            };
        }
        Ok(Self { goal, walls })
    }
}
