//! ASCII maze levels.
//!
//! One character per unit cell, top row first:
//! `#` wall, `.` or space floor, `S` agent start, `E` exit, `T` threat spawn,
//! `$` collectible. The level is centred on the world origin.

use anyhow::{Context, Result};
use maze_core::constants::CELL_RADIUS;
use maze_core::{GridCoord, GridSpec, Vec2};
use std::fmt;
use std::fs;
use std::path::Path;

pub const DEFAULT_LEVEL: &str = "\
####################
#S.....#......$....#
#.####.#.####.####.#
#.#..$.......#...#.#
#.#.####.###.#.#.#.#
#...#..T...#...#..E#
###.#.####.#####.#.#
#...$....#.....T.#.#
#.######.#.#####.#.#
#........#...$.....#
####################
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LevelError {
    Empty,
    Ragged { line: usize, expected: usize, found: usize },
    UnknownTile { line: usize, column: usize, tile: char },
    MissingStart,
    Duplicate { tile: char, line: usize, column: usize },
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "level has no rows"),
            Self::Ragged {
                line,
                expected,
                found,
            } => write!(f, "line {line} has {found} tiles, expected {expected}"),
            Self::UnknownTile { line, column, tile } => {
                write!(f, "unknown tile {tile:?} at line {line}, column {column}")
            }
            Self::MissingStart => write!(f, "level has no start tile 'S'"),
            Self::Duplicate { tile, line, column } => {
                write!(f, "second {tile:?} tile at line {line}, column {column}")
            }
        }
    }
}

impl std::error::Error for LevelError {}

#[derive(Clone, Debug, PartialEq)]
pub struct Level {
    cols: i32,
    rows: i32,
    /// Row-major, row 0 at the bottom.
    walls: Vec<bool>,
    start: Vec2,
    exit: Option<Vec2>,
    threats: Vec<Vec2>,
    collectibles: Vec<Vec2>,
}

impl Level {
    pub fn parse(text: &str) -> Result<Self, LevelError> {
        let mut lines: Vec<&str> = text.lines().map(|line| line.trim_end_matches('\r')).collect();
        // Blank lines only around the map; a row of spaces is floor.
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        let leading = lines.iter().take_while(|line| line.is_empty()).count();
        let lines = &lines[leading..];
        let first = lines.first().ok_or(LevelError::Empty)?;
        let cols = first.chars().count();
        let rows = lines.len();

        let mut walls = vec![false; cols * rows];
        let mut start = None;
        let mut exit = None;
        let mut threats = Vec::new();
        let mut collectibles = Vec::new();

        for (line_idx, line) in lines.iter().enumerate() {
            let found = line.chars().count();
            if found != cols {
                return Err(LevelError::Ragged {
                    line: line_idx + 1,
                    expected: cols,
                    found,
                });
            }
            let row = rows - 1 - line_idx;
            for (col, tile) in line.chars().enumerate() {
                let coord = GridCoord::new(col as i32, row as i32);
                let center = cell_center(cols as i32, rows as i32, coord);
                match tile {
                    '#' => walls[row * cols + col] = true,
                    '.' | ' ' => {}
                    'S' | 'E' => {
                        let slot = if tile == 'S' { &mut start } else { &mut exit };
                        if slot.is_some() {
                            return Err(LevelError::Duplicate {
                                tile,
                                line: line_idx + 1,
                                column: col + 1,
                            });
                        }
                        *slot = Some(center);
                    }
                    'T' => threats.push(center),
                    '$' => collectibles.push(center),
                    _ => {
                        return Err(LevelError::UnknownTile {
                            line: line_idx + 1,
                            column: col + 1,
                            tile,
                        })
                    }
                }
            }
        }

        Ok(Self {
            cols: cols as i32,
            rows: rows as i32,
            walls,
            start: start.ok_or(LevelError::MissingStart)?,
            exit,
            threats,
            collectibles,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading level {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid level {}", path.display()))
    }

    pub fn builtin() -> Self {
        match Self::parse(DEFAULT_LEVEL) {
            Ok(level) => level,
            Err(err) => unreachable!("built-in level is malformed: {err}"),
        }
    }

    /// `path` when given, otherwise the built-in level.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn start(&self) -> Vec2 {
        self.start
    }

    pub fn exit(&self) -> Option<Vec2> {
        self.exit
    }

    pub fn threats(&self) -> &[Vec2] {
        &self.threats
    }

    pub fn collectibles(&self) -> &[Vec2] {
        &self.collectibles
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.cols as f32, self.rows as f32)
    }

    pub fn grid_spec(&self) -> GridSpec {
        GridSpec {
            center: Vec2::ZERO,
            world_size: self.size(),
            cell_radius: CELL_RADIUS,
        }
    }

    pub fn cell_center(&self, coord: GridCoord) -> Vec2 {
        cell_center(self.cols, self.rows, coord)
    }

    /// Cell containing `point`; `None` outside the level.
    pub fn cell_of(&self, point: Vec2) -> Option<GridCoord> {
        let local = point + self.size() * 0.5;
        let col = local.x.floor() as i32;
        let row = local.y.floor() as i32;
        ((0..self.cols).contains(&col) && (0..self.rows).contains(&row))
            .then_some(GridCoord::new(col, row))
    }

    pub fn is_wall(&self, coord: GridCoord) -> bool {
        if !(0..self.cols).contains(&coord.col) || !(0..self.rows).contains(&coord.row) {
            return true;
        }
        self.walls[(coord.row * self.cols + coord.col) as usize]
    }

    /// Outside the level counts as solid.
    pub fn is_wall_at(&self, point: Vec2) -> bool {
        self.cell_of(point).map_or(true, |coord| self.is_wall(coord))
    }

    /// Whether a circle overlaps any wall cell.
    pub fn circle_hits_wall(&self, center: Vec2, radius: f32) -> bool {
        let local = center + self.size() * 0.5;
        let min_col = (local.x - radius).floor() as i32;
        let max_col = (local.x + radius).floor() as i32;
        let min_row = (local.y - radius).floor() as i32;
        let max_row = (local.y + radius).floor() as i32;
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                let coord = GridCoord::new(col, row);
                if !self.is_wall(coord) {
                    continue;
                }
                let nearest = Vec2::new(
                    local.x.clamp(col as f32, col as f32 + 1.0),
                    local.y.clamp(row as f32, row as f32 + 1.0),
                );
                if local.distance(nearest) < radius {
                    return true;
                }
            }
        }
        false
    }

    /// Centre of the floor cell closest to `point`.
    pub fn nearest_floor(&self, point: Vec2) -> Option<Vec2> {
        let mut best: Option<(f32, Vec2)> = None;
        for row in 0..self.rows {
            for col in 0..self.cols {
                let coord = GridCoord::new(col, row);
                if self.is_wall(coord) {
                    continue;
                }
                let center = self.cell_center(coord);
                let dist = center.distance(point);
                if best.map_or(true, |(d, _)| dist < d) {
                    best = Some((dist, center));
                }
            }
        }
        best.map(|(_, center)| center)
    }

    /// Centres of the innermost corner cells, as `(min, max)`.
    pub fn spawn_bounds(&self) -> (Vec2, Vec2) {
        let min = self.cell_center(GridCoord::new(1.min(self.cols - 1), 1.min(self.rows - 1)));
        let max = self.cell_center(GridCoord::new(
            (self.cols - 2).max(0),
            (self.rows - 2).max(0),
        ));
        (min, max)
    }
}

fn cell_center(cols: i32, rows: i32, coord: GridCoord) -> Vec2 {
    Vec2::new(
        coord.col as f32 + 0.5 - cols as f32 / 2.0,
        coord.row as f32 + 0.5 - rows as f32 / 2.0,
    )
}
