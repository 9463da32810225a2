//! A* over the 4-connected cell arena.
//!
//! Closed cells are never reopened. With unit step costs and the Manhattan
//! heuristic (consistent on a 4-connected lattice) this still yields shortest
//! paths.

use crate::constants::STEP_COST;
use crate::grid::{Grid, GridCoord};
use crate::vec2::Vec2;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Waypoint {
    pub coord: GridCoord,
    pub position: Vec2,
}

/// Cells from the start (exclusive) to the goal (inclusive).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    waypoints: Vec<Waypoint>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn last(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    /// Total cost in the search's integer units.
    pub fn cost(&self) -> u32 {
        self.waypoints.len() as u32 * STEP_COST
    }
}

pub fn heuristic(a: GridCoord, b: GridCoord) -> u32 {
    STEP_COST * a.manhattan(b)
}

impl Grid {
    pub fn find_path(&mut self, start: Vec2, goal: Vec2) -> Option<Path> {
        let start_coord = self.world_to_cell(start);
        let goal_coord = self.world_to_cell(goal);
        self.find_path_between(start_coord, goal_coord)
    }

    pub fn find_path_between(&mut self, start: GridCoord, goal: GridCoord) -> Option<Path> {
        let start_idx = self.index_of(start)?;
        let goal_idx = self.index_of(goal)?;

        for cell in &mut self.cells {
            cell.clear_scratch();
        }
        let mut in_open = vec![false; self.cells.len()];
        let mut closed = vec![false; self.cells.len()];
        // (f, h, insertion order, cell); stale entries are skipped on pop.
        let mut open: BinaryHeap<Reverse<(u32, u32, u64, usize)>> = BinaryHeap::new();
        let mut sequence = 0u64;

        let start_h = heuristic(start, goal);
        self.cells[start_idx].h_cost = start_h;
        open.push(Reverse((start_h, start_h, sequence, start_idx)));
        in_open[start_idx] = true;

        while let Some(Reverse((f_cost, h_cost, _, current))) = open.pop() {
            if closed[current] {
                continue;
            }
            let cell = &self.cells[current];
            if cell.f_cost() != f_cost || cell.h_cost != h_cost {
                continue;
            }
            in_open[current] = false;
            closed[current] = true;

            if current == goal_idx {
                return Some(self.retrace(start_idx, goal_idx));
            }

            let current_g = self.cells[current].g_cost;
            let neighbors: Vec<usize> = self.neighbors(current).collect();
            for neighbor in neighbors {
                if !self.cells[neighbor].walkable || closed[neighbor] {
                    continue;
                }
                let tentative = current_g + STEP_COST;
                let cell = &mut self.cells[neighbor];
                if tentative < cell.g_cost || !in_open[neighbor] {
                    cell.g_cost = tentative;
                    cell.h_cost = heuristic(cell.coord, goal);
                    cell.parent = Some(current);
                    sequence += 1;
                    open.push(Reverse((cell.f_cost(), cell.h_cost, sequence, neighbor)));
                    in_open[neighbor] = true;
                }
            }
        }

        None
    }

    fn retrace(&self, start_idx: usize, goal_idx: usize) -> Path {
        let mut waypoints = Vec::new();
        let mut current = goal_idx;
        while current != start_idx {
            let cell = &self.cells[current];
            waypoints.push(Waypoint {
                coord: cell.coord,
                position: cell.world_position,
            });
            match cell.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        waypoints.reverse();
        Path { waypoints }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::MaskQuery;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::VecDeque;

    fn bfs_steps(grid: &Grid, start: GridCoord, goal: GridCoord) -> Option<usize> {
        let start_idx = grid.index_of(start)?;
        let goal_idx = grid.index_of(goal)?;
        let mut dist = vec![usize::MAX; grid.len()];
        let mut queue = VecDeque::new();
        dist[start_idx] = 0;
        queue.push_back(start_idx);
        while let Some(current) = queue.pop_front() {
            if current == goal_idx {
                return Some(dist[current]);
            }
            for next in grid.neighbors(current) {
                if grid.cell_at(next).walkable && dist[next] == usize::MAX {
                    dist[next] = dist[current] + 1;
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn assert_contiguous(path: &Path, start: GridCoord) {
        let mut previous = start;
        for waypoint in path.waypoints() {
            assert_eq!(previous.manhattan(waypoint.coord), 1, "path jumps at {waypoint:?}");
            previous = waypoint.coord;
        }
    }

    #[test]
    fn open_grid_path_is_manhattan() {
        let query = MaskQuery::bordered(10, 10);
        let mut grid = Grid::build(&query, query.spec).expect("grid");
        let start = GridCoord::new(1, 1);
        let goal = GridCoord::new(8, 8);
        let path = grid.find_path_between(start, goal).expect("path");
        assert_eq!(path.len(), 14);
        assert_eq!(path.cost(), 140);
        assert_eq!(path.last().map(|w| w.coord), Some(goal));
        assert_contiguous(&path, start);
    }

    #[test]
    fn matches_bfs_on_random_mazes() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
        for _ in 0..60 {
            let cols = rng.gen_range(4..14);
            let rows = rng.gen_range(4..14);
            let mut query = MaskQuery::open(cols, rows);
            for row in 0..rows {
                for col in 0..cols {
                    if rng.gen_bool(0.3) {
                        query.block(col, row);
                    }
                }
            }
            let mut grid = Grid::build(&query, query.spec).expect("grid");
            for _ in 0..10 {
                let start = GridCoord::new(rng.gen_range(0..cols), rng.gen_range(0..rows));
                let goal = GridCoord::new(rng.gen_range(0..cols), rng.gen_range(0..rows));
                let expected = if start == goal || grid.is_walkable(goal) {
                    bfs_steps(&grid, start, goal)
                } else {
                    None
                };
                let found = grid.find_path_between(start, goal);
                assert_eq!(found.as_ref().map(Path::len), expected, "{start:?} -> {goal:?}");
                if let Some(path) = found {
                    assert_contiguous(&path, start);
                    assert!(path.waypoints().iter().all(|w| grid.is_walkable(w.coord)));
                }
            }
        }
    }

    #[test]
    fn walled_off_goal_is_unreachable() {
        let mut query = MaskQuery::open(7, 7);
        for i in 0..7 {
            query.block(3, i);
        }
        let mut grid = Grid::build(&query, query.spec).expect("grid");
        assert_eq!(grid.find_path_between(GridCoord::new(0, 0), GridCoord::new(6, 6)), None);
    }

    #[test]
    fn same_cell_gives_empty_path() {
        let query = MaskQuery::open(5, 5);
        let mut grid = Grid::build(&query, query.spec).expect("grid");
        let path = grid.find_path(Vec2::ZERO, Vec2::new(0.1, -0.1)).expect("path");
        assert!(path.is_empty());
    }

    #[test]
    fn repeated_searches_do_not_leak_scratch() {
        let query = MaskQuery::bordered(10, 10);
        let mut grid = Grid::build(&query, query.spec).expect("grid");
        let first = grid.find_path_between(GridCoord::new(1, 1), GridCoord::new(8, 8));
        grid.find_path_between(GridCoord::new(8, 1), GridCoord::new(1, 8));
        let again = grid.find_path_between(GridCoord::new(1, 1), GridCoord::new(8, 8));
        assert_eq!(first, again);
    }
}
