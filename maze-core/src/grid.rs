//! Uniform cell lattice over the play area.
//!
//! Cells are created once from occupancy probes and live in a row-major
//! arena. Search scratch (`g_cost`, `h_cost`, `parent`) is stored on the cells
//! and overwritten by every path search.

use crate::constants::OCCUPANCY_EPSILON;
use crate::error::GridError;
use crate::vec2::Vec2;
use crate::world::{LayerMask, SpatialQuery};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    pub col: i32,
    pub row: i32,
}

impl GridCoord {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    pub fn manhattan(self, other: Self) -> u32 {
        self.col.abs_diff(other.col) + self.row.abs_diff(other.row)
    }
}

/// Placement of the lattice in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub center: Vec2,
    pub world_size: Vec2,
    pub cell_radius: f32,
}

#[derive(Clone, Debug)]
pub struct Cell {
    pub walkable: bool,
    pub world_position: Vec2,
    pub coord: GridCoord,
    pub(crate) g_cost: u32,
    pub(crate) h_cost: u32,
    pub(crate) parent: Option<usize>,
}

impl Cell {
    fn new(walkable: bool, world_position: Vec2, coord: GridCoord) -> Self {
        Self {
            walkable,
            world_position,
            coord,
            g_cost: 0,
            h_cost: 0,
            parent: None,
        }
    }

    pub fn g_cost(&self) -> u32 {
        self.g_cost
    }

    pub fn h_cost(&self) -> u32 {
        self.h_cost
    }

    pub fn f_cost(&self) -> u32 {
        self.g_cost + self.h_cost
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub(crate) fn clear_scratch(&mut self) {
        self.g_cost = 0;
        self.h_cost = 0;
        self.parent = None;
    }
}

#[derive(Clone, Debug)]
pub struct Grid {
    pub(crate) cells: Vec<Cell>,
    cols: i32,
    rows: i32,
    center: Vec2,
    cell_radius: f32,
}

impl Grid {
    /// Probes every cell centre with a circle slightly smaller than the cell;
    /// any obstacle overlap marks the cell blocked.
    pub fn build<Q: SpatialQuery + ?Sized>(query: &Q, spec: GridSpec) -> Result<Self, GridError> {
        if !(spec.cell_radius > 0.0) {
            return Err(GridError::NonPositiveCellRadius {
                cell_radius: spec.cell_radius,
            });
        }
        let diameter = spec.cell_radius * 2.0;
        let cols = (spec.world_size.x / diameter).round() as i32;
        let rows = (spec.world_size.y / diameter).round() as i32;
        if cols <= 0 || rows <= 0 {
            return Err(GridError::EmptyGrid { cols, rows });
        }

        let mut grid = Self {
            cells: Vec::with_capacity((cols * rows) as usize),
            cols,
            rows,
            center: spec.center,
            cell_radius: spec.cell_radius,
        };
        let probe_radius = spec.cell_radius - OCCUPANCY_EPSILON;
        for row in 0..rows {
            for col in 0..cols {
                let coord = GridCoord::new(col, row);
                let position = grid.cell_to_world(coord);
                let walkable = !query.is_occupied(position, probe_radius, LayerMask::OBSTACLE);
                grid.cells.push(Cell::new(walkable, position, coord));
            }
        }
        Ok(grid)
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn cell_radius(&self) -> f32 {
        self.cell_radius
    }

    pub fn cell_diameter(&self) -> f32 {
        self.cell_radius * 2.0
    }

    /// World-space size actually covered by the cells.
    pub fn extent(&self) -> Vec2 {
        Vec2::new(
            self.cols as f32 * self.cell_diameter(),
            self.rows as f32 * self.cell_diameter(),
        )
    }

    pub fn bottom_left(&self) -> Vec2 {
        self.center - self.extent() * 0.5
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, coord: GridCoord) -> bool {
        (0..self.cols).contains(&coord.col) && (0..self.rows).contains(&coord.row)
    }

    pub fn index_of(&self, coord: GridCoord) -> Option<usize> {
        self.contains(coord)
            .then(|| (coord.row * self.cols + coord.col) as usize)
    }

    pub fn cell(&self, coord: GridCoord) -> Option<&Cell> {
        self.index_of(coord).map(|idx| &self.cells[idx])
    }

    pub fn cell_at(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn is_walkable(&self, coord: GridCoord) -> bool {
        self.cell(coord).is_some_and(|cell| cell.walkable)
    }

    pub fn cell_to_world(&self, coord: GridCoord) -> Vec2 {
        let diameter = self.cell_diameter();
        self.bottom_left()
            + Vec2::new(
                coord.col as f32 * diameter + self.cell_radius,
                coord.row as f32 * diameter + self.cell_radius,
            )
    }

    /// Nearest in-bounds cell; points outside the grid clamp to the border.
    pub fn world_to_cell(&self, position: Vec2) -> GridCoord {
        let extent = self.extent();
        let local = position - self.bottom_left();
        let percent_x = (local.x / extent.x).clamp(0.0, 1.0);
        let percent_y = (local.y / extent.y).clamp(0.0, 1.0);
        let col = ((self.cols - 1) as f32 * percent_x).round() as i32;
        let row = ((self.rows - 1) as f32 * percent_y).round() as i32;
        GridCoord::new(col.clamp(0, self.cols - 1), row.clamp(0, self.rows - 1))
    }

    /// 4-connected neighbours inside the grid, in left, down, up, right order.
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let coord = self.cells[index].coord;
        [(-1, 0), (0, -1), (0, 1), (1, 0)]
            .into_iter()
            .filter_map(move |(dc, dr)| {
                self.index_of(GridCoord::new(coord.col + dc, coord.row + dr))
            })
    }

    pub fn walkable_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.walkable).count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Occupancy over a boolean mask laid out like the grid (row 0 at the bottom).
    pub(crate) struct MaskQuery {
        pub spec: GridSpec,
        pub cols: i32,
        pub rows: i32,
        pub blocked: Vec<bool>,
    }

    impl MaskQuery {
        pub fn open(cols: i32, rows: i32) -> Self {
            Self {
                spec: GridSpec {
                    center: Vec2::ZERO,
                    world_size: Vec2::new(cols as f32, rows as f32),
                    cell_radius: 0.5,
                },
                cols,
                rows,
                blocked: vec![false; (cols * rows) as usize],
            }
        }

        pub fn bordered(cols: i32, rows: i32) -> Self {
            let mut query = Self::open(cols, rows);
            for row in 0..rows {
                for col in 0..cols {
                    if col == 0 || row == 0 || col == cols - 1 || row == rows - 1 {
                        query.block(col, row);
                    }
                }
            }
            query
        }

        pub fn block(&mut self, col: i32, row: i32) {
            self.blocked[(row * self.cols + col) as usize] = true;
        }

        fn blocked_at(&self, point: Vec2) -> bool {
            let local = point - (self.spec.center - self.spec.world_size * 0.5);
            let col = local.x.floor() as i32;
            let row = local.y.floor() as i32;
            if col < 0 || row < 0 || col >= self.cols || row >= self.rows {
                return true;
            }
            self.blocked[(row * self.cols + col) as usize]
        }
    }

    impl SpatialQuery for MaskQuery {
        fn is_occupied(&self, point: Vec2, _radius: f32, _layers: LayerMask) -> bool {
            self.blocked_at(point)
        }

        fn raycast_blocked(
            &self,
            origin: Vec2,
            direction: Vec2,
            max_distance: f32,
            _layers: LayerMask,
        ) -> bool {
            let dir = direction.normalize_or_zero();
            let steps = (max_distance / 0.05).ceil() as i32;
            (1..=steps).any(|i| {
                let t = (i as f32 * 0.05).min(max_distance);
                self.blocked_at(origin + dir * t)
            })
        }
    }

    #[test]
    fn dimensions_follow_world_size_and_radius() {
        let query = MaskQuery::open(20, 11);
        let grid = Grid::build(&query, query.spec).expect("grid");
        assert_eq!((grid.cols(), grid.rows()), (20, 11));
        assert_eq!(grid.len(), 220);
        assert_eq!(grid.cell_to_world(GridCoord::new(0, 0)), Vec2::new(-9.5, -5.0));
    }

    #[test]
    fn world_to_cell_inverts_cell_to_world() {
        for (cols, rows) in [(10, 10), (20, 11), (3, 7), (1, 1)] {
            let query = MaskQuery::open(cols, rows);
            let grid = Grid::build(&query, query.spec).expect("grid");
            for cell in grid.cells() {
                assert_eq!(grid.world_to_cell(grid.cell_to_world(cell.coord)), cell.coord);
            }
        }
    }

    #[test]
    fn out_of_bounds_positions_clamp() {
        let query = MaskQuery::open(10, 10);
        let grid = Grid::build(&query, query.spec).expect("grid");
        assert_eq!(grid.world_to_cell(Vec2::new(-100.0, -100.0)), GridCoord::new(0, 0));
        assert_eq!(grid.world_to_cell(Vec2::new(100.0, 100.0)), GridCoord::new(9, 9));
        assert_eq!(grid.world_to_cell(Vec2::new(100.0, -100.0)), GridCoord::new(9, 0));
    }

    #[test]
    fn occupancy_marks_border_blocked() {
        let query = MaskQuery::bordered(10, 10);
        let grid = Grid::build(&query, query.spec).expect("grid");
        assert!(!grid.is_walkable(GridCoord::new(0, 5)));
        assert!(!grid.is_walkable(GridCoord::new(9, 9)));
        assert!(grid.is_walkable(GridCoord::new(1, 1)));
        assert_eq!(grid.walkable_count(), 64);
    }

    #[test]
    fn neighbors_are_four_connected_and_clipped() {
        let query = MaskQuery::open(3, 3);
        let grid = Grid::build(&query, query.spec).expect("grid");
        let corner = grid.index_of(GridCoord::new(0, 0)).expect("corner");
        let coords: Vec<_> = grid.neighbors(corner).map(|i| grid.cell_at(i).coord).collect();
        assert_eq!(coords, vec![GridCoord::new(0, 1), GridCoord::new(1, 0)]);
        let middle = grid.index_of(GridCoord::new(1, 1)).expect("middle");
        assert_eq!(grid.neighbors(middle).count(), 4);
    }

    #[test]
    fn rejects_degenerate_specs() {
        let query = MaskQuery::open(2, 2);
        let mut spec = query.spec;
        spec.cell_radius = 0.0;
        assert!(matches!(
            Grid::build(&query, spec),
            Err(GridError::NonPositiveCellRadius { .. })
        ));
        spec.cell_radius = 5.0;
        assert!(matches!(Grid::build(&query, spec), Err(GridError::EmptyGrid { .. })));
    }
}
