//! Sparse half-step occupancy grid.
//!
//! Cells are half a minimum feature wide and keyed by signed steps from the
//! start position, so the grid grows lazily in any direction as robots
//! wander. A cell is unknown until a traversal or bump touches it.

use crate::core::{GridCoord, Point, HALF_CELL_M};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellState {
    Open,
    Obstacle,
}

pub struct ExplorationGrid {
    origin: Point,
    cells: HashMap<GridCoord, CellState>,
}

impl ExplorationGrid {
    pub fn new(origin: Point) -> Self {
        ExplorationGrid {
            origin,
            cells: HashMap::new(),
        }
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Cell containing a world position.
    pub fn to_cell(&self, p: Point) -> GridCoord {
        GridCoord::new(
            ((p.x - self.origin.x) / HALF_CELL_M).round() as i32,
            ((p.y - self.origin.y) / HALF_CELL_M).round() as i32,
        )
    }

    /// Center of a cell in world coordinates.
    pub fn to_world(&self, c: GridCoord) -> Point {
        Point::new(
            self.origin.x + c.x as f64 * HALF_CELL_M,
            self.origin.y + c.y as f64 * HALF_CELL_M,
        )
    }

    pub fn state(&self, c: GridCoord) -> Option<CellState> {
        self.cells.get(&c).copied()
    }

    pub fn is_open(&self, c: GridCoord) -> bool {
        self.state(c) == Some(CellState::Open)
    }

    pub fn is_obstacle(&self, c: GridCoord) -> bool {
        self.state(c) == Some(CellState::Obstacle)
    }

    pub fn is_unknown(&self, c: GridCoord) -> bool {
        self.state(c).is_none()
    }

    pub fn mark_open(&mut self, c: GridCoord) {
        // A bump verdict outranks a traversal estimate.
        self.cells.entry(c).or_insert(CellState::Open);
    }

    pub fn mark_obstacle(&mut self, c: GridCoord) {
        self.cells.insert(c, CellState::Obstacle);
    }

    /// Mark every cell under the straight segment from `from` to `to` as
    /// open, sampling at half-cell resolution.
    pub fn mark_traversed(&mut self, from: Point, to: Point) {
        let length = from.distance(&to);
        let steps = (length / (HALF_CELL_M / 2.0)).ceil() as usize;
        for i in 0..=steps.max(1) {
            let t = i as f64 / steps.max(1) as f64;
            let p = Point::new(
                from.x + (to.x - from.x) * t,
                from.y + (to.y - from.y) * t,
            );
            self.mark_open(self.to_cell(p));
        }
    }

    /// Frontier: an open cell with at least one unknown neighbor.
    pub fn is_frontier(&self, c: GridCoord) -> bool {
        self.is_open(c) && c.neighbors_8().iter().any(|n| self.is_unknown(*n))
    }

    pub fn frontiers(&self) -> Vec<GridCoord> {
        let mut cells: Vec<GridCoord> = self
            .cells
            .keys()
            .copied()
            .filter(|&c| self.is_frontier(c))
            .collect();
        cells.sort_unstable_by_key(|c| (c.x, c.y));
        cells
    }

    pub fn explored_count(&self) -> usize {
        self.cells.len()
    }

    pub fn obstacle_count(&self) -> usize {
        self.cells
            .values()
            .filter(|&&s| s == CellState::Obstacle)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_cell_round_trip() {
        let grid = ExplorationGrid::new(Point::new(2.3, 1.1));
        let c = grid.to_cell(Point::new(2.3, 1.1));
        assert_eq!(c, GridCoord::new(0, 0));
        assert_eq!(grid.to_world(GridCoord::new(2, -1)), Point::new(3.3, 0.6));
        assert_eq!(grid.to_cell(Point::new(3.3, 0.6)), GridCoord::new(2, -1));
    }

    #[test]
    fn traversal_marks_the_cells_under_the_segment() {
        let mut grid = ExplorationGrid::new(Point::new(0.0, 0.0));
        grid.mark_traversed(Point::new(0.0, 0.0), Point::new(2.0, 0.0));
        for x in 0..=4 {
            assert!(grid.is_open(GridCoord::new(x, 0)), "cell {x} not open");
        }
        assert!(grid.is_unknown(GridCoord::new(0, 1)));
    }

    #[test]
    fn bump_verdict_is_not_downgraded() {
        let mut grid = ExplorationGrid::new(Point::new(0.0, 0.0));
        grid.mark_obstacle(GridCoord::new(1, 0));
        grid.mark_open(GridCoord::new(1, 0));
        assert!(grid.is_obstacle(GridCoord::new(1, 0)));
    }

    #[test]
    fn frontier_needs_an_unknown_neighbor() {
        let mut grid = ExplorationGrid::new(Point::new(0.0, 0.0));
        for x in -1..=1 {
            for y in -1..=1 {
                grid.mark_open(GridCoord::new(x, y));
            }
        }
        // Center is fully surrounded by explored cells, the rim is not.
        assert!(!grid.is_frontier(GridCoord::new(0, 0)));
        assert!(grid.is_frontier(GridCoord::new(1, 0)));
        assert_eq!(grid.frontiers().len(), 8);
    }

    #[test]
    fn obstacles_are_not_frontiers() {
        let mut grid = ExplorationGrid::new(Point::new(0.0, 0.0));
        grid.mark_obstacle(GridCoord::new(0, 0));
        assert!(!grid.is_frontier(GridCoord::new(0, 0)));
    }
}
