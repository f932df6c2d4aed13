//! Frontier target allocation.
//!
//! One selector serves the whole swarm so no two robots chase the same
//! frontier. An allocated cell stays out of circulation until it is
//! released (reached, replanned) or declared unreachable; unreachable
//! cells stay blocked for the rest of the run.

use super::grid::ExplorationGrid;
use crate::core::{GridCoord, SharedRng};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// Rank all frontiers by distance to the start position; the swarm
    /// sweeps outward together.
    #[default]
    GlobalFrontier,
    /// Frontier nearest to the requesting robot.
    NearestToRobot,
}

/// How the orchestrator picks the next movement for a stopped robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStrategy {
    /// A uniformly random heading after every stop, driven until the next
    /// bump. No targets, no planning.
    Ballistic,
    /// Frontier-driven: allocate a frontier cell and plan a path to it.
    Frontier { policy: AllocationPolicy },
}

impl Default for NavigationStrategy {
    fn default() -> Self {
        NavigationStrategy::Frontier {
            policy: AllocationPolicy::default(),
        }
    }
}

pub struct TargetSelector {
    policy: AllocationPolicy,
    rng: SharedRng,
    allocated: HashSet<GridCoord>,
    unreachable: HashSet<GridCoord>,
}

impl TargetSelector {
    pub fn new(policy: AllocationPolicy, rng: SharedRng) -> Self {
        TargetSelector {
            policy,
            rng,
            allocated: HashSet::new(),
            unreachable: HashSet::new(),
        }
    }

    /// Hand out a frontier target for a robot standing at `robot_cell`.
    pub fn allocate(&mut self, grid: &ExplorationGrid, robot_cell: GridCoord) -> Option<GridCoord> {
        let origin = GridCoord::new(0, 0);
        let anchor = match self.policy {
            AllocationPolicy::GlobalFrontier => origin,
            AllocationPolicy::NearestToRobot => robot_cell,
        };
        let target = grid
            .frontiers()
            .into_iter()
            .filter(|c| !self.allocated.contains(c) && !self.unreachable.contains(c))
            .min_by(|a, b| {
                anchor
                    .euclidean(a)
                    .total_cmp(&anchor.euclidean(b))
                    .then_with(|| (a.x, a.y).cmp(&(b.x, b.y)))
            })?;
        self.allocated.insert(target);
        Some(target)
    }

    /// First movement with an empty map: a uniform pick among unknown
    /// cells on the smallest non-empty hop ring around the start.
    pub fn initial_target(&mut self, grid: &ExplorationGrid, max_radius: i32) -> Option<GridCoord> {
        for radius in 1..=max_radius {
            let candidates = ring(radius)
                .into_iter()
                .filter(|c| {
                    grid.is_unknown(*c)
                        && !self.allocated.contains(c)
                        && !self.unreachable.contains(c)
                })
                .collect::<Vec<_>>();
            if !candidates.is_empty() {
                let pick = candidates[self.rng.pick_index(candidates.len())];
                self.allocated.insert(pick);
                return Some(pick);
            }
        }
        None
    }

    /// Put a target back into circulation.
    pub fn release(&mut self, cell: GridCoord) {
        self.allocated.remove(&cell);
    }

    /// No path led to this target; keep it out of circulation for good.
    pub fn mark_unreachable(&mut self, cell: GridCoord) {
        self.allocated.remove(&cell);
        self.unreachable.insert(cell);
        log::debug!("[Targets] cell ({}, {}) unreachable", cell.x, cell.y);
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }
}

/// Cells at exactly `radius` hops (Chebyshev ring) around the origin.
fn ring(radius: i32) -> Vec<GridCoord> {
    let mut cells = Vec::new();
    for x in -radius..=radius {
        for y in -radius..=radius {
            if x.abs().max(y.abs()) == radius {
                cells.push(GridCoord::new(x, y));
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Point;

    fn selector(policy: AllocationPolicy) -> TargetSelector {
        TargetSelector::new(policy, SharedRng::from_seed(9))
    }

    fn grid_with_open_row() -> ExplorationGrid {
        let mut grid = ExplorationGrid::new(Point::new(0.0, 0.0));
        for x in 0..=6 {
            grid.mark_open(GridCoord::new(x, 0));
        }
        grid
    }

    #[test]
    fn global_policy_prefers_frontiers_near_the_start() {
        let grid = grid_with_open_row();
        let mut sel = selector(AllocationPolicy::GlobalFrontier);
        let first = sel.allocate(&grid, GridCoord::new(6, 0)).unwrap();
        // Every row cell is a frontier; nearest to the origin wins even
        // though the robot sits at the far end.
        assert_eq!(first, GridCoord::new(0, 0));
    }

    #[test]
    fn nearest_policy_follows_the_robot() {
        let grid = grid_with_open_row();
        let mut sel = selector(AllocationPolicy::NearestToRobot);
        let first = sel.allocate(&grid, GridCoord::new(6, 0)).unwrap();
        assert_eq!(first, GridCoord::new(6, 0));
    }

    #[test]
    fn allocated_targets_are_not_reissued_until_released() {
        let grid = grid_with_open_row();
        let mut sel = selector(AllocationPolicy::GlobalFrontier);
        let first = sel.allocate(&grid, GridCoord::new(0, 0)).unwrap();
        let second = sel.allocate(&grid, GridCoord::new(0, 0)).unwrap();
        assert_ne!(first, second);
        sel.release(first);
        let third = sel.allocate(&grid, GridCoord::new(0, 0)).unwrap();
        assert_eq!(third, first);
    }

    #[test]
    fn unreachable_targets_stay_blocked() {
        let grid = grid_with_open_row();
        let mut sel = selector(AllocationPolicy::GlobalFrontier);
        let first = sel.allocate(&grid, GridCoord::new(0, 0)).unwrap();
        sel.mark_unreachable(first);
        let next = sel.allocate(&grid, GridCoord::new(0, 0)).unwrap();
        assert_ne!(next, first);
    }

    #[test]
    fn initial_target_picks_from_the_smallest_ring() {
        let mut grid = ExplorationGrid::new(Point::new(0.0, 0.0));
        let mut sel = selector(AllocationPolicy::GlobalFrontier);
        // Entire 1-ring known: picks must come from the 2-ring.
        grid.mark_open(GridCoord::new(0, 0));
        for n in GridCoord::new(0, 0).neighbors_8() {
            grid.mark_open(n);
        }
        let pick = sel.initial_target(&grid, 50).unwrap();
        assert_eq!(pick.chebyshev(&GridCoord::new(0, 0)), 2);
    }

    #[test]
    fn empty_ring_search_gives_up_at_the_radius_limit() {
        let mut grid = ExplorationGrid::new(Point::new(0.0, 0.0));
        for x in -3..=3 {
            for y in -3..=3 {
                grid.mark_open(GridCoord::new(x, y));
            }
        }
        let mut sel = selector(AllocationPolicy::GlobalFrontier);
        assert!(sel.initial_target(&grid, 3).is_none());
    }
}
