//! Grid path planning, breadth-first or A*.
//!
//! Both searches move over explored open cells with 8-connectivity and
//! agree on reachability; A* additionally minimizes metric cost with unit
//! and `sqrt(2)` steps. The returned path excludes the start cell and ends
//! on the target. The target cell itself is admissible even while still
//! unknown, which is exactly the frontier-chasing case.

use super::grid::ExplorationGrid;
use crate::core::GridCoord;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

const SQRT_2: f64 = std::f64::consts::SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAlgorithm {
    Bfs,
    AStar,
}

/// Why no path was produced. Both are normal outcomes of exploration, not
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFailure {
    TargetIsObstacle,
    TargetUnreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub path: Vec<GridCoord>,
    pub cost: f64,
    pub nodes_expanded: usize,
}

/// Plan from `start` to `target` over the explored open cells.
pub fn plan_path(
    grid: &ExplorationGrid,
    start: GridCoord,
    target: GridCoord,
    algorithm: SearchAlgorithm,
) -> Result<PathResult, PathFailure> {
    if grid.is_obstacle(target) {
        return Err(PathFailure::TargetIsObstacle);
    }
    if start == target {
        return Ok(PathResult {
            path: Vec::new(),
            cost: 0.0,
            nodes_expanded: 0,
        });
    }
    match algorithm {
        SearchAlgorithm::Bfs => bfs(grid, start, target),
        SearchAlgorithm::AStar => astar(grid, start, target),
    }
}

/// A cell may be stepped onto if it is explored open, or if it is the
/// target itself. The start is exempt so a robot standing on a cell the
/// map later declared an obstacle can still plan its way out.
#[inline]
fn traversable(grid: &ExplorationGrid, cell: GridCoord, target: GridCoord) -> bool {
    cell == target || grid.is_open(cell)
}

fn step_cost(from: GridCoord, to: GridCoord) -> f64 {
    if from.x != to.x && from.y != to.y {
        SQRT_2
    } else {
        1.0
    }
}

fn reconstruct(
    came_from: &HashMap<GridCoord, GridCoord>,
    start: GridCoord,
    target: GridCoord,
) -> Vec<GridCoord> {
    let mut path = vec![target];
    let mut cursor = target;
    while let Some(&previous) = came_from.get(&cursor) {
        if previous == start {
            break;
        }
        path.push(previous);
        cursor = previous;
    }
    path.reverse();
    path
}

fn bfs(
    grid: &ExplorationGrid,
    start: GridCoord,
    target: GridCoord,
) -> Result<PathResult, PathFailure> {
    let mut queue = VecDeque::new();
    let mut came_from: HashMap<GridCoord, GridCoord> = HashMap::new();
    let mut expanded = 0;
    queue.push_back(start);
    came_from.insert(start, start);

    while let Some(cell) = queue.pop_front() {
        expanded += 1;
        for neighbor in cell.neighbors_8() {
            if came_from.contains_key(&neighbor) || !traversable(grid, neighbor, target) {
                continue;
            }
            came_from.insert(neighbor, cell);
            if neighbor == target {
                let path = reconstruct(&came_from, start, target);
                let cost = std::iter::once(start)
                    .chain(path.iter().copied())
                    .collect::<Vec<_>>()
                    .windows(2)
                    .map(|w| step_cost(w[0], w[1]))
                    .sum();
                return Ok(PathResult {
                    path,
                    cost,
                    nodes_expanded: expanded,
                });
            }
            queue.push_back(neighbor);
        }
    }
    Err(PathFailure::TargetUnreachable)
}

/// Heap entry ordered for a min-heap on `f`, ties broken toward the lower
/// heuristic.
struct OpenNode {
    cell: GridCoord,
    f: f64,
    g: f64,
    h: f64,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for OpenNode {}
impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .f
            .total_cmp(&self.f)
            .then(other.h.total_cmp(&self.h))
    }
}

fn astar(
    grid: &ExplorationGrid,
    start: GridCoord,
    target: GridCoord,
) -> Result<PathResult, PathFailure> {
    let mut open = BinaryHeap::new();
    let mut g_score: HashMap<GridCoord, f64> = HashMap::new();
    let mut came_from: HashMap<GridCoord, GridCoord> = HashMap::new();
    let mut expanded = 0;

    g_score.insert(start, 0.0);
    open.push(OpenNode {
        cell: start,
        f: start.euclidean(&target),
        g: 0.0,
        h: start.euclidean(&target),
    });

    while let Some(node) = open.pop() {
        // A stale entry; a cheaper route to this cell was found after it
        // was pushed.
        if node.g > g_score.get(&node.cell).copied().unwrap_or(f64::INFINITY) {
            continue;
        }
        if node.cell == target {
            let path = reconstruct(&came_from, start, target);
            return Ok(PathResult {
                path,
                cost: node.g,
                nodes_expanded: expanded,
            });
        }
        expanded += 1;

        for neighbor in node.cell.neighbors_8() {
            if !traversable(grid, neighbor, target) {
                continue;
            }
            let tentative = node.g + step_cost(node.cell, neighbor);
            let known = g_score.get(&neighbor).copied().unwrap_or(f64::INFINITY);
            // Strictly better routes re-open the cell even if it was
            // already expanded.
            if tentative < known {
                g_score.insert(neighbor, tentative);
                came_from.insert(neighbor, node.cell);
                let h = neighbor.euclidean(&target);
                open.push(OpenNode {
                    cell: neighbor,
                    f: tentative + h,
                    g: tentative,
                    h,
                });
            }
        }
    }
    Err(PathFailure::TargetUnreachable)
}
