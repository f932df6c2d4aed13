//! Occupancy grid, frontier target selection and path planning.

pub mod grid;
pub mod planning;
pub mod targets;

pub use grid::{CellState, ExplorationGrid};
pub use planning::{plan_path, PathFailure, PathResult, SearchAlgorithm};
pub use targets::{AllocationPolicy, NavigationStrategy, TargetSelector};
