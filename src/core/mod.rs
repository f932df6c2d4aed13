//! Shared geometry primitives and the simulation RNG.

pub mod point;
pub mod rng;

pub use point::{GridCoord, Point};
pub use rng::SharedRng;

/// Smallest map feature the consolidator resolves, in meters.
pub const MIN_FEATURE_SIZE_M: f64 = 1.0;

/// Occupancy-grid cell size: half the minimum feature size.
pub const HALF_CELL_M: f64 = MIN_FEATURE_SIZE_M / 2.0;
