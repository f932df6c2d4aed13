//! Map reconstruction from bump reports.

pub mod consolidator;

pub use consolidator::{MapConsolidator, MapHandle, MapSnapshot};
