//! Discrete-event execution engine.

pub mod scheduler;

pub use scheduler::{EventScheduler, RunMode, SchedulerHandle};
