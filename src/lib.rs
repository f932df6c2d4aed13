//! Discrete-event simulator for a swarm of bump-and-report robots mapping
//! an unknown floorplan under a central orchestrator.
//!
//! Data flow:
//!
//! ```text
//!  EventScheduler ── dispatches ──> Robots ── bump reports ──┐
//!       ^                              ^                     │
//!       │                         Wireless (lossy)           v
//!  complete_run                        ^               Orchestrator
//!       │                              │                     │
//!  MapConsolidator <── bump dots ──────┴── commands <── TargetSelector
//!       (loop closure ends the run)              └── PathPlanner (BFS/A*)
//! ```
//!
//! The orchestrator never sees true robot positions; it dead-reckons from
//! the commands it issued and the stop reports that survive the channel.
//! The run ends when the consolidated map closes into loops around the
//! start position, or when the watchdog gives up.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod exploration;
pub mod floorplan;
pub mod mapping;
pub mod orchestrator;
pub mod robot;
pub mod simulation;
pub mod telemetry;
pub mod wireless;

pub use config::SimConfig;
pub use self::core::{GridCoord, Point, SharedRng};
pub use engine::{EventScheduler, RunMode, SchedulerHandle};
pub use error::{Result, SimError};
pub use simulation::{RunReport, Simulation};
