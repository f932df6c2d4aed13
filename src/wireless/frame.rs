//! Frames exchanged over the wireless medium.

use crate::core::Point;
use serde::Serialize;
use std::collections::BTreeMap;

/// Wireless node identity. The orchestrator is node 0, robots are 1..=n.
pub type NodeId = u32;

pub const ORCHESTRATOR_ID: NodeId = 0;

/// One commanded movement, repeated in every downstream broadcast until
/// superseded. Robots deduplicate by `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MovementOrder {
    pub seq: u32,
    pub heading_deg: f64,
    pub speed: f64,
    /// Stop after this long even without a bump; `None` means ballistic
    /// until the next obstacle.
    pub timeout_s: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum Frame {
    /// Downstream broadcast: current movement order for every robot.
    Command { orders: BTreeMap<NodeId, MovementOrder> },
    /// Upstream report: a robot stopped, with the bump position when the
    /// stop was caused by an obstacle.
    Notification {
        robot_id: NodeId,
        seq: u32,
        ts_start: f64,
        ts_stop: f64,
        bump: Option<Point>,
    },
}
