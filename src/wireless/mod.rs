//! Lossy wireless channel between the orchestrator and the robots.
//!
//! The medium delivers each frame to every registered device independently,
//! with a per-receiver delivery probability taken from the active
//! propagation model. Undelivered frames vanish silently; loss is normal
//! operation, recovered by retransmission and periodic re-broadcast at the
//! endpoints.

pub mod frame;
pub mod medium;
pub mod propagation;
pub mod relay;

pub use frame::{Frame, MovementOrder, NodeId, ORCHESTRATOR_ID};
pub use medium::{ChannelStats, Wireless, WirelessDevice, WirelessHandle};
pub use propagation::Propagation;
pub use relay::RelaySolver;
