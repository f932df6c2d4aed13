//! Propagation models mapping transmitter/receiver geometry to a packet
//! delivery ratio.
//!
//! The empirical model is free-space path loss at 2.4 GHz with a uniform
//! random excess loss of up to 40 dB, mapped to PDR through a
//! piecewise-linear table keyed by integer RSSI bins.

use super::frame::NodeId;
use super::relay::{link_key, RelaySolver, SolverStats};
use crate::core::{Point, SharedRng};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Transmit power in dBm, antenna gains folded in.
const TX_POWER_DBM: f64 = 0.0;

/// Maximum random excess loss over free space, in dB.
const MAX_EXCESS_LOSS_DB: f64 = 40.0;

/// Free-space path loss constant for 2.4 GHz: `20 log10(f) - 147.55`.
const FSPL_CONST_DB: f64 = 40.05;

/// PDR per integer RSSI bin, linearly interpolated in between. Below the
/// first bin the PDR is 0, above the last it is 1.
const RSSI_PDR_TABLE: [(i32, f64); 19] = [
    (-97, 0.0000),
    (-96, 0.1494),
    (-95, 0.2340),
    (-94, 0.4071),
    (-93, 0.6359),
    (-92, 0.6866),
    (-91, 0.7476),
    (-90, 0.8603),
    (-89, 0.8702),
    (-88, 0.9324),
    (-87, 0.9427),
    (-86, 0.9562),
    (-85, 0.9611),
    (-84, 0.9739),
    (-83, 0.9745),
    (-82, 0.9844),
    (-81, 0.9854),
    (-80, 0.9903),
    (-79, 1.0000),
];

/// RSSI at the receiver under pure free-space loss.
pub fn free_space_rssi_dbm(distance_m: f64) -> f64 {
    // FSPL is undefined at zero distance; anything below a meter is
    // effectively at the antenna.
    let d = distance_m.max(1e-3);
    TX_POWER_DBM - (20.0 * d.log10() + FSPL_CONST_DB)
}

/// Interpolate the RSSI/PDR table. Clamped to [0, 1] by construction.
pub fn rssi_to_pdr(rssi_dbm: f64) -> f64 {
    let (first_bin, _) = RSSI_PDR_TABLE[0];
    let (last_bin, _) = RSSI_PDR_TABLE[RSSI_PDR_TABLE.len() - 1];
    if rssi_dbm <= first_bin as f64 {
        return 0.0;
    }
    if rssi_dbm >= last_bin as f64 {
        return 1.0;
    }
    let lower = rssi_dbm.floor() as i32;
    let index = (lower - first_bin) as usize;
    let (_, p_lower) = RSSI_PDR_TABLE[index];
    let (_, p_upper) = RSSI_PDR_TABLE[index + 1];
    let frac = rssi_dbm - lower as f64;
    (p_lower + (p_upper - p_lower) * frac).clamp(0.0, 1.0)
}

/// Expected link PDR without the random excess draw; feeds the relay
/// solver, which needs stable link weights.
pub fn link_pdr(distance_m: f64) -> f64 {
    rssi_to_pdr(free_space_rssi_dbm(distance_m))
}

/// Strategy for computing per-frame delivery probability.
pub enum Propagation {
    /// Every frame arrives.
    Perfect,
    /// Full delivery within the radius, nothing beyond.
    Radius { radius_m: f64 },
    /// Free-space loss plus a uniform random excess, through the PDR table.
    PisterHack { rng: SharedRng },
    /// Pister-hack links routed over the ready relays; end-to-end success
    /// from the relay solver, cached by link set.
    RelayPister { solver: Mutex<RelaySolver> },
}

impl Propagation {
    /// Delivery probability for one frame between two nodes, given the
    /// currently-ready relays. Always in [0, 1].
    pub fn pdr(
        &self,
        sender: (NodeId, Point),
        receiver: (NodeId, Point),
        relays: &BTreeMap<NodeId, Point>,
    ) -> f64 {
        let distance = sender.1.distance(&receiver.1);
        match self {
            Propagation::Perfect => 1.0,
            Propagation::Radius { radius_m } => {
                if distance <= *radius_m {
                    1.0
                } else {
                    0.0
                }
            }
            Propagation::PisterHack { rng } => {
                let excess = rng.sample_range(0.0, MAX_EXCESS_LOSS_DB);
                rssi_to_pdr(free_space_rssi_dbm(distance) - excess)
            }
            Propagation::RelayPister { solver } => {
                relay_pdr(solver, sender, receiver, relays)
            }
        }
    }

    /// Relay-solver cache statistics, zero for the memoryless models.
    pub fn solver_stats(&self) -> SolverStats {
        match self {
            Propagation::RelayPister { solver } => solver.lock().stats(),
            _ => SolverStats::default(),
        }
    }
}

/// End-to-end PDR through the relay mesh. The node set is the two
/// endpoints plus every ready relay; pairwise links use the deterministic
/// Pister-hack PDR.
fn relay_pdr(
    solver: &Mutex<RelaySolver>,
    sender: (NodeId, Point),
    receiver: (NodeId, Point),
    relays: &BTreeMap<NodeId, Point>,
) -> f64 {
    let mut nodes: BTreeMap<NodeId, Point> = relays.clone();
    nodes.insert(sender.0, sender.1);
    nodes.insert(receiver.0, receiver.1);

    let mut links: BTreeMap<(NodeId, NodeId), f64> = BTreeMap::new();
    let ids: Vec<NodeId> = nodes.keys().copied().collect();
    for (i, &a) in ids.iter().enumerate() {
        for &b in &ids[i + 1..] {
            links.insert(link_key(a, b), link_pdr(nodes[&a].distance(&nodes[&b])));
        }
    }

    // The mesh is rooted at the sender; delivery succeeds if any branch
    // reaches the receiver.
    let success = solver.lock().solve(sender.0, &links);
    success.get(&receiver.0).copied().unwrap_or(0.0).clamp(0.0, 1.0)
}
