//! The shared medium: device registry and frame delivery.

use super::frame::{Frame, NodeId};
use super::propagation::Propagation;
use crate::core::{Point, SharedRng};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type WirelessHandle = Arc<Wireless>;

/// Anything that can be reached over the medium.
pub trait WirelessDevice: Send + Sync {
    fn device_id(&self) -> NodeId;
    fn position(&self) -> Point;
    fn receive(&self, frame: &Frame);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelStats {
    pub frames_sent: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
}

pub struct Wireless {
    propagation: Propagation,
    rng: SharedRng,
    devices: RwLock<Vec<Arc<dyn WirelessDevice>>>,
    relays: Mutex<BTreeMap<NodeId, Point>>,
    stats: Mutex<ChannelStats>,
}

impl Wireless {
    pub fn new(propagation: Propagation, rng: SharedRng) -> WirelessHandle {
        Arc::new(Wireless {
            propagation,
            rng,
            devices: RwLock::new(Vec::new()),
            relays: Mutex::new(BTreeMap::new()),
            stats: Mutex::new(ChannelStats::default()),
        })
    }

    /// Register the full device set. Done once after construction, since
    /// the medium and the devices reference each other.
    pub fn register_devices(&self, devices: Vec<Arc<dyn WirelessDevice>>) {
        *self.devices.write() = devices;
    }

    /// Mark a node as a parked relay at `position`, or clear it with `None`.
    pub fn set_relay(&self, node: NodeId, position: Option<Point>) {
        let mut relays = self.relays.lock();
        match position {
            Some(p) => {
                relays.insert(node, p);
            }
            None => {
                relays.remove(&node);
            }
        }
    }

    pub fn relay_count(&self) -> usize {
        self.relays.lock().len()
    }

    /// Deliver `frame` to every other registered device, each with an
    /// independent PDR draw. Losses are silent.
    pub fn transmit(&self, frame: &Frame, sender: NodeId, sender_pos: Point) {
        let receivers: Vec<Arc<dyn WirelessDevice>> = self
            .devices
            .read()
            .iter()
            .filter(|d| d.device_id() != sender)
            .cloned()
            .collect();
        self.stats.lock().frames_sent += 1;

        let relays = self.relays.lock().clone();
        for device in receivers {
            let pdr = self.propagation.pdr(
                (sender, sender_pos),
                (device.device_id(), device.position()),
                &relays,
            );
            if self.rng.sample_unit() < pdr {
                self.stats.lock().frames_delivered += 1;
                device.receive(frame);
            } else {
                self.stats.lock().frames_dropped += 1;
                log::trace!(
                    "[Wireless] frame from {} lost on the way to {} (pdr {:.4})",
                    sender,
                    device.device_id(),
                    pdr
                );
            }
        }
    }

    pub fn stats(&self) -> ChannelStats {
        *self.stats.lock()
    }

    pub fn solver_stats(&self) -> super::relay::SolverStats {
        self.propagation.solver_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Probe {
        id: NodeId,
        at: Point,
        seen: Mutex<u32>,
    }

    impl WirelessDevice for Probe {
        fn device_id(&self) -> NodeId {
            self.id
        }
        fn position(&self) -> Point {
            self.at
        }
        fn receive(&self, _frame: &Frame) {
            *self.seen.lock() += 1;
        }
    }

    fn probe(id: NodeId, x: f64) -> Arc<Probe> {
        Arc::new(Probe {
            id,
            at: Point::new(x, 0.0),
            seen: Mutex::new(0),
        })
    }

    #[test]
    fn perfect_channel_reaches_everyone_but_the_sender() {
        let rng = SharedRng::from_seed(1);
        let medium = Wireless::new(Propagation::Perfect, rng);
        let a = probe(0, 0.0);
        let b = probe(1, 5.0);
        let c = probe(2, 9.0);
        medium.register_devices(vec![a.clone(), b.clone(), c.clone()]);

        medium.transmit(
            &Frame::Notification {
                robot_id: 1,
                seq: 0,
                ts_start: 0.0,
                ts_stop: 1.0,
                bump: None,
            },
            0,
            Point::new(0.0, 0.0),
        );

        assert_eq!(*a.seen.lock(), 0);
        assert_eq!(*b.seen.lock(), 1);
        assert_eq!(*c.seen.lock(), 1);
        let stats = medium.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.frames_delivered, 2);
        assert_eq!(stats.frames_dropped, 0);
    }

    #[test]
    fn out_of_radius_frames_drop_silently() {
        let rng = SharedRng::from_seed(1);
        let medium = Wireless::new(Propagation::Radius { radius_m: 2.0 }, rng);
        let near = probe(1, 1.0);
        let far = probe(2, 50.0);
        medium.register_devices(vec![near.clone(), far.clone()]);

        medium.transmit(
            &Frame::Command {
                orders: Default::default(),
            },
            0,
            Point::new(0.0, 0.0),
        );

        assert_eq!(*near.seen.lock(), 1);
        assert_eq!(*far.seen.lock(), 0);
        assert_eq!(medium.stats().frames_dropped, 1);
    }
}
