//! Simulated robot.
//!
//! A robot only ever moves in a straight line at the commanded speed. It
//! knows its own true position; the orchestrator works purely from dead
//! reckoning and bump reports. Commands arrive over the lossy channel and
//! are deduplicated by sequence number; a stop report is retransmitted
//! until the next command supersedes it.

use crate::core::Point;
use crate::engine::SchedulerHandle;
use crate::floorplan::Floorplan;
use crate::wireless::{Frame, MovementOrder, NodeId, WirelessDevice, WirelessHandle};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub type RobotHandle = Arc<SimRobot>;

/// How long after a stop report to resend it, in simulated seconds.
const RETRANSMIT_PERIOD_S: f64 = 1.0;

struct RobotState {
    position: Point,
    heading_deg: f64,
    speed: f64,
    moving: bool,
    ts_start: f64,
    last_command_seq: Option<u32>,
    notification_seq: u32,
    last_notification: Option<Frame>,
}

pub struct SimRobot {
    id: NodeId,
    weak: Weak<SimRobot>,
    engine: SchedulerHandle,
    wireless: WirelessHandle,
    floorplan: Arc<Floorplan>,
    state: Mutex<RobotState>,
}

impl SimRobot {
    pub fn new(
        id: NodeId,
        engine: SchedulerHandle,
        wireless: WirelessHandle,
        floorplan: Arc<Floorplan>,
    ) -> RobotHandle {
        let start = floorplan.start;
        Arc::new_cyclic(|weak| SimRobot {
            id,
            weak: weak.clone(),
            engine,
            wireless,
            floorplan,
            state: Mutex::new(RobotState {
                position: start,
                heading_deg: 0.0,
                speed: 0.0,
                moving: false,
                ts_start: 0.0,
                last_command_seq: None,
                notification_seq: 0,
                last_notification: None,
            }),
        })
    }

    /// True position right now, extrapolated while in motion.
    pub fn true_position(&self) -> Point {
        let state = self.state.lock();
        if state.moving {
            let elapsed = self.engine.current_time() - state.ts_start;
            state
                .position
                .advanced(state.heading_deg, state.speed, elapsed)
        } else {
            state.position
        }
    }

    fn stop_tag(&self) -> String {
        format!("robot-{}-stop", self.id)
    }

    fn retransmit_tag(&self) -> String {
        format!("robot-{}-retransmit", self.id)
    }

    fn handle_command(&self, order: MovementOrder) {
        let now = self.engine.current_time();
        let mut state = self.state.lock();
        if state.last_command_seq == Some(order.seq) {
            return;
        }
        log::debug!(
            "[Robot {}] command seq={} heading={:.1} timeout={:?}",
            self.id,
            order.seq,
            order.heading_deg,
            order.timeout_s
        );
        state.last_command_seq = Some(order.seq);
        // The new command supersedes any pending stop and retransmission.
        self.engine.cancel(&self.stop_tag());
        self.engine.cancel(&self.retransmit_tag());
        state.last_notification = None;

        if state.moving {
            let elapsed = now - state.ts_start;
            state.position = state
                .position
                .advanced(state.heading_deg, state.speed, elapsed);
        }
        state.heading_deg = order.heading_deg;
        state.speed = order.speed;
        state.ts_start = now;
        state.moving = order.speed > 0.0;
        if !state.moving {
            return;
        }

        let (bump_point, distance) = self
            .floorplan
            .next_bump(state.position, state.heading_deg);
        let bump_in = distance / state.speed;
        let (stop_in, bumped) = match order.timeout_s {
            Some(timeout) if timeout < bump_in => (timeout, false),
            _ => (bump_in, true),
        };
        drop(state);

        if let Some(this) = self.weak.upgrade() {
            let scheduled = self.engine.schedule(
                now + stop_in,
                Some(&self.stop_tag()),
                move || this.stop(bumped, bump_point),
            );
            if let Err(e) = scheduled {
                log::error!("[Robot {}] failed to schedule stop: {}", self.id, e);
            }
        }
    }

    fn stop(&self, bumped: bool, bump_point: Point) {
        let now = self.engine.current_time();
        let frame = {
            let mut state = self.state.lock();
            if !state.moving {
                return;
            }
            let stop_position = if bumped {
                bump_point
            } else {
                let elapsed = now - state.ts_start;
                state
                    .position
                    .advanced(state.heading_deg, state.speed, elapsed)
            };
            state.position = stop_position;
            state.moving = false;
            state.speed = 0.0;
            let seq = state.notification_seq;
            state.notification_seq += 1;
            let frame = Frame::Notification {
                robot_id: self.id,
                seq,
                ts_start: state.ts_start,
                ts_stop: now,
                bump: bumped.then_some(stop_position),
            };
            state.last_notification = Some(frame.clone());
            frame
        };
        log::debug!(
            "[Robot {}] stopped at {:.3}s, bumped={}",
            self.id,
            now,
            bumped
        );
        let position = self.state.lock().position;
        self.wireless.transmit(&frame, self.id, position);
        self.arm_retransmit(now);
    }

    fn retransmit(&self) {
        let (frame, position) = {
            let state = self.state.lock();
            match &state.last_notification {
                Some(frame) => (frame.clone(), state.position),
                None => return,
            }
        };
        log::trace!("[Robot {}] retransmitting stop report", self.id);
        self.wireless.transmit(&frame, self.id, position);
        self.arm_retransmit(self.engine.current_time());
    }

    fn arm_retransmit(&self, now: f64) {
        if let Some(this) = self.weak.upgrade() {
            let scheduled = self.engine.schedule(
                now + RETRANSMIT_PERIOD_S,
                Some(&self.retransmit_tag()),
                move || this.retransmit(),
            );
            if let Err(e) = scheduled {
                log::error!("[Robot {}] failed to arm retransmit: {}", self.id, e);
            }
        }
    }
}

impl WirelessDevice for SimRobot {
    fn device_id(&self) -> NodeId {
        self.id
    }

    fn position(&self) -> Point {
        self.true_position()
    }

    fn receive(&self, frame: &Frame) {
        if let Frame::Command { orders } = frame {
            if let Some(order) = orders.get(&self.id) {
                self.handle_command(*order);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SharedRng;
    use crate::engine::EventScheduler;
    use crate::floorplan::BUILTIN_OFFICE;
    use crate::wireless::{Propagation, Wireless, ORCHESTRATOR_ID};
    use std::collections::BTreeMap;

    struct Sink {
        frames: Mutex<Vec<Frame>>,
    }

    impl WirelessDevice for Sink {
        fn device_id(&self) -> NodeId {
            ORCHESTRATOR_ID
        }
        fn position(&self) -> Point {
            Point::new(0.0, 0.0)
        }
        fn receive(&self, frame: &Frame) {
            self.frames.lock().push(frame.clone());
        }
    }

    fn world() -> (SchedulerHandle, WirelessHandle, RobotHandle, Arc<Sink>) {
        let engine = EventScheduler::new();
        let wireless = Wireless::new(Propagation::Perfect, SharedRng::from_seed(5));
        let plan = Arc::new(Floorplan::parse(BUILTIN_OFFICE).unwrap());
        let robot = SimRobot::new(1, Arc::clone(&engine), Arc::clone(&wireless), plan);
        let sink = Arc::new(Sink {
            frames: Mutex::new(Vec::new()),
        });
        wireless.register_devices(vec![robot.clone(), sink.clone()]);
        (engine, wireless, robot, sink)
    }

    fn command(seq: u32, heading: f64, timeout: Option<f64>) -> Frame {
        let mut orders = BTreeMap::new();
        orders.insert(
            1,
            MovementOrder {
                seq,
                heading_deg: heading,
                speed: 1.0,
                timeout_s: timeout,
            },
        );
        Frame::Command { orders }
    }

    #[test]
    fn ballistic_command_ends_in_a_bump_report() {
        let (engine, _wireless, robot, sink) = world();
        robot.receive(&command(0, 90.0, None));
        let e = Arc::clone(&engine);
        engine.schedule(10.0, None, move || e.complete_run()).unwrap();
        engine.command_fastforward();
        engine.run();

        // Start (6.5, 2.5) heading east, wall face at x=13: bump at 6.5s.
        let frames = sink.frames.lock();
        let Some(Frame::Notification { ts_stop, bump, .. }) = frames.first() else {
            panic!("no notification received");
        };
        assert_eq!(*ts_stop, 6.5);
        assert_eq!(*bump, Some(Point::new(13.0, 2.5)));
        assert_eq!(robot.true_position(), Point::new(13.0, 2.5));
    }

    #[test]
    fn timeout_stop_reports_no_bump() {
        let (engine, _wireless, robot, sink) = world();
        robot.receive(&command(0, 90.0, Some(2.0)));
        let e = Arc::clone(&engine);
        engine.schedule(5.0, None, move || e.complete_run()).unwrap();
        engine.command_fastforward();
        engine.run();

        let frames = sink.frames.lock();
        let Some(Frame::Notification { bump, ts_stop, .. }) = frames.first() else {
            panic!("no notification received");
        };
        assert!(bump.is_none());
        assert_eq!(*ts_stop, 2.0);
        assert_eq!(robot.true_position(), Point::new(8.5, 2.5));
    }

    #[test]
    fn duplicate_commands_are_ignored() {
        let (engine, _wireless, robot, sink) = world();
        robot.receive(&command(0, 90.0, Some(1.0)));
        robot.receive(&command(0, 90.0, Some(1.0)));
        let e = Arc::clone(&engine);
        engine.schedule(1.5, None, move || e.complete_run()).unwrap();
        engine.command_fastforward();
        engine.run();
        // One movement, one stop report.
        assert_eq!(sink.frames.lock().len(), 1);
    }

    #[test]
    fn stop_report_is_retransmitted_until_the_next_command() {
        let (engine, _wireless, robot, sink) = world();
        robot.receive(&command(0, 90.0, Some(1.0)));
        {
            let robot = robot.clone();
            engine
                .schedule(4.25, None, move || {
                    robot.receive(&command(1, 270.0, Some(1.0)));
                })
                .unwrap();
        }
        let e = Arc::clone(&engine);
        engine.schedule(4.5, None, move || e.complete_run()).unwrap();
        engine.command_fastforward();
        engine.run();

        // Stop at 1.0s, retransmissions at 2.0s, 3.0s and 4.0s; the 4.25s
        // command cancels the rest.
        let count = sink
            .frames
            .lock()
            .iter()
            .filter(|f| matches!(f, Frame::Notification { seq: 0, .. }))
            .count();
        assert_eq!(count, 4);
    }
}
