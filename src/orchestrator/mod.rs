//! Central controller: tracks every robot by dead reckoning, turns bump
//! reports into map dots and explored cells, allocates frontier targets
//! and broadcasts movement commands downstream.
//!
//! The orchestrator never sees true robot positions. Everything it knows
//! comes from the commands it issued and the stop reports it received.

use crate::core::{GridCoord, Point, SharedRng};
use crate::engine::SchedulerHandle;
use crate::exploration::{
    plan_path, AllocationPolicy, ExplorationGrid, NavigationStrategy, PathFailure,
    SearchAlgorithm, TargetSelector,
};
use crate::mapping::{MapHandle, MapSnapshot};
use crate::telemetry::DataCollector;
use crate::wireless::{
    Frame, MovementOrder, NodeId, WirelessDevice, WirelessHandle, ORCHESTRATOR_ID,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

pub type OrchestratorHandle = Arc<Orchestrator>;

/// Commanded cruise speed, m/s.
const ROBOT_SPEED_MPS: f64 = 1.0;

/// Target/plan attempts per movement computation before giving up until
/// the next notification.
const MAX_PLAN_ATTEMPTS: usize = 8;

/// Radius limit for the first-movement ring search, in cells.
const INITIAL_RING_LIMIT: i32 = 200;

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct OrchestratorStats {
    pub notifications: u64,
    pub duplicate_notifications: u64,
    pub bumps: u64,
    pub commands_sent: u64,
    pub targets_abandoned: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RobotSummary {
    pub id: NodeId,
    pub position: Point,
    pub heading_deg: f64,
    pub moving: bool,
    pub target: Option<Point>,
    pub parked_relay: bool,
}

/// Pull-only snapshot for UIs and statistics collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorView {
    pub robots: Vec<RobotSummary>,
    pub map: MapSnapshot,
    pub explored_cells: usize,
    pub obstacle_cells: usize,
    pub stats: OrchestratorStats,
}

struct RobotView {
    order: Option<MovementOrder>,
    position: Point,
    heading_deg: f64,
    moving: bool,
    last_notification_seq: Option<u32>,
    next_command_seq: u32,
    target: Option<GridCoord>,
    relay_candidate: bool,
    parked_relay: bool,
}

impl RobotView {
    fn new(start: Point, relay_candidate: bool) -> RobotView {
        RobotView {
            order: None,
            position: start,
            heading_deg: 0.0,
            moving: false,
            last_notification_seq: None,
            next_command_seq: 0,
            target: None,
            relay_candidate,
            parked_relay: false,
        }
    }
}

struct Inner {
    robots: BTreeMap<NodeId, RobotView>,
    grid: ExplorationGrid,
    navigation: NavigationStrategy,
    selector: TargetSelector,
    rng: SharedRng,
    stats: OrchestratorStats,
}

pub struct Orchestrator {
    weak: Weak<Orchestrator>,
    engine: SchedulerHandle,
    wireless: WirelessHandle,
    map: MapHandle,
    start: Point,
    search: SearchAlgorithm,
    downstream_period_s: f64,
    collector: Option<Arc<DataCollector>>,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: SchedulerHandle,
        wireless: WirelessHandle,
        map: MapHandle,
        start: Point,
        robot_ids: &[NodeId],
        navigation: NavigationStrategy,
        search: SearchAlgorithm,
        downstream_period_s: f64,
        relay_ratio: f64,
        rng: SharedRng,
        collector: Option<Arc<DataCollector>>,
    ) -> OrchestratorHandle {
        let relay_count = (robot_ids.len() as f64 * relay_ratio).floor() as usize;
        let robots = robot_ids
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, RobotView::new(start, index < relay_count)))
            .collect();
        Arc::new_cyclic(|weak| Orchestrator {
            weak: weak.clone(),
            engine,
            wireless,
            map,
            start,
            search,
            downstream_period_s,
            collector,
            inner: Mutex::new(Inner {
                robots,
                grid: ExplorationGrid::new(start),
                navigation,
                selector: TargetSelector::new(
                    match navigation {
                        NavigationStrategy::Frontier { policy } => policy,
                        NavigationStrategy::Ballistic => AllocationPolicy::default(),
                    },
                    rng.clone(),
                ),
                rng,
                stats: OrchestratorStats::default(),
            }),
        })
    }

    /// Hand out first movements and arm the downstream broadcast.
    pub fn start(&self) {
        {
            let mut inner = self.inner.lock();
            let ids: Vec<NodeId> = inner.robots.keys().copied().collect();
            for id in ids {
                inner.assign_movement(id, self.search);
            }
        }
        let now = self.engine.current_time();
        if let Some(this) = self.weak.upgrade() {
            let scheduled = self
                .engine
                .schedule(now, Some("orch-downstream"), move || this.downstream());
            if let Err(e) = scheduled {
                log::error!("[Orchestrator] failed to arm downstream: {}", e);
            }
        }
    }

    /// Periodic downstream broadcast, re-armed from its own callback.
    fn downstream(&self) {
        let frame = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.stats.commands_sent += 1;
            // Idle robots get another chance as the map evolves.
            let idle: Vec<NodeId> = inner
                .robots
                .iter()
                .filter(|(_, view)| view.order.is_none() && !view.parked_relay)
                .map(|(&id, _)| id)
                .collect();
            for id in idle {
                inner.assign_movement(id, self.search);
            }
            Frame::Command {
                orders: inner
                    .robots
                    .iter()
                    .filter_map(|(&id, view)| view.order.map(|order| (id, order)))
                    .collect(),
            }
        };
        self.wireless.transmit(&frame, ORCHESTRATOR_ID, self.start);

        let now = self.engine.current_time();
        if let Some(this) = self.weak.upgrade() {
            let scheduled = self.engine.schedule(
                now + self.downstream_period_s,
                Some("orch-downstream"),
                move || this.downstream(),
            );
            if let Err(e) = scheduled {
                log::error!("[Orchestrator] failed to re-arm downstream: {}", e);
            }
        }
    }

    fn handle_notification(
        &self,
        robot_id: NodeId,
        seq: u32,
        ts_start: f64,
        ts_stop: f64,
        bump: Option<Point>,
    ) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(view) = inner.robots.get_mut(&robot_id) else {
            log::warn!("[Orchestrator] notification from unknown robot {}", robot_id);
            return;
        };
        if view.last_notification_seq == Some(seq) {
            inner.stats.duplicate_notifications += 1;
            return;
        }
        view.last_notification_seq = Some(seq);

        // Where dead reckoning puts the robot after this movement.
        let elapsed = ts_stop - ts_start;
        let estimated = view
            .position
            .advanced(view.heading_deg, ROBOT_SPEED_MPS, elapsed);
        let stop_position = bump.unwrap_or(estimated);
        let from = view.position;
        view.position = stop_position;
        view.moving = false;
        let released = view.target.take();
        let candidate_ready = view.relay_candidate && !view.parked_relay && bump.is_none();
        if candidate_ready {
            view.parked_relay = true;
            view.order = None;
        }

        inner.stats.notifications += 1;
        inner.grid.mark_traversed(from, stop_position);
        if let Some(bump_point) = bump {
            inner.stats.bumps += 1;
            let cell = inner.grid.to_cell(bump_point);
            inner.grid.mark_obstacle(cell);
        }
        if let Some(target) = released {
            inner.selector.release(target);
        }
        if !candidate_ready {
            inner.assign_movement(robot_id, self.search);
        }
        drop(guard);

        if let Some(bump_point) = bump {
            self.map.notify_bump(bump_point);
            if let Some(collector) = &self.collector {
                collector.record(
                    ts_stop,
                    "bump",
                    json!({"robot": robot_id, "x": bump_point.x, "y": bump_point.y}),
                );
            }
        }
        if candidate_ready {
            log::info!(
                "[Orchestrator] robot {} parked as relay at ({:.2}, {:.2})",
                robot_id,
                stop_position.x,
                stop_position.y
            );
            self.wireless.set_relay(robot_id, Some(stop_position));
        }
    }

    pub fn view(&self) -> OrchestratorView {
        let inner = self.inner.lock();
        OrchestratorView {
            robots: inner
                .robots
                .iter()
                .map(|(&id, view)| RobotSummary {
                    id,
                    position: view.position,
                    heading_deg: view.heading_deg,
                    moving: view.moving,
                    target: view.target.map(|c| inner.grid.to_world(c)),
                    parked_relay: view.parked_relay,
                })
                .collect(),
            map: self.map.snapshot(),
            explored_cells: inner.grid.explored_count(),
            obstacle_cells: inner.grid.obstacle_count(),
            stats: inner.stats,
        }
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.inner.lock().stats
    }
}

impl Inner {
    /// Store the movement order the next broadcast will carry for
    /// `robot_id`, according to the active navigation strategy.
    fn assign_movement(&mut self, robot_id: NodeId, search: SearchAlgorithm) {
        match self.navigation {
            NavigationStrategy::Ballistic => self.assign_ballistic(robot_id),
            NavigationStrategy::Frontier { .. } => self.assign_frontier(robot_id, search),
        }
    }

    /// A fresh random heading, driven until the next bump. Targets and
    /// planning do not apply.
    fn assign_ballistic(&mut self, robot_id: NodeId) {
        let heading_deg = self.rng.sample_range(0.0, 360.0);
        let Some(view) = self.robots.get_mut(&robot_id) else {
            return;
        };
        let seq = view.next_command_seq;
        view.next_command_seq += 1;
        view.order = Some(MovementOrder {
            seq,
            heading_deg,
            speed: ROBOT_SPEED_MPS,
            timeout_s: None,
        });
        view.heading_deg = heading_deg;
        view.moving = true;
        view.target = None;
        log::debug!(
            "[Orchestrator] robot {} ballistic heading {:.1}",
            robot_id,
            heading_deg
        );
    }

    /// Pick a frontier target for `robot_id`, plan to it, and store the
    /// resulting order. Falls back through several targets before leaving
    /// the robot idle until the next notification.
    fn assign_frontier(&mut self, robot_id: NodeId, search: SearchAlgorithm) {
        let Some(view) = self.robots.get(&robot_id) else {
            return;
        };
        let position = view.position;
        let robot_cell = self.grid.to_cell(position);

        // Targets skipped this pass stay allocated until the end so the
        // selector cannot hand them straight back.
        let mut skipped: Vec<GridCoord> = Vec::new();
        let mut chosen: Option<(GridCoord, f64, f64)> = None;
        for _ in 0..MAX_PLAN_ATTEMPTS {
            let target = self
                .selector
                .allocate(&self.grid, robot_cell)
                .or_else(|| self.selector.initial_target(&self.grid, INITIAL_RING_LIMIT));
            let Some(target) = target else {
                break;
            };
            if target == robot_cell {
                skipped.push(target);
                continue;
            }
            match plan_path(&self.grid, robot_cell, target, search) {
                Ok(result) if !result.path.is_empty() => {
                    let (heading_deg, timeout_s) =
                        movement_along(&self.grid, position, &result.path);
                    chosen = Some((target, heading_deg, timeout_s));
                    break;
                }
                Ok(_) => skipped.push(target),
                Err(PathFailure::TargetIsObstacle) | Err(PathFailure::TargetUnreachable) => {
                    self.stats.targets_abandoned += 1;
                    self.selector.mark_unreachable(target);
                }
            }
        }
        for cell in skipped {
            self.selector.release(cell);
        }

        let Some(view) = self.robots.get_mut(&robot_id) else {
            return;
        };
        match chosen {
            Some((target, heading_deg, timeout_s)) => {
                let seq = view.next_command_seq;
                view.next_command_seq += 1;
                view.order = Some(MovementOrder {
                    seq,
                    heading_deg,
                    speed: ROBOT_SPEED_MPS,
                    timeout_s: Some(timeout_s),
                });
                view.heading_deg = heading_deg;
                view.moving = true;
                view.target = Some(target);
                log::debug!(
                    "[Orchestrator] robot {} -> cell ({}, {}), heading {:.1}, {:.2}s",
                    robot_id,
                    target.x,
                    target.y,
                    heading_deg,
                    timeout_s
                );
            }
            None => {
                view.order = None;
                view.moving = false;
                log::debug!("[Orchestrator] robot {} idle, no plannable target", robot_id);
            }
        }
    }
}

/// Heading toward the first waypoint and the time to the end of the
/// straight prefix of the path.
fn movement_along(grid: &ExplorationGrid, from: Point, path: &[GridCoord]) -> (f64, f64) {
    let first = grid.to_world(path[0]);
    let heading_deg = from.heading_to(&first);
    let mut distance = from.distance(&first);
    let mut previous = first;
    for &cell in &path[1..] {
        let waypoint = grid.to_world(cell);
        let step_heading = previous.heading_to(&waypoint);
        let turn = (step_heading - heading_deg).rem_euclid(360.0);
        if turn.min(360.0 - turn) > 0.1 {
            break;
        }
        distance += previous.distance(&waypoint);
        previous = waypoint;
    }
    (heading_deg, distance / ROBOT_SPEED_MPS)
}

impl WirelessDevice for Orchestrator {
    fn device_id(&self) -> NodeId {
        ORCHESTRATOR_ID
    }

    fn position(&self) -> Point {
        self.start
    }

    fn receive(&self, frame: &Frame) {
        if let Frame::Notification {
            robot_id,
            seq,
            ts_start,
            ts_stop,
            bump,
        } = frame
        {
            self.handle_notification(*robot_id, *seq, *ts_start, *ts_stop, *bump);
        }
    }
}
