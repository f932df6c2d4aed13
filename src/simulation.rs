//! Composition root: wires one full simulation together and runs it.

use crate::config::SimConfig;
use crate::core::SharedRng;
use crate::engine::{EventScheduler, SchedulerHandle};
use crate::error::Result;
use crate::floorplan::{Floorplan, BUILTIN_OFFICE};
use crate::mapping::{MapConsolidator, MapHandle, MapSnapshot};
use crate::orchestrator::{Orchestrator, OrchestratorHandle, OrchestratorView};
use crate::robot::SimRobot;
use crate::telemetry::DataCollector;
use crate::wireless::{ChannelStats, NodeId, Wireless, WirelessDevice, WirelessHandle};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub sim_time_s: f64,
    pub events_dispatched: u64,
    pub map: MapSnapshot,
    pub explored_cells: usize,
    pub bumps: u64,
    pub channel: ChannelStats,
}

pub struct Simulation {
    engine: SchedulerHandle,
    wireless: WirelessHandle,
    map: MapHandle,
    orchestrator: OrchestratorHandle,
    collector: Option<Arc<DataCollector>>,
}

impl Simulation {
    /// Build every collaborator and register the wireless devices. The
    /// run does not start until [`Simulation::run`].
    pub fn build(config: &SimConfig) -> Result<Simulation> {
        config.validate()?;
        let rng = SharedRng::from_seed(config.simulation.seed);
        let floorplan = Arc::new(match &config.simulation.floorplan {
            Some(path) => Floorplan::load(path)?,
            None => Floorplan::parse(BUILTIN_OFFICE)?,
        });
        log::info!(
            "[Sim] floorplan {}x{} m, start ({:.1}, {:.1}), {} robots",
            floorplan.width,
            floorplan.height,
            floorplan.start.x,
            floorplan.start.y,
            config.simulation.num_robots
        );

        let engine = EventScheduler::new();
        let wireless = Wireless::new(config.propagation.build(rng.clone()), rng.clone());
        let map = MapConsolidator::new(
            Arc::clone(&engine),
            config.mapping.housekeeping_period_s,
        );
        let collector = if config.telemetry.enabled {
            Some(Arc::new(DataCollector::create(
                &config.telemetry.path,
                Duration::from_millis(config.telemetry.flush_period_ms),
            )?))
        } else {
            None
        };

        let robot_ids: Vec<NodeId> = (1..=config.simulation.num_robots as NodeId).collect();
        let orchestrator = Orchestrator::new(
            Arc::clone(&engine),
            Arc::clone(&wireless),
            Arc::clone(&map),
            floorplan.start,
            &robot_ids,
            config.exploration.strategy(),
            config.exploration.search.into(),
            config.orchestrator.downstream_period_s,
            config.orchestrator.relay_ratio,
            rng,
            collector.clone(),
        );

        let mut devices: Vec<Arc<dyn WirelessDevice>> = vec![orchestrator.clone()];
        for &id in &robot_ids {
            devices.push(SimRobot::new(
                id,
                Arc::clone(&engine),
                Arc::clone(&wireless),
                Arc::clone(&floorplan),
            ));
        }
        wireless.register_devices(devices);

        // Watchdog: a run that never closes its map still terminates.
        {
            let engine_for_stop = Arc::clone(&engine);
            let limit = config.simulation.max_sim_time_s;
            engine.schedule(limit, Some("watchdog"), move || {
                log::warn!("[Sim] watchdog fired at {:.0}s, stopping", limit);
                engine_for_stop.complete_run();
            })?;
        }

        Ok(Simulation {
            engine,
            wireless,
            map,
            orchestrator,
            collector,
        })
    }

    pub fn engine(&self) -> &SchedulerHandle {
        &self.engine
    }

    pub fn view(&self) -> OrchestratorView {
        self.orchestrator.view()
    }

    /// Run to completion in fast-forward and report.
    pub fn run(self) -> RunReport {
        self.run_at(None)
    }

    /// Run to completion, throttled to `speed` times real time when given.
    pub fn run_at(self, speed: Option<f64>) -> RunReport {
        self.map.start();
        self.orchestrator.start();
        match speed {
            Some(speed) => self.engine.command_play(speed),
            None => self.engine.command_fastforward(),
        }
        self.engine.run();

        let view = self.orchestrator.view();
        let report = RunReport {
            sim_time_s: self.engine.current_time(),
            events_dispatched: self.engine.events_dispatched(),
            map: view.map,
            explored_cells: view.explored_cells,
            bumps: view.stats.bumps,
            channel: self.wireless.stats(),
        };
        if let Some(collector) = &self.collector {
            collector.record(
                report.sim_time_s,
                "kpi",
                json!({
                    "sim_time_s": report.sim_time_s,
                    "events": report.events_dispatched,
                    "explored_cells": report.explored_cells,
                    "bumps": report.bumps,
                    "frames_sent": report.channel.frames_sent,
                    "frames_delivered": report.channel.frames_delivered,
                    "map_complete": report.map.complete,
                }),
            );
        }
        report
    }
}
