//! TOML configuration.

use crate::core::SharedRng;
use crate::error::{Result, SimError};
use crate::exploration::{AllocationPolicy, NavigationStrategy, SearchAlgorithm};
use crate::wireless::{Propagation, RelaySolver};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SimConfig {
    pub simulation: SimulationConfig,
    pub propagation: PropagationConfig,
    pub exploration: ExplorationConfig,
    pub orchestrator: OrchestratorConfig,
    pub mapping: MappingConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_robots: usize,
    pub seed: u64,
    /// Path to an ASCII floorplan; the built-in office plan when absent.
    pub floorplan: Option<PathBuf>,
    /// Hard stop for headless runs, simulated seconds.
    pub max_sim_time_s: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            num_robots: 4,
            seed: 42,
            floorplan: None,
            max_sim_time_s: 86_400.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub model: PropagationModel,
    pub radius_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PropagationModel {
    #[default]
    Perfect,
    Radius,
    PisterHack,
    RelayPister,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        PropagationConfig {
            model: PropagationModel::Perfect,
            radius_m: 50.0,
        }
    }
}

impl PropagationConfig {
    pub fn build(&self, rng: SharedRng) -> Propagation {
        match self.model {
            PropagationModel::Perfect => Propagation::Perfect,
            PropagationModel::Radius => Propagation::Radius {
                radius_m: self.radius_m,
            },
            PropagationModel::PisterHack => Propagation::PisterHack { rng },
            PropagationModel::RelayPister => Propagation::RelayPister {
                solver: Mutex::new(RelaySolver::new()),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ExplorationConfig {
    pub navigation: NavigationConfig,
    /// Frontier allocation policy; ignored under ballistic navigation.
    pub policy: PolicyConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationConfig {
    /// Random heading after every stop, no planning.
    Ballistic,
    #[default]
    Frontier,
}

impl ExplorationConfig {
    pub fn strategy(&self) -> NavigationStrategy {
        match self.navigation {
            NavigationConfig::Ballistic => NavigationStrategy::Ballistic,
            NavigationConfig::Frontier => NavigationStrategy::Frontier {
                policy: self.policy.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyConfig {
    #[default]
    GlobalFrontier,
    NearestToRobot,
}

impl From<PolicyConfig> for AllocationPolicy {
    fn from(value: PolicyConfig) -> Self {
        match value {
            PolicyConfig::GlobalFrontier => AllocationPolicy::GlobalFrontier,
            PolicyConfig::NearestToRobot => AllocationPolicy::NearestToRobot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SearchConfig {
    Bfs,
    #[default]
    AStar,
}

impl From<SearchConfig> for SearchAlgorithm {
    fn from(value: SearchConfig) -> Self {
        match value {
            SearchConfig::Bfs => SearchAlgorithm::Bfs,
            SearchConfig::AStar => SearchAlgorithm::AStar,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub downstream_period_s: f64,
    /// Fraction of the swarm allowed to park as relays.
    pub relay_ratio: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            downstream_period_s: 1.0,
            relay_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub housekeeping_period_s: f64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        MappingConfig {
            housekeeping_period_s: 60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub flush_period_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            enabled: false,
            path: PathBuf::from("telemetry.jsonl"),
            flush_period_ms: 500,
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<SimConfig> {
        let raw = std::fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.simulation.num_robots == 0 {
            return Err(SimError::Config("num_robots must be at least 1".into()));
        }
        if self.orchestrator.downstream_period_s <= 0.0 {
            return Err(SimError::Config(
                "downstream_period_s must be positive".into(),
            ));
        }
        if self.mapping.housekeeping_period_s <= 0.0 {
            return Err(SimError::Config(
                "housekeeping_period_s must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.orchestrator.relay_ratio) {
            return Err(SimError::Config("relay_ratio must be in [0, 1]".into()));
        }
        if self.propagation.model == PropagationModel::Radius && self.propagation.radius_m <= 0.0 {
            return Err(SimError::Config("radius_m must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_a_partial_toml() {
        let config: SimConfig = toml::from_str(
            r#"
            [simulation]
            num_robots = 8
            seed = 7

            [propagation]
            model = "pister-hack"

            [exploration]
            policy = "nearest-to-robot"
            search = "bfs"
            "#,
        )
        .unwrap();
        assert_eq!(config.simulation.num_robots, 8);
        assert_eq!(config.propagation.model, PropagationModel::PisterHack);
        assert_eq!(config.exploration.policy, PolicyConfig::NearestToRobot);
        assert_eq!(config.exploration.search, SearchConfig::Bfs);
        assert_eq!(config.exploration.navigation, NavigationConfig::Frontier);
        // Untouched sections keep their defaults.
        assert_eq!(config.orchestrator.downstream_period_s, 1.0);
        config.validate().unwrap();
    }

    #[test]
    fn ballistic_navigation_parses_and_maps() {
        let config: SimConfig = toml::from_str(
            r#"
            [exploration]
            navigation = "ballistic"
            "#,
        )
        .unwrap();
        assert_eq!(config.exploration.strategy(), NavigationStrategy::Ballistic);
        // The default stays frontier-driven with the global policy.
        assert_eq!(
            SimConfig::default().exploration.strategy(),
            NavigationStrategy::Frontier {
                policy: AllocationPolicy::GlobalFrontier
            }
        );
    }

    #[test]
    fn zero_robots_is_rejected() {
        let mut config = SimConfig::default();
        config.simulation.num_robots = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_relay_ratio_is_rejected() {
        let mut config = SimConfig::default();
        config.orchestrator.relay_ratio = 1.5;
        assert!(config.validate().is_err());
    }
}
