pub mod controller;
pub mod doctor;
pub mod monitor;
pub mod orient;
pub mod sink;

use mdc_proto::packet::{DutyCycle, NodeId, ScenarioKind, FIRST_SENSOR_ID};
use serde::Deserialize;

pub use controller::{MissionController, MissionError, MissionPlan, MissionState};
pub use monitor::AbortMonitor;
pub use sink::{JsonArrayFile, RecordSink, SinkError};

/// Highest sensor node id deployed by default.
const LAST_DEFAULT_NODE: NodeId = 11;

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    /// "wake-radio" or "duty-cycle"
    pub kind: ScenarioKind,
    pub cycle_period_ms: Option<u16>,
    pub awake_period_ms: Option<u16>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self { kind: ScenarioKind::WakeRadio, cycle_period_ms: None, awake_period_ms: None }
    }
}

impl ScenarioConfig {
    pub fn duty_cycle(&self) -> DutyCycle {
        DutyCycle {
            cycle_period_ms: self.cycle_period_ms.unwrap_or(1000),
            awake_period_ms: self.awake_period_ms.unwrap_or(100),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodesConfig {
    pub ids: Option<Vec<NodeId>>,
}

impl NodesConfig {
    pub fn ids(&self) -> Vec<NodeId> {
        self.ids.clone().unwrap_or_else(|| (FIRST_SENSOR_ID..=LAST_DEFAULT_NODE).collect())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissionConfig {
    /// Spiral rings around home.
    pub layers: Option<i32>,
    /// Collection altitude above home.
    pub altitude_m: Option<f64>,
    pub scale_factor: Option<f64>,
    pub orient_path: Option<String>,
    pub results_path: Option<String>,
}

impl MissionConfig {
    pub fn layers(&self) -> i32 {
        self.layers.unwrap_or(1)
    }

    pub fn altitude_m(&self) -> f64 {
        self.altitude_m.unwrap_or(5.0)
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor.unwrap_or(1.0 / 3.0)
    }

    pub fn orient_path(&self) -> String {
        self.orient_path.clone().unwrap_or_else(|| "orienting_coords.csv".to_string())
    }

    pub fn results_path(&self) -> String {
        self.results_path.clone().unwrap_or_else(|| "MDCn_naive.json".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_field_deployment() {
        assert_eq!(NodesConfig::default().ids(), vec![2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        let dc = ScenarioConfig::default().duty_cycle();
        assert_eq!((dc.awake_period_ms, dc.cycle_period_ms), (100, 1000));
        let m = MissionConfig::default();
        assert_eq!(m.layers(), 1);
        assert_eq!(m.altitude_m(), 5.0);
        assert_eq!(m.results_path(), "MDCn_naive.json");
    }

    #[test]
    fn scenario_kind_from_toml() {
        let s: ScenarioConfig = toml::from_str("kind = \"duty-cycle\"\ncycle_period_ms = 500").unwrap();
        assert_eq!(s.kind, ScenarioKind::DutyCycle);
        assert_eq!(s.duty_cycle().cycle_period_ms, 500);
        assert_eq!(s.duty_cycle().awake_period_ms, 100);
    }
}
