use serde::{Deserialize, Serialize};

use crate::packet::{DutyCycle, NodeId, ScenarioKind};

/// Per-node results of one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node: NodeId,
    /// Mean over collected samples, seconds. `None` when nothing was collected.
    pub mean_latency_s: Option<f64>,
    /// Reported by the node when its scenario was switched off.
    pub awake_duration_ms: Option<u32>,
}

/// One entry of the persisted results log; field order is the key order on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionCycleRecord {
    pub scenario: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_s: Option<f64>,
    pub reliability: Option<f64>,
    pub aborted: bool,
    pub nodes: Vec<NodeSummary>,
}

/// Human label of a scenario, e.g. `WuR` or `DC ( 100 / 1000 )`.
pub fn describe_scenario(kind: ScenarioKind, dc: DutyCycle) -> String {
    match kind {
        ScenarioKind::WakeRadio => "WuR".to_string(),
        ScenarioKind::DutyCycle => format!("DC ( {} / {} )", dc.awake_period_ms, dc.cycle_period_ms),
        ScenarioKind::Off => "Off".to_string(),
    }
}
