use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use mdc_link::ProtocolConfig;
use mdc_proto::packet::{NodeId, ScenarioKind, FIRST_SENSOR_ID};

use crate::{MissionConfig, ScenarioConfig};

/// Below this the motes cannot turn a request around before the next one.
const MIN_ATTEMPT_INTERVAL: Duration = Duration::from_millis(25);

pub fn check_protocol(p: &ProtocolConfig) -> Result<()> {
    anyhow::ensure!(p.max_attempts() >= 1, "protocol.max_attempts must be >= 1");
    anyhow::ensure!(p.attempt_interval() > MIN_ATTEMPT_INTERVAL, "protocol.attempt_interval_ms must be > 25");
    anyhow::ensure!(p.read_timeout() < p.attempt_interval(), "protocol.read_timeout_ms must be below the attempt interval");
    Ok(())
}

pub fn check_scenario(s: &ScenarioConfig) -> Result<()> {
    anyhow::ensure!(s.kind != ScenarioKind::Off, "scenario.kind must be wake-radio or duty-cycle");
    let dc = s.duty_cycle();
    anyhow::ensure!(dc.cycle_period_ms >= 50, "scenario.cycle_period_ms must be >= 50");
    anyhow::ensure!(dc.awake_period_ms <= dc.cycle_period_ms, "scenario.awake_period_ms exceeds cycle_period_ms");
    Ok(())
}

pub fn check_nodes(ids: &[NodeId]) -> Result<()> {
    anyhow::ensure!(!ids.is_empty(), "nodes.ids is empty");
    anyhow::ensure!(ids.iter().all(|&id| id >= FIRST_SENSOR_ID), "nodes.ids: 0 and 1 belong to the agent motes");
    let unique: BTreeSet<_> = ids.iter().collect();
    anyhow::ensure!(unique.len() == ids.len(), "nodes.ids has duplicates");
    Ok(())
}

pub fn check_mission(m: &MissionConfig) -> Result<()> {
    anyhow::ensure!(m.altitude_m() >= 1.0, "mission.altitude_m must be >= 1");
    mdc_path::doctor::check_path(m.layers(), m.scale_factor())
}
