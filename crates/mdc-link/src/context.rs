use std::collections::BTreeMap;
use std::time::Duration;

use mdc_proto::packet::NodeId;
use mdc_proto::record::{CollectionCycleRecord, NodeSummary};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::abort::AbortFlag;

/// Everything one collection cycle shares: the abort flag and the results
/// accumulator. Build a new one per mission.
#[derive(Debug)]
pub struct MissionContext {
    pub abort: AbortFlag,
    pub metrics: CycleMetrics,
}

impl MissionContext {
    pub fn new(nodes: &[NodeId]) -> Self {
        Self { abort: AbortFlag::new(), metrics: CycleMetrics::new(nodes) }
    }

    pub fn aborted(&self) -> bool {
        self.abort.is_set()
    }
}

#[derive(Debug, Clone)]
pub struct CycleMetrics {
    nodes: Vec<NodeId>,
    started_at: Option<OffsetDateTime>,
    ended_at: Option<OffsetDateTime>,
    latencies: BTreeMap<NodeId, Vec<Duration>>,
    awake_ms: BTreeMap<NodeId, u32>,
    failures: Vec<(NodeId, String)>,
}

impl CycleMetrics {
    pub fn new(nodes: &[NodeId]) -> Self {
        Self {
            nodes: nodes.to_vec(),
            started_at: None,
            ended_at: None,
            latencies: BTreeMap::new(),
            awake_ms: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn mark_start(&mut self) {
        self.started_at = Some(OffsetDateTime::now_utc());
    }

    pub fn mark_end(&mut self) {
        self.ended_at = Some(OffsetDateTime::now_utc());
    }

    pub fn record_latency(&mut self, node: NodeId, latency: Duration) {
        self.latencies.entry(node).or_default().push(latency);
    }

    pub fn record_awake(&mut self, node: NodeId, ms_awake: u32) {
        self.awake_ms.insert(node, ms_awake);
    }

    pub fn record_failure(&mut self, node: NodeId, what: impl Into<String>) {
        self.failures.push((node, what.into()));
    }

    pub fn latencies(&self, node: NodeId) -> &[Duration] {
        self.latencies.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn awake_ms(&self, node: NodeId) -> Option<u32> {
        self.awake_ms.get(&node).copied()
    }

    pub fn failures(&self) -> &[(NodeId, String)] {
        &self.failures
    }

    pub fn mean_latency(&self, node: NodeId) -> Option<Duration> {
        let samples = self.latencies(node);
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<Duration>() / samples.len() as u32)
    }

    /// Share of nodes with at least one data sample; `None` without nodes.
    pub fn reliability(&self) -> Option<f64> {
        if self.nodes.is_empty() {
            return None;
        }
        let heard = self.nodes.iter().filter(|n| !self.latencies(**n).is_empty()).count();
        Some(heard as f64 / self.nodes.len() as f64)
    }

    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.started_at?, self.ended_at?);
        Duration::try_from(end - start).ok()
    }

    pub fn to_record(&self, scenario: String, aborted: bool) -> CollectionCycleRecord {
        let stamp = |t: Option<OffsetDateTime>| t.and_then(|t| t.format(&Rfc3339).ok());
        CollectionCycleRecord {
            scenario,
            start_time: stamp(self.started_at).unwrap_or_default(),
            end_time: stamp(self.ended_at),
            duration_s: self.duration().map(|d| d.as_secs_f64()),
            reliability: self.reliability(),
            aborted,
            nodes: self
                .nodes
                .iter()
                .map(|&node| NodeSummary {
                    node,
                    mean_latency_s: self.mean_latency(node).map(|d| d.as_secs_f64()),
                    awake_duration_ms: self.awake_ms(node),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reliability_counts_nodes_heard_from() {
        let mut m = CycleMetrics::new(&[2, 3, 4, 5]);
        m.record_latency(2, Duration::from_millis(10));
        m.record_latency(2, Duration::from_millis(30));
        m.record_latency(5, Duration::from_millis(8));
        assert_eq!(m.reliability(), Some(0.5));
        assert_eq!(m.mean_latency(2), Some(Duration::from_millis(20)));
        assert_eq!(m.mean_latency(3), None);
    }

    #[test]
    fn no_nodes_means_no_reliability() {
        assert_eq!(CycleMetrics::new(&[]).reliability(), None);
    }

    #[test]
    fn record_reflects_metrics() {
        let mut m = CycleMetrics::new(&[2, 3]);
        m.mark_start();
        m.record_latency(3, Duration::from_millis(250));
        m.record_awake(2, 1200);
        m.record_failure(2, "no data");
        m.mark_end();

        let rec = m.to_record("WuR".into(), false);
        assert_eq!(rec.scenario, "WuR");
        assert!(!rec.start_time.is_empty());
        assert!(rec.end_time.is_some());
        assert!(rec.duration_s.unwrap() >= 0.0);
        assert_eq!(rec.reliability, Some(0.5));
        assert_eq!(rec.nodes[0], NodeSummary { node: 2, mean_latency_s: None, awake_duration_ms: Some(1200) });
        assert_eq!(rec.nodes[1].mean_latency_s, Some(0.25));
        assert_eq!(m.failures().len(), 1);
    }
}
