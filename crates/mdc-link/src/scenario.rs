use std::time::Duration;

use mdc_proto::packet::{DutyCycle, NodeId, Packet, PacketType, ScenarioKind};
use tracing::{info, warn};

use crate::abort::AbortFlag;
use crate::context::MissionContext;
use crate::messenger::{LinkError, ReliableMessenger};
use crate::transport::Transport;
use crate::ProtocolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioReply {
    /// Node confirmed a wake-radio or duty-cycle scenario.
    Applied,
    /// Node switched off and reported how long its radio was on.
    SwitchedOff { ms_awake: u32 },
}

pub struct ScenarioCoordinator<T> {
    messenger: ReliableMessenger<T>,
    scenario: ScenarioKind,
    duty_cycle: DutyCycle,
    max_attempts: u32,
    interval: Duration,
}

impl<T: Transport> ScenarioCoordinator<T> {
    /// `scenario` is the data scenario of the mission; it picks the request
    /// type used by [`collect_from_node`](Self::collect_from_node).
    pub fn new(messenger: ReliableMessenger<T>, proto: &ProtocolConfig, scenario: ScenarioKind, duty_cycle: DutyCycle) -> Self {
        Self {
            messenger,
            scenario,
            duty_cycle,
            max_attempts: proto.max_attempts(),
            interval: proto.attempt_interval(),
        }
    }

    pub fn scenario(&self) -> ScenarioKind {
        self.scenario
    }

    pub fn duty_cycle(&self) -> DutyCycle {
        self.duty_cycle
    }

    pub fn messenger(&self) -> &ReliableMessenger<T> {
        &self.messenger
    }

    pub fn set_scenario(&mut self, ctx: &mut MissionContext, node: NodeId, kind: ScenarioKind) -> Result<ScenarioReply, LinkError> {
        let abort = ctx.abort.clone();
        self.negotiate(&abort, ctx, node, kind)
    }

    /// Switches `node` off and returns the awake time it reports.
    ///
    /// Ignores the mission abort flag: the closing pass has to reach every
    /// node even after an emergency landing.
    pub fn switch_off(&mut self, ctx: &mut MissionContext, node: NodeId) -> Result<u32, LinkError> {
        match self.negotiate(&AbortFlag::new(), ctx, node, ScenarioKind::Off)? {
            ScenarioReply::SwitchedOff { ms_awake } => Ok(ms_awake),
            ScenarioReply::Applied => Ok(0),
        }
    }

    fn negotiate(&mut self, abort: &AbortFlag, ctx: &mut MissionContext, node: NodeId, kind: ScenarioKind) -> Result<ScenarioReply, LinkError> {
        let dc = self.duty_cycle;
        let result = self.messenger.send_with_retry(
            abort,
            || Packet::set_scenario(node, kind, dc),
            |p| p.is_from(node, PacketType::AckScenario),
            self.max_attempts,
            self.interval,
        );

        match result {
            Ok(ex) => {
                info!("node {}: scenario {:?} acknowledged after {} attempt(s)", node, kind, ex.attempts);
                if kind == ScenarioKind::Off {
                    ctx.metrics.record_awake(node, ex.reply.ms_awake);
                    Ok(ScenarioReply::SwitchedOff { ms_awake: ex.reply.ms_awake })
                } else {
                    Ok(ScenarioReply::Applied)
                }
            }
            Err(e) => {
                warn!("node {}: scenario {:?} failed: {}", node, kind, e);
                ctx.metrics.record_failure(node, format!("set {:?}: {}", kind, e));
                Err(e)
            }
        }
    }

    /// Pulls one data packet and records the latency sample.
    pub fn collect_from_node(&mut self, ctx: &mut MissionContext, node: NodeId) -> Result<Duration, LinkError> {
        let request = self.scenario.data_request().ok_or(LinkError::NoDataScenario)?;
        let dc = self.duty_cycle;
        let result = self.messenger.send_with_retry(
            &ctx.abort,
            || Packet::data_request(request, node, dc),
            |p| p.is_from(node, PacketType::Data),
            self.max_attempts,
            self.interval,
        );

        match result {
            Ok(ex) => {
                info!("node {}: data received after {} attempt(s) in {:?}", node, ex.attempts, ex.elapsed);
                ctx.metrics.record_latency(node, ex.elapsed);
                Ok(ex.elapsed)
            }
            Err(e) => {
                warn!("node {}: data collection failed: {}", node, e);
                ctx.metrics.record_failure(node, format!("collect: {}", e));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::tests::ScriptedTransport;
    use crate::sim::{SimConfig, SimTransport};

    const DC: DutyCycle = DutyCycle { cycle_period_ms: 1000, awake_period_ms: 100 };

    fn proto(max_attempts: u32) -> ProtocolConfig {
        ProtocolConfig { max_attempts: Some(max_attempts), attempt_interval_ms: Some(5), read_timeout_ms: Some(1) }
    }

    fn coordinator<T: Transport>(t: T, kind: ScenarioKind) -> ScenarioCoordinator<T> {
        ScenarioCoordinator::new(ReliableMessenger::new(t, 88, Duration::from_millis(1)), &proto(3), kind, DC)
    }

    #[test]
    fn switching_off_returns_ms_awake_unchanged() {
        let t = ScriptedTransport {
            script: vec![(1, Packet::reply(6, PacketType::AckScenario, 987_654))],
            ..Default::default()
        };
        let mut c = coordinator(t, ScenarioKind::WakeRadio);
        let mut ctx = MissionContext::new(&[6]);
        let reply = c.set_scenario(&mut ctx, 6, ScenarioKind::Off).unwrap();
        assert_eq!(reply, ScenarioReply::SwitchedOff { ms_awake: 987_654 });
        assert_eq!(ctx.metrics.awake_ms(6), Some(987_654));

        let sent = &c.messenger().transport().sent[0];
        assert_eq!(sent.kind, PacketType::SetScenario);
        assert_eq!(sent.scenario, Some(ScenarioKind::Off));
        assert_eq!(sent.wake_target, 6);
    }

    #[test]
    fn no_ack_is_distinct_from_a_reading() {
        let mut c = coordinator(ScriptedTransport::default(), ScenarioKind::WakeRadio);
        let mut ctx = MissionContext::new(&[6]);
        let err = c.set_scenario(&mut ctx, 6, ScenarioKind::Off).unwrap_err();
        assert!(matches!(err, LinkError::AckTimeout { attempts: 3 }));
        assert_eq!(ctx.metrics.awake_ms(6), None);
        assert_eq!(ctx.metrics.failures().len(), 1);
    }

    #[test]
    fn duty_cycle_collection_polls_with_cts() {
        let t = ScriptedTransport {
            script: vec![(1, Packet::reply(3, PacketType::Data, 0))],
            ..Default::default()
        };
        let mut c = coordinator(t, ScenarioKind::DutyCycle);
        let mut ctx = MissionContext::new(&[3]);
        c.collect_from_node(&mut ctx, 3).unwrap();
        assert_eq!(c.messenger().transport().sent[0].kind, PacketType::Cts);
        assert_eq!(ctx.metrics.latencies(3).len(), 1);
    }

    #[test]
    fn wake_radio_collection_against_simulated_node() {
        let mut c = coordinator(SimTransport::new(&[4], SimConfig::default()), ScenarioKind::WakeRadio);
        let mut ctx = MissionContext::new(&[4]);
        assert_eq!(c.set_scenario(&mut ctx, 4, ScenarioKind::WakeRadio).unwrap(), ScenarioReply::Applied);
        let latency = c.collect_from_node(&mut ctx, 4).unwrap();
        assert!(latency > Duration::ZERO);
        assert_eq!(ctx.metrics.reliability(), Some(1.0));
    }

    #[test]
    fn aborted_context_fails_immediately() {
        let mut c = coordinator(ScriptedTransport::default(), ScenarioKind::WakeRadio);
        let mut ctx = MissionContext::new(&[4]);
        ctx.abort.trigger();
        let err = c.collect_from_node(&mut ctx, 4).unwrap_err();
        assert!(err.is_abort());
        assert!(c.messenger().transport().sent.is_empty());
    }

    #[test]
    fn switch_off_still_runs_after_abort() {
        let t = ScriptedTransport {
            script: vec![(1, Packet::reply(5, PacketType::AckScenario, 420))],
            ..Default::default()
        };
        let mut c = coordinator(t, ScenarioKind::DutyCycle);
        let mut ctx = MissionContext::new(&[5]);
        ctx.abort.trigger();
        assert_eq!(c.switch_off(&mut ctx, 5).unwrap(), 420);
        assert_eq!(ctx.metrics.awake_ms(5), Some(420));
        assert!(ctx.aborted());
    }

    #[test]
    fn off_scenario_cannot_collect() {
        let mut c = coordinator(ScriptedTransport::default(), ScenarioKind::Off);
        let mut ctx = MissionContext::new(&[4]);
        assert!(matches!(c.collect_from_node(&mut ctx, 4), Err(LinkError::NoDataScenario)));
    }
}
