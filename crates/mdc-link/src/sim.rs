use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use mdc_proto::packet::{NodeId, Packet, PacketType, ScenarioKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::transport::{Transport, TransportError};

/// Radio-on time a node spends answering one wake-up sequence.
const WUR_AWAKE_PER_WAKEUP: Duration = Duration::from_millis(23);

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Probability that any single packet (either direction) is lost.
    pub drop_rate: f64,
    /// One-way delivery delay of replies.
    pub reply_delay: Duration,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { drop_rate: 0.0, reply_delay: Duration::from_millis(2), seed: 7 }
    }
}

#[derive(Debug)]
struct SimNode {
    scenario: ScenarioKind,
    since: Instant,
    cycle: Duration,
    awake: Duration,
    awake_total: Duration,
}

impl SimNode {
    fn new(now: Instant) -> Self {
        Self {
            scenario: ScenarioKind::Off,
            since: now,
            cycle: Duration::ZERO,
            awake: Duration::ZERO,
            awake_total: Duration::ZERO,
        }
    }

    /// Awake time accumulated in the current scenario.
    fn settle(&mut self, now: Instant) {
        if self.scenario == ScenarioKind::DutyCycle && !self.cycle.is_zero() {
            let elapsed = now.duration_since(self.since);
            self.awake_total += elapsed.mul_f64(self.awake.as_secs_f64() / self.cycle.as_secs_f64());
        }
        self.since = now;
    }

    fn is_listening(&self, now: Instant) -> bool {
        if self.cycle.is_zero() {
            return false;
        }
        let phase = now.duration_since(self.since).as_nanos() % self.cycle.as_nanos();
        phase < self.awake.as_nanos()
    }
}

pub struct SimTransport {
    cfg: SimConfig,
    rng: StdRng,
    nodes: BTreeMap<NodeId, SimNode>,
    inbox: VecDeque<(Instant, Packet)>,
    sent: usize,
}

impl SimTransport {
    pub fn new(node_ids: &[NodeId], cfg: SimConfig) -> Self {
        let now = Instant::now();
        let rng = StdRng::seed_from_u64(cfg.seed);
        let nodes = node_ids.iter().map(|&id| (id, SimNode::new(now))).collect();
        Self { cfg, rng, nodes, inbox: VecDeque::new(), sent: 0 }
    }

    pub fn packets_sent(&self) -> usize {
        self.sent
    }

    pub fn scenario_of(&self, node: NodeId) -> Option<ScenarioKind> {
        self.nodes.get(&node).map(|n| n.scenario)
    }

    fn lost(&mut self) -> bool {
        self.cfg.drop_rate > 0.0 && self.rng.gen_bool(self.cfg.drop_rate.min(1.0))
    }

    fn answer(&mut self, packet: &Packet, now: Instant) -> Option<Packet> {
        let node = self.nodes.get_mut(&packet.wake_target)?;
        match packet.kind {
            PacketType::SetScenario => {
                let scenario = packet.scenario?;
                node.settle(now);
                let mut ms_awake = 0;
                if scenario == ScenarioKind::Off {
                    ms_awake = node.awake_total.as_millis().min(u32::MAX as u128) as u32;
                    node.awake_total = Duration::ZERO;
                }
                node.scenario = scenario;
                node.cycle = Duration::from_millis(packet.cycle_period_ms as u64);
                node.awake = Duration::from_millis(packet.awake_period_ms as u64);
                Some(Packet::reply(packet.wake_target, PacketType::AckScenario, ms_awake))
            }
            PacketType::Wus if node.scenario == ScenarioKind::WakeRadio => {
                node.awake_total += WUR_AWAKE_PER_WAKEUP;
                Some(Packet::reply(packet.wake_target, PacketType::Data, 0))
            }
            PacketType::Cts if node.scenario == ScenarioKind::DutyCycle && node.is_listening(now) => {
                Some(Packet::reply(packet.wake_target, PacketType::Data, 0))
            }
            _ => None,
        }
    }
}

impl Transport for SimTransport {
    fn send(&mut self, packet: &Packet, _am_type: u8) -> Result<(), TransportError> {
        self.sent += 1;
        if self.lost() {
            trace!("sim: request to {} lost", packet.wake_target);
            return Ok(());
        }
        let now = Instant::now();
        if let Some(reply) = self.answer(packet, now) {
            if self.lost() {
                trace!("sim: reply from {} lost", reply.source);
            } else {
                self.inbox.push_back((now + self.cfg.reply_delay, reply));
            }
        } else {
            debug!("sim: node {} ignored {:?}", packet.wake_target, packet.kind);
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Packet>, TransportError> {
        let now = Instant::now();
        let Some(&(due, _)) = self.inbox.front() else {
            std::thread::sleep(timeout);
            return Ok(None);
        };
        if due > now {
            let wait = due - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(None);
            }
            std::thread::sleep(wait);
        }
        Ok(self.inbox.pop_front().map(|(_, p)| p))
    }
}
