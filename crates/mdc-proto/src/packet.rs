use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type NodeId = u8;

/// Agent-side sniffer mote; source of every packet the agent sends.
pub const SNIFFER_ID: NodeId = 0;
/// Agent-side wake-up radio mote; broadcasts the wake-up sequences.
pub const AGENT_WUR_ID: NodeId = 1;
/// Sensor nodes use ids from here up.
pub const FIRST_SENSOR_ID: NodeId = 2;

/// AM type of packets between the agent and its sniffer mote.
pub const SERIAL_AM_CONTROL: u8 = 88;
/// AM type the motes use among themselves over the air.
pub const RADIO_AM_CONTROL: u8 = 23;

pub const PAYLOAD_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("payload truncated: need {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("unknown scenario type {0}")]
    UnknownScenario(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    /// Agent asks a node to apply scenario parameters.
    SetScenario,
    /// Node confirms a scenario; carries `ms_awake` when switching off.
    AckScenario,
    /// Clear-to-send poll for a duty-cycling node.
    Cts,
    /// Ask the agent's wake-up radio to broadcast a wake-up sequence.
    Wus,
    /// Sensor reading from a node.
    Data,
}

impl PacketType {
    pub fn code(self) -> u8 {
        match self {
            PacketType::SetScenario => 5,
            PacketType::AckScenario => 6,
            PacketType::Cts => 7,
            PacketType::Wus => 8,
            PacketType::Data => 9,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, PacketError> {
        match code {
            5 => Ok(PacketType::SetScenario),
            6 => Ok(PacketType::AckScenario),
            7 => Ok(PacketType::Cts),
            8 => Ok(PacketType::Wus),
            9 => Ok(PacketType::Data),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

/// Operating mode of a sensor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Neither duty-cycles nor answers wake-ups; the ack reports time spent awake.
    Off,
    /// Stays asleep and answers wake-up sequences.
    WakeRadio,
    /// Duty-cycles and answers CTS polls while awake.
    DutyCycle,
}

impl ScenarioKind {
    pub fn code(self) -> u8 {
        match self {
            ScenarioKind::Off => 15,
            ScenarioKind::WakeRadio => 16,
            ScenarioKind::DutyCycle => 17,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, PacketError> {
        match code {
            15 => Ok(ScenarioKind::Off),
            16 => Ok(ScenarioKind::WakeRadio),
            17 => Ok(ScenarioKind::DutyCycle),
            other => Err(PacketError::UnknownScenario(other)),
        }
    }

    /// Request type that makes a node in this scenario answer with data.
    pub fn data_request(self) -> Option<PacketType> {
        match self {
            ScenarioKind::WakeRadio => Some(PacketType::Wus),
            ScenarioKind::DutyCycle => Some(PacketType::Cts),
            ScenarioKind::Off => None,
        }
    }
}

/// Duty-cycle timing carried on every agent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyCycle {
    pub cycle_period_ms: u16,
    pub awake_period_ms: u16,
}

/// 12-byte payload, big-endian: source, type, wake target, scenario (1 byte
/// each), cycle period, awake period (2 each), ms awake (4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub source: NodeId,
    pub kind: PacketType,
    pub wake_target: NodeId,
    /// `None` encodes as 0 (data requests and data replies carry no scenario).
    pub scenario: Option<ScenarioKind>,
    pub cycle_period_ms: u16,
    pub awake_period_ms: u16,
    pub ms_awake: u32,
}

impl Packet {
    pub fn set_scenario(target: NodeId, scenario: ScenarioKind, dc: DutyCycle) -> Self {
        Self {
            source: SNIFFER_ID,
            kind: PacketType::SetScenario,
            wake_target: target,
            scenario: Some(scenario),
            cycle_period_ms: dc.cycle_period_ms,
            awake_period_ms: dc.awake_period_ms,
            ms_awake: 0,
        }
    }

    /// `Wus` or `Cts` request addressed to `target`.
    pub fn data_request(kind: PacketType, target: NodeId, dc: DutyCycle) -> Self {
        Self {
            source: SNIFFER_ID,
            kind,
            wake_target: target,
            scenario: None,
            cycle_period_ms: dc.cycle_period_ms,
            awake_period_ms: dc.awake_period_ms,
            ms_awake: 0,
        }
    }

    /// Reply sent by a node (used by simulated nodes and tests).
    pub fn reply(source: NodeId, kind: PacketType, ms_awake: u32) -> Self {
        Self {
            source,
            kind,
            wake_target: SNIFFER_ID,
            scenario: None,
            cycle_period_ms: 0,
            awake_period_ms: 0,
            ms_awake,
        }
    }

    pub fn is_from(&self, node: NodeId, kind: PacketType) -> bool {
        self.source == node && self.kind == kind
    }

    pub fn encode(&self) -> Bytes {
        let mut b = BytesMut::with_capacity(PAYLOAD_LEN);
        b.put_u8(self.source);
        b.put_u8(self.kind.code());
        b.put_u8(self.wake_target);
        b.put_u8(self.scenario.map(ScenarioKind::code).unwrap_or(0));
        b.put_u16(self.cycle_period_ms);
        b.put_u16(self.awake_period_ms);
        b.put_u32(self.ms_awake);
        b.freeze()
    }

    /// Decodes the first [`PAYLOAD_LEN`] bytes; trailing padding is ignored.
    pub fn decode(mut buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < PAYLOAD_LEN {
            return Err(PacketError::Truncated { expected: PAYLOAD_LEN, got: buf.len() });
        }
        let source = buf.get_u8();
        let kind = PacketType::from_code(buf.get_u8())?;
        let wake_target = buf.get_u8();
        let scenario = match buf.get_u8() {
            0 => None,
            code => Some(ScenarioKind::from_code(code)?),
        };
        Ok(Self {
            source,
            kind,
            wake_target,
            scenario,
            cycle_period_ms: buf.get_u16(),
            awake_period_ms: buf.get_u16(),
            ms_awake: buf.get_u32(),
        })
    }
}
