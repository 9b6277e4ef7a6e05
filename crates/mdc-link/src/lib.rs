pub mod abort;
pub mod context;
pub mod messenger;
pub mod scenario;
pub mod serial;
pub mod sim;
pub mod transport;

use std::time::Duration;

use serde::Deserialize;

pub use abort::AbortFlag;
pub use context::{CycleMetrics, MissionContext};
pub use messenger::{LinkError, ReliableMessenger};
pub use scenario::{ScenarioCoordinator, ScenarioReply};
pub use transport::{Transport, TransportError};

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// "serial" talks to the sniffer mote, "sim" uses in-process nodes.
    pub backend: String,

    /// Serial devices tried in order. Default: /dev/ttyUSB0 .. /dev/ttyUSB9
    pub candidate_devs: Option<Vec<String>>,
    pub baud: Option<u32>,

    /// Simulation only: per-packet loss probability and RNG seed.
    pub drop_rate: Option<f64>,
    pub seed: Option<u64>,
}

/// Retry budget of every exchange.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProtocolConfig {
    pub max_attempts: Option<u32>,
    /// Gap between re-sends. Must stay above 25 ms for the motes to keep up.
    pub attempt_interval_ms: Option<u64>,
    /// Per-poll serial read timeout.
    pub read_timeout_ms: Option<u64>,
}

impl ProtocolConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(20)
    }

    pub fn attempt_interval(&self) -> Duration {
        Duration::from_millis(self.attempt_interval_ms.unwrap_or(50))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.unwrap_or(1))
    }

    /// Worst-case wall time of one exchange.
    pub fn exchange_bound(&self) -> Duration {
        self.attempt_interval() * self.max_attempts() + self.read_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_defaults() {
        let p = ProtocolConfig::default();
        assert_eq!(p.max_attempts(), 20);
        assert_eq!(p.attempt_interval(), Duration::from_millis(50));
        assert_eq!(p.exchange_bound(), Duration::from_millis(1001));
    }
}
