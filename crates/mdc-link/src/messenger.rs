use std::time::{Duration, Instant};

use mdc_proto::packet::Packet;
use thiserror::Error;
use tracing::{debug, trace};

use crate::abort::AbortFlag;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("transport unavailable")]
    Transport(#[from] TransportError),
    #[error("no acknowledgement after {attempts} attempt(s)")]
    AckTimeout { attempts: u32 },
    #[error("abort requested after {attempts} attempt(s)")]
    Aborted { attempts: u32 },
    #[error("no data scenario is active")]
    NoDataScenario,
}

impl LinkError {
    pub fn is_abort(&self) -> bool {
        matches!(self, LinkError::Aborted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Send,
    Wait,
    Success,
    Failure,
}

/// Bookkeeping for one exchange.
#[derive(Debug, Clone)]
pub struct AttemptState {
    max_attempts: u32,
    interval: Duration,
    attempt_count: u32,
    last_send: Option<Instant>,
    succeeded: bool,
}

impl AttemptState {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval, attempt_count: 0, last_send: None, succeeded: false }
    }

    /// What the exchange should do at `now`.
    ///
    /// The first send is immediate; later sends wait a full `interval`. Once
    /// the budget is spent the exchange still waits one interval for a late
    /// acknowledgement before failing.
    pub fn next_action(&self, now: Instant) -> Action {
        if self.succeeded {
            return Action::Success;
        }
        match self.last_send {
            None if self.max_attempts == 0 => Action::Failure,
            None => Action::Send,
            Some(t) if now.saturating_duration_since(t) < self.interval => Action::Wait,
            Some(_) if self.attempt_count < self.max_attempts => Action::Send,
            Some(_) => Action::Failure,
        }
    }

    pub fn record_send(&mut self, now: Instant) {
        self.attempt_count += 1;
        self.last_send = Some(now);
    }

    pub fn record_success(&mut self) {
        self.succeeded = true;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt_count
    }
}

/// Successful exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub reply: Packet,
    pub attempts: u32,
    /// From the first send to the matching reply.
    pub elapsed: Duration,
}

pub struct ReliableMessenger<T> {
    transport: T,
    am_type: u8,
    read_timeout: Duration,
}

impl<T: Transport> ReliableMessenger<T> {
    pub fn new(transport: T, am_type: u8, read_timeout: Duration) -> Self {
        Self { transport, am_type, read_timeout }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Pushes `make_packet()` on a fixed period and polls for a reply that
    /// `matches`. Replies that do not match are dropped. Returns as soon as a
    /// match arrives, or fails once `max_attempts` sends went unanswered for
    /// one more interval. The abort flag is checked on every loop turn.
    pub fn send_with_retry(
        &mut self,
        abort: &AbortFlag,
        make_packet: impl Fn() -> Packet,
        matches: impl Fn(&Packet) -> bool,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<Exchange, LinkError> {
        let mut state = AttemptState::new(max_attempts, interval);
        let mut first_send = None;
        let mut exchange = None;

        loop {
            let now = Instant::now();
            match state.next_action(now) {
                Action::Success | Action::Failure => break,
                _ if abort.is_set() => {
                    debug!("exchange aborted after {} attempt(s)", state.attempts());
                    return Err(LinkError::Aborted { attempts: state.attempts() });
                }
                Action::Send => {
                    self.transport.send(&make_packet(), self.am_type)?;
                    state.record_send(now);
                    first_send.get_or_insert(now);
                }
                Action::Wait => {}
            }

            if let Some(p) = self.transport.receive(self.read_timeout)? {
                if matches(&p) {
                    let elapsed = first_send.map(|t: Instant| t.elapsed()).unwrap_or_default();
                    exchange = Some(Exchange { reply: p, attempts: state.attempts(), elapsed });
                    state.record_success();
                } else {
                    trace!("ignoring {:?} from node {}", p.kind, p.source);
                }
            }
        }

        exchange.ok_or(LinkError::AckTimeout { attempts: state.attempts() })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mdc_proto::packet::{DutyCycle, PacketType, ScenarioKind};
    use std::collections::VecDeque;

    const I: Duration = Duration::from_millis(50);

    /// Scripted transport: answers the n-th send (1-based) with the given replies.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub sent: Vec<Packet>,
        pub script: Vec<(usize, Packet)>,
        pub inbox: VecDeque<Packet>,
        pub on_send: Option<Box<dyn FnMut(&Packet) + Send>>,
        pub fail_send: bool,
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, packet: &Packet, _am_type: u8) -> Result<(), TransportError> {
            if self.fail_send {
                return Err(TransportError::Unavailable("unplugged".into()));
            }
            self.sent.push(*packet);
            let n = self.sent.len();
            for (at, reply) in &self.script {
                if *at == n {
                    self.inbox.push_back(*reply);
                }
            }
            if let Some(hook) = self.on_send.as_mut() {
                hook(packet);
            }
            Ok(())
        }

        fn receive(&mut self, _timeout: Duration) -> Result<Option<Packet>, TransportError> {
            Ok(self.inbox.pop_front())
        }
    }

    fn request() -> Packet {
        let dc = DutyCycle { cycle_period_ms: 1000, awake_period_ms: 100 };
        Packet::set_scenario(4, ScenarioKind::WakeRadio, dc)
    }

    fn is_ack_from_4(p: &Packet) -> bool {
        p.is_from(4, PacketType::AckScenario)
    }

    fn messenger(t: ScriptedTransport) -> ReliableMessenger<ScriptedTransport> {
        ReliableMessenger::new(t, 88, Duration::from_millis(1))
    }

    #[test]
    fn next_action_schedule() {
        let t0 = Instant::now();
        let mut s = AttemptState::new(2, I);
        assert_eq!(s.next_action(t0), Action::Send);
        s.record_send(t0);
        assert_eq!(s.next_action(t0 + Duration::from_millis(10)), Action::Wait);
        assert_eq!(s.next_action(t0 + I), Action::Send);
        s.record_send(t0 + I);
        assert_eq!(s.next_action(t0 + I + Duration::from_millis(49)), Action::Wait);
        assert_eq!(s.next_action(t0 + I * 2), Action::Failure);
        assert_eq!(s.attempts(), 2);
    }

    #[test]
    fn success_wins_over_everything() {
        let t0 = Instant::now();
        let mut s = AttemptState::new(1, I);
        s.record_send(t0);
        s.record_success();
        assert_eq!(s.next_action(t0 + I * 10), Action::Success);
    }

    #[test]
    fn zero_budget_fails_without_sending() {
        assert_eq!(AttemptState::new(0, I).next_action(Instant::now()), Action::Failure);
    }

    #[test]
    fn silent_link_sends_exactly_max_attempts() {
        let mut m = messenger(ScriptedTransport::default());
        let err = m
            .send_with_retry(&AbortFlag::new(), request, is_ack_from_4, 3, Duration::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, LinkError::AckTimeout { attempts: 3 }));
        assert_eq!(m.transport().sent.len(), 3);
    }

    #[test]
    fn ack_on_second_send_succeeds_after_two() {
        let t = ScriptedTransport {
            script: vec![(2, Packet::reply(4, PacketType::AckScenario, 0))],
            ..Default::default()
        };
        let mut m = messenger(t);
        let ex = m
            .send_with_retry(&AbortFlag::new(), request, is_ack_from_4, 3, Duration::from_millis(5))
            .unwrap();
        assert_eq!(ex.attempts, 2);
        assert_eq!(m.transport().sent.len(), 2);
        assert!(ex.elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn foreign_replies_are_ignored() {
        let t = ScriptedTransport {
            script: vec![
                (1, Packet::reply(5, PacketType::AckScenario, 0)),
                (1, Packet::reply(4, PacketType::Data, 0)),
            ],
            ..Default::default()
        };
        let mut m = messenger(t);
        let err = m
            .send_with_retry(&AbortFlag::new(), request, is_ack_from_4, 2, Duration::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, LinkError::AckTimeout { attempts: 2 }));
    }

    #[test]
    fn abort_stops_before_budget_is_spent() {
        let abort = AbortFlag::new();
        let hook_flag = abort.clone();
        let t = ScriptedTransport {
            on_send: Some(Box::new(move |_: &Packet| {
                hook_flag.trigger();
            })),
            ..Default::default()
        };
        let mut m = messenger(t);
        let err = m
            .send_with_retry(&abort, request, is_ack_from_4, 20, Duration::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, LinkError::Aborted { attempts: 1 }));
        assert_eq!(m.transport().sent.len(), 1);
    }

    #[test]
    fn send_failure_ends_the_exchange() {
        let t = ScriptedTransport { fail_send: true, ..Default::default() };
        let mut m = messenger(t);
        let err = m
            .send_with_retry(&AbortFlag::new(), request, is_ack_from_4, 3, Duration::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, LinkError::Transport(_)));
    }
}
