use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mavlink::{
    common::{
        MavMessage, HEARTBEAT_DATA, MavAutopilot, MavModeFlag, MavState, MavType,
        COMMAND_INT_DATA, COMMAND_LONG_DATA, GLOBAL_POSITION_INT_DATA, MavCmd, MavFrame, MavResult,
    },
    error::MessageReadError,
    MavConnection, MavHeader,
};
use tracing::{debug, info, warn};

use crate::geo::haversine_m;
use crate::{FcConfig, FlightControl, Position};

/// ArduCopter custom mode number of GUIDED.
const COPTER_MODE_GUIDED: f32 = 4.0;
const GLOBAL_POSITION_INT_ID: f32 = 33.0;
const POSITION_INTERVAL_US: f32 = 200_000.0;
/// MAV_DO_REPOSITION_FLAGS_CHANGE_MODE
const REPOSITION_CHANGE_MODE: f32 = 1.0;

const ACK_TIMEOUT: Duration = Duration::from_secs(3);
const HEARTBEAT_EVERY: Duration = Duration::from_secs(1);

type Link = Arc<dyn MavConnection<MavMessage> + Send + Sync>;
type Frame = (MavHeader, MavMessage);

/// Drains the connection on its own thread; `recv` may block indefinitely.
fn read_loop(conn: Link, tx: Sender<Frame>) {
    loop {
        match conn.recv() {
            Ok(frame) => {
                if tx.send(frame).is_err() {
                    return;
                }
            }
            Err(MessageReadError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!("FC: mavlink connection closed");
                return;
            }
            Err(e) => {
                debug!("FC: recv failed: {:?}", e);
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

/// What the autopilot last told us, fed from the reader thread.
struct Telemetry {
    rx: Receiver<Frame>,
    target_sys: u8,
    target_comp: u8,
    seen_heartbeat: bool,
    armed: bool,
    position: Option<Position>,
    relative_alt_m: f64,
    last_ack: Option<(MavCmd, MavResult)>,
}

impl Telemetry {
    fn new(rx: Receiver<Frame>, target_sys: u8, target_comp: u8) -> Self {
        Self {
            rx,
            target_sys,
            target_comp,
            seen_heartbeat: false,
            armed: false,
            position: None,
            relative_alt_m: 0.0,
            last_ack: None,
        }
    }

    fn ingest(&mut self, hdr: &MavHeader, msg: MavMessage) {
        if hdr.system_id != self.target_sys {
            return;
        }
        match msg {
            MavMessage::HEARTBEAT(hb) if hdr.component_id == self.target_comp => {
                self.seen_heartbeat = true;
                self.armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
            }
            MavMessage::GLOBAL_POSITION_INT(p) => self.update_position(&p),
            MavMessage::COMMAND_ACK(ack) => self.last_ack = Some((ack.command, ack.result)),
            _ => {}
        }
    }

    fn update_position(&mut self, p: &GLOBAL_POSITION_INT_DATA) {
        // lat/lon in 1e-7 degrees, altitudes in millimetres
        self.position = Some(Position {
            lat: p.lat as f64 / 1e7,
            lon: p.lon as f64 / 1e7,
            alt_msl: p.alt as f64 / 1000.0,
        });
        self.relative_alt_m = p.relative_alt as f64 / 1000.0;
    }

    /// Pumps frames until `done` holds or `deadline` passes. `idle` runs at
    /// least once per `HEARTBEAT_EVERY` while waiting.
    fn wait_until(
        &mut self,
        what: &str,
        deadline: Instant,
        done: impl Fn(&Self) -> bool,
        mut idle: impl FnMut() -> Result<()>,
    ) -> Result<()> {
        while !done(self) {
            let now = Instant::now();
            anyhow::ensure!(now < deadline, "timed out waiting for {}", what);
            idle()?;
            match self.rx.recv_timeout((deadline - now).min(HEARTBEAT_EVERY)) {
                Ok((hdr, msg)) => self.ingest(&hdr, msg),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    anyhow::bail!("mavlink reader stopped while waiting for {}", what)
                }
            }
        }
        Ok(())
    }
}

/// Outgoing half: our own header, sequence and heartbeat schedule.
struct Uplink {
    conn: Link,
    hdr: MavHeader,
    last_hb_send: Instant,
}

impl Uplink {
    fn send(&mut self, msg: MavMessage) -> Result<()> {
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        self.conn.send(&self.hdr, &msg).context("mavlink send")?;
        Ok(())
    }

    fn heartbeat_if_due(&mut self) -> Result<()> {
        if self.last_hb_send.elapsed() >= HEARTBEAT_EVERY {
            self.send(MavMessage::HEARTBEAT(gcs_heartbeat()))?;
            self.last_hb_send = Instant::now();
        }
        Ok(())
    }
}

fn gcs_heartbeat() -> HEARTBEAT_DATA {
    HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    }
}

pub struct MavFlight {
    uplink: Uplink,
    telemetry: Telemetry,
    tolerance_m: f64,
    timeout: Duration,
}

impl MavFlight {
    pub fn open(cfg: &FcConfig) -> Result<Self> {
        let url = cfg.connection();
        let conn: Link = mavlink::connect::<MavMessage>(&url)
            .with_context(|| format!("mavlink connect {}", url))?
            .into();

        let (tx, rx) = mpsc::channel();
        let reader = Arc::clone(&conn);
        std::thread::Builder::new()
            .name("mavlink-rx".into())
            .spawn(move || read_loop(reader, tx))
            .context("spawn mavlink reader")?;

        let mut link = Self {
            uplink: Uplink {
                conn,
                hdr: MavHeader { system_id: cfg.sys_id, component_id: cfg.comp_id, sequence: 0 },
                last_hb_send: Instant::now(),
            },
            telemetry: Telemetry::new(rx, cfg.target_sys, cfg.target_comp),
            tolerance_m: cfg.arrival_tolerance_m(),
            timeout: cfg.command_timeout(),
        };

        link.wait_until("autopilot heartbeat", link.timeout, |t| t.seen_heartbeat)?;
        info!("FC: heartbeat from {}/{} on {}", cfg.target_sys, cfg.target_comp, url);

        if let Err(e) = link.command_long(
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            [GLOBAL_POSITION_INT_ID, POSITION_INTERVAL_US, 0.0, 0.0, 0.0, 0.0, 0.0],
        ) {
            warn!("FC: position stream request failed: {:#}", e);
        }
        Ok(link)
    }

    pub fn is_armed(&self) -> bool {
        self.telemetry.armed
    }

    fn wait_until(&mut self, what: &str, timeout: Duration, done: impl Fn(&Telemetry) -> bool) -> Result<()> {
        let uplink = &mut self.uplink;
        self.telemetry.wait_until(what, Instant::now() + timeout, done, || uplink.heartbeat_if_due())
    }

    fn wait_ack(&mut self, command: MavCmd) -> Result<()> {
        self.wait_until("command ack", ACK_TIMEOUT, |t| matches!(t.last_ack, Some((c, _)) if c == command))?;
        match self.telemetry.last_ack.take() {
            Some((_, MavResult::MAV_RESULT_ACCEPTED)) => Ok(()),
            other => anyhow::bail!("{:?} not accepted: {:?}", command, other.map(|(_, r)| r)),
        }
    }

    fn command_long(&mut self, command: MavCmd, params: [f32; 7]) -> Result<()> {
        let cmd = COMMAND_LONG_DATA {
            target_system: self.telemetry.target_sys,
            target_component: self.telemetry.target_comp,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        self.telemetry.last_ack = None;
        self.uplink.send(MavMessage::COMMAND_LONG(cmd))?;
        self.wait_ack(command)
    }

    pub fn send_heartbeat(&mut self) -> Result<()> {
        self.uplink.send(MavMessage::HEARTBEAT(gcs_heartbeat()))
    }
}

impl FlightControl for MavFlight {
    fn takeoff(&mut self, altitude_m: f64) -> Result<()> {
        info!("FC: GUIDED + arm");
        self.command_long(MavCmd::MAV_CMD_DO_SET_MODE, [1.0, COPTER_MODE_GUIDED, 0.0, 0.0, 0.0, 0.0, 0.0])?;
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])?;
        self.wait_until("arming", self.timeout, |t| t.armed)?;

        info!("FC: takeoff to {} m", altitude_m);
        self.command_long(MavCmd::MAV_CMD_NAV_TAKEOFF, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude_m as f32])?;
        let reached = altitude_m * 0.95;
        self.wait_until("takeoff altitude", self.timeout, |t| t.relative_alt_m >= reached)
    }

    fn goto(&mut self, lat: f64, lon: f64, alt_msl: f64) -> Result<()> {
        let cmd = COMMAND_INT_DATA {
            target_system: self.telemetry.target_sys,
            target_component: self.telemetry.target_comp,
            frame: MavFrame::MAV_FRAME_GLOBAL,
            command: MavCmd::MAV_CMD_DO_REPOSITION,
            current: 0,
            autocontinue: 0,
            param1: -1.0,
            param2: REPOSITION_CHANGE_MODE,
            param3: 0.0,
            param4: f32::NAN,
            x: (lat * 1e7).round() as i32,
            y: (lon * 1e7).round() as i32,
            z: alt_msl as f32,
        };
        info!("FC: goto {:.7}, {:.7} @ {:.1} m MSL", lat, lon, alt_msl);
        self.telemetry.last_ack = None;
        self.uplink.send(MavMessage::COMMAND_INT(cmd))?;
        self.wait_ack(MavCmd::MAV_CMD_DO_REPOSITION)?;

        let tolerance = self.tolerance_m;
        self.wait_until("waypoint arrival", self.timeout, |t| {
            t.position.map(|p| haversine_m(p.lat, p.lon, lat, lon) <= tolerance).unwrap_or(false)
        })
    }

    fn land(&mut self) -> Result<()> {
        info!("FC: land");
        self.command_long(MavCmd::MAV_CMD_NAV_LAND, [0.0; 7])?;
        self.wait_until("disarm after landing", self.timeout, |t| !t.armed)
    }

    fn position(&mut self) -> Result<Position> {
        self.wait_until("position", self.timeout, |t| t.position.is_some())?;
        self.telemetry.position.context("no position from autopilot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn autopilot(armed: bool) -> Frame {
        let mut hb = gcs_heartbeat();
        hb.mavtype = MavType::MAV_TYPE_QUADROTOR;
        hb.autopilot = MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA;
        if armed {
            hb.base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
        }
        (MavHeader { system_id: 1, component_id: 1, sequence: 0 }, MavMessage::HEARTBEAT(hb))
    }

    #[test]
    fn silent_autopilot_times_out() {
        let (_tx, rx) = mpsc::channel::<Frame>();
        let mut t = Telemetry::new(rx, 1, 1);
        let start = Instant::now();
        let mut idles = 0;
        let err = t
            .wait_until("autopilot heartbeat", start + Duration::from_millis(100), |t| t.seen_heartbeat, || {
                idles += 1;
                Ok(())
            })
            .unwrap_err();
        let took = start.elapsed();
        assert!(err.to_string().contains("timed out waiting for autopilot heartbeat"));
        assert!(took >= Duration::from_millis(100));
        assert!(took < Duration::from_secs(2), "took {:?}", took);
        assert!(idles >= 1);
    }

    #[test]
    fn reader_gone_fails_fast() {
        let (tx, rx) = mpsc::channel::<Frame>();
        drop(tx);
        let mut t = Telemetry::new(rx, 1, 1);
        let start = Instant::now();
        let err = t.wait_until("position", start + Duration::from_secs(30), |t| t.position.is_some(), || Ok(())).unwrap_err();
        assert!(err.to_string().contains("reader stopped"));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn heartbeat_from_target_marks_armed() {
        let (tx, rx) = mpsc::channel();
        let mut t = Telemetry::new(rx, 1, 1);
        let feeder = std::thread::spawn(move || {
            let (mut other, msg) = autopilot(true);
            other.system_id = 7;
            tx.send((other, msg)).unwrap();
            std::thread::sleep(Duration::from_millis(20));
            tx.send(autopilot(true)).unwrap();
            tx
        });
        t.wait_until("arming", Instant::now() + Duration::from_secs(5), |t| t.armed, || Ok(())).unwrap();
        assert!(t.seen_heartbeat);

        let tx = feeder.join().unwrap();
        tx.send(autopilot(false)).unwrap();
        t.wait_until("disarm", Instant::now() + Duration::from_secs(5), |t| !t.armed, || Ok(())).unwrap();
    }
}
