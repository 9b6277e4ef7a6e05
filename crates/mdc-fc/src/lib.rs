pub mod geo;
pub mod mav;
pub mod sim;

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// "mavlink" drives the autopilot, "sim" flies an imaginary vehicle.
    pub backend: String,

    /// MAVLink connection url, e.g. "serial:/dev/ttyACM0:57600" or "tcpout:127.0.0.1:5762".
    pub connection: Option<String>,

    /// MAVLink ids we use (companion side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (FC side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    /// Horizontal distance at which a waypoint counts as reached.
    pub arrival_tolerance_m: Option<f64>,

    /// Upper bound for any single flight command (takeoff, goto, land).
    pub command_timeout_s: Option<u64>,

    /// Simulation only: time spent per flight command.
    pub sim_step_ms: Option<u64>,
}

impl FcConfig {
    pub fn connection(&self) -> String {
        self.connection.clone().unwrap_or_else(|| "serial:/dev/ttyACM0:57600".to_string())
    }

    pub fn arrival_tolerance_m(&self) -> f64 {
        self.arrival_tolerance_m.unwrap_or(2.0)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_s.unwrap_or(60))
    }
}

/// Global position; altitude above mean sea level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub alt_msl: f64,
}

/// Blocking flight primitives. Every call returns once the vehicle confirms
/// or the implementation's own timeout expires.
pub trait FlightControl: Send {
    fn takeoff(&mut self, altitude_m: f64) -> Result<()>;

    fn goto(&mut self, lat: f64, lon: f64, alt_msl: f64) -> Result<()>;

    fn land(&mut self) -> Result<()>;

    fn position(&mut self) -> Result<Position>;
}

impl<F: FlightControl + ?Sized> FlightControl for Box<F> {
    fn takeoff(&mut self, altitude_m: f64) -> Result<()> {
        (**self).takeoff(altitude_m)
    }

    fn goto(&mut self, lat: f64, lon: f64, alt_msl: f64) -> Result<()> {
        (**self).goto(lat, lon, alt_msl)
    }

    fn land(&mut self) -> Result<()> {
        (**self).land()
    }

    fn position(&mut self) -> Result<Position> {
        (**self).position()
    }
}
