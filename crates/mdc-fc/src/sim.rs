use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::{FlightControl, Position};

/// Vehicle stand-in: every command takes `step` and then succeeds.
#[derive(Debug, Clone)]
pub struct SimFlight {
    position: Position,
    ground_alt: f64,
    step: Duration,
    airborne: bool,
}

impl SimFlight {
    pub fn new(home: Position, step: Duration) -> Self {
        Self { position: home, ground_alt: home.alt_msl, step, airborne: false }
    }

    pub fn is_airborne(&self) -> bool {
        self.airborne
    }
}

impl FlightControl for SimFlight {
    fn takeoff(&mut self, altitude_m: f64) -> Result<()> {
        std::thread::sleep(self.step);
        self.position.alt_msl = self.ground_alt + altitude_m;
        self.airborne = true;
        info!("sim FC: airborne at {:.1} m", altitude_m);
        Ok(())
    }

    fn goto(&mut self, lat: f64, lon: f64, alt_msl: f64) -> Result<()> {
        anyhow::ensure!(self.airborne, "sim FC: goto while on the ground");
        std::thread::sleep(self.step);
        self.position = Position { lat, lon, alt_msl };
        info!("sim FC: at {:.7}, {:.7}", lat, lon);
        Ok(())
    }

    fn land(&mut self) -> Result<()> {
        std::thread::sleep(self.step);
        self.position.alt_msl = self.ground_alt;
        self.airborne = false;
        info!("sim FC: landed");
        Ok(())
    }

    fn position(&mut self) -> Result<Position> {
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flies_and_lands() {
        let home = Position { lat: 43.0, lon: -79.0, alt_msl: 100.0 };
        let mut fc = SimFlight::new(home, Duration::ZERO);
        assert!(fc.goto(43.1, -79.0, 105.0).is_err());
        fc.takeoff(5.0).unwrap();
        assert_eq!(fc.position().unwrap().alt_msl, 105.0);
        fc.goto(43.001, -79.001, 105.0).unwrap();
        fc.land().unwrap();
        let p = fc.position().unwrap();
        assert_eq!((p.lat, p.lon, p.alt_msl), (43.001, -79.001, 100.0));
        assert!(!fc.is_airborne());
    }
}
