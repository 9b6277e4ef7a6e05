use anyhow::Result;
use crate::Waypoint2D;

pub fn check_path(layers: i32, scale_factor: f64) -> Result<()> {
    anyhow::ensure!(layers >= 1, "mission.layers must be >= 1");
    anyhow::ensure!(layers <= 10, "mission.layers above 10 is not a sane collection path");
    anyhow::ensure!(scale_factor > 0.0 && scale_factor <= 1.0, "mission.scale_factor should be in (0, 1]");
    Ok(())
}

pub fn check_orienting(origin: &Waypoint2D, orienting: &Waypoint2D) -> Result<()> {
    anyhow::ensure!(orienting.x.abs() <= 90.0 && orienting.y.abs() <= 180.0, "orienting coordinates invalid");
    anyhow::ensure!(origin.distance_to(orienting) > 0.0, "orienting point coincides with home");
    Ok(())
}
