use std::path::Path;

use anyhow::{Context, Result};
use mdc_path::Waypoint2D;

pub fn save_orienting(path: &Path, point: Waypoint2D) -> Result<()> {
    std::fs::write(path, format!("{},{}", point.x, point.y))
        .with_context(|| format!("write {}", path.display()))
}

pub fn load_orienting(path: &Path) -> Result<Waypoint2D> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read {} (record one with `mdc orient`)", path.display()))?;
    let line = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .with_context(|| format!("{} is empty", path.display()))?;

    let (lat, lon) = line.split_once(',').with_context(|| format!("bad orienting line: {:?}", line))?;
    let lat: f64 = lat.trim().parse().with_context(|| format!("bad latitude: {:?}", lat))?;
    let lon: f64 = lon.trim().parse().with_context(|| format!("bad longitude: {:?}", lon))?;
    Ok(Waypoint2D::new(lat, lon))
}
