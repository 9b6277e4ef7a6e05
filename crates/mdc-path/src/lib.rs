pub mod doctor;
pub mod spiral;
pub mod transform;

use serde::{Deserialize, Serialize};

pub use spiral::{generate_square_spiral, GeometryError};
pub use transform::{plan_collection_path, rotate_by_angle, rotate_to_point, scale_by_factor, scale_to_point};

/// Planar point. For flights `x` is latitude and `y` is longitude (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint2D {
    pub x: f64,
    pub y: f64,
}

impl Waypoint2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Waypoint2D) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}
