use crate::spiral::{generate_square_spiral, GeometryError};
use crate::Waypoint2D;

pub fn scale_by_factor(points: &[Waypoint2D], factor: f64, origin: Waypoint2D) -> Vec<Waypoint2D> {
    points
        .iter()
        .map(|p| {
            Waypoint2D::new(
                factor * (p.x - origin.x) + origin.x,
                factor * (p.y - origin.y) + origin.y,
            )
        })
        .collect()
}

/// Scales so that a unit offset from `origin` becomes `|target - origin|` long.
pub fn scale_to_point(points: &[Waypoint2D], target: Waypoint2D, origin: Waypoint2D) -> Vec<Waypoint2D> {
    scale_by_factor(points, origin.distance_to(&target), origin)
}

/// Turns every offset from `origin` by `-angle` radians, so a positive angle
/// swings the +y axis towards +x (bearing-style with `x` first).
pub fn rotate_by_angle(points: &[Waypoint2D], angle: f64, origin: Waypoint2D) -> Vec<Waypoint2D> {
    let (sin, cos) = (-angle).sin_cos();
    points
        .iter()
        .map(|p| {
            let dx = p.x - origin.x;
            let dy = p.y - origin.y;
            Waypoint2D::new(origin.x + cos * dx - sin * dy, origin.y + sin * dx + cos * dy)
        })
        .collect()
}

/// Rotates the +y axis onto the direction of `target`.
///
/// The angle is `atan2(dx, dy)`, arguments swapped on purpose: with latitude
/// as `x` this is the bearing of `target` seen from `origin`.
pub fn rotate_to_point(points: &[Waypoint2D], target: Waypoint2D, origin: Waypoint2D) -> Vec<Waypoint2D> {
    let angle = (target.x - origin.x).atan2(target.y - origin.y);
    rotate_by_angle(points, angle, origin)
}

/// Collection path around `origin`, fronted and sized by `orienting`, then
/// shrunk by `factor`: generate → rotate-to-point → scale-to-point → scale.
pub fn plan_collection_path(
    layers: i32,
    origin: Waypoint2D,
    orienting: Waypoint2D,
    factor: f64,
) -> Result<Vec<Waypoint2D>, GeometryError> {
    let path = generate_square_spiral(layers, origin)?;
    let path = rotate_to_point(&path, orienting, origin);
    let path = scale_to_point(&path, orienting, origin);
    Ok(scale_by_factor(&path, factor, origin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-9;

    fn close(a: &[Waypoint2D], b: &[Waypoint2D]) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(p, q)| (p.x - q.x).abs() < EPS && (p.y - q.y).abs() < EPS)
    }

    fn sample() -> Vec<Waypoint2D> {
        generate_square_spiral(2, Waypoint2D::new(45.1, -79.3)).unwrap()
    }

    #[test]
    fn unit_scale_is_identity() {
        let pts = sample();
        let origin = Waypoint2D::new(45.1, -79.3);
        assert!(close(&scale_by_factor(&pts, 1.0, origin), &pts));
    }

    #[test]
    fn rotation_round_trips() {
        let pts = sample();
        let origin = Waypoint2D::new(44.0, -80.0);
        for angle in [0.3, -1.2, PI, 2.0 * PI + 0.1] {
            let there = rotate_by_angle(&pts, angle, origin);
            let back = rotate_by_angle(&there, -angle, origin);
            assert!(close(&back, &pts), "angle {angle}");
        }
    }

    #[test]
    fn quarter_turn_moves_up_to_right() {
        let origin = Waypoint2D::new(0.0, 0.0);
        let out = rotate_by_angle(&[Waypoint2D::new(0.0, 1.0)], FRAC_PI_2, origin);
        assert!(close(&out, &[Waypoint2D::new(1.0, 0.0)]));
    }

    #[test]
    fn rotate_to_point_uses_swapped_atan2() {
        let origin = Waypoint2D::new(0.0, 0.0);
        // atan2(1, 0) = pi/2, same as the quarter turn above
        let target = Waypoint2D::new(1.0, 0.0);
        let out = rotate_to_point(&[Waypoint2D::new(0.0, 1.0)], target, origin);
        assert!(close(&out, &[target]));
    }

    #[test]
    fn scale_to_point_uses_distance() {
        let origin = Waypoint2D::new(1.0, 1.0);
        let target = Waypoint2D::new(4.0, 5.0);
        let out = scale_to_point(&[Waypoint2D::new(2.0, 1.0)], target, origin);
        assert!(close(&out, &[Waypoint2D::new(6.0, 1.0)]));
    }

    #[test]
    fn planned_path_fronts_the_orienting_point() {
        let origin = Waypoint2D::new(43.0, -79.0);
        let orienting = Waypoint2D::new(43.0003, -78.9996);
        let path = plan_collection_path(1, origin, orienting, 1.0).unwrap();
        assert_eq!(path.len(), 9);
        assert!(close(&path[..1], &[origin]));
        // second spiral point sits one unit "up", which must land on the orienting point
        assert!(close(&path[1..2], &[orienting]));

        let third = plan_collection_path(1, origin, orienting, 1.0 / 3.0).unwrap();
        let expected = Waypoint2D::new(
            origin.x + (orienting.x - origin.x) / 3.0,
            origin.y + (orienting.y - origin.y) / 3.0,
        );
        assert!(close(&third[1..2], &[expected]));
    }

    #[test]
    fn planning_propagates_geometry_errors() {
        let o = Waypoint2D::new(0.0, 0.0);
        assert_eq!(
            plan_collection_path(0, o, Waypoint2D::new(0.0, 1.0), 1.0),
            Err(GeometryError::NoLayers(0))
        );
    }
}
