use thiserror::Error;

use crate::Waypoint2D;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("spiral needs at least one layer (got {0})")]
    NoLayers(i32),
}

/// Clockwise square spiral around `origin`, one unit between neighbours.
///
/// Ring 0 is the origin; ring `k` holds `8k` points starting just right of the
/// top-centre and running top edge, right edge, bottom edge, left edge.
/// Every point is computed directly from its 1-based index `n`.
pub fn generate_square_spiral(layers: i32, origin: Waypoint2D) -> Result<Vec<Waypoint2D>, GeometryError> {
    if layers <= 0 {
        return Err(GeometryError::NoLayers(layers));
    }
    let side = 2 * layers as u64 + 1;
    let total = side * side;
    Ok((1..=total).map(|n| spiral_point(n, origin)).collect())
}

/// Diameter of the ring holding index `n`: `ceil(sqrt(n))` bumped to odd.
pub(crate) fn ring_diameter(n: u64) -> u64 {
    let mut c = (n as f64).sqrt().ceil() as u64;
    // float sqrt can land one off for large n
    while c * c < n {
        c += 1;
    }
    while c > 1 && (c - 1) * (c - 1) >= n {
        c -= 1;
    }
    if c % 2 == 0 { c + 1 } else { c }
}

fn spiral_point(n: u64, origin: Waypoint2D) -> Waypoint2D {
    let d = ring_diameter(n) as i64;
    let r = ((d - 1) / 2) as f64;
    let layer_n = n as i64 - (d - 2).pow(2);
    let (ox, oy) = (origin.x, origin.y);

    if d == 1 {
        return origin;
    }
    let (x, y) = if layer_n <= d - 1 {
        (ox - r + layer_n as f64, oy + r)
    } else if layer_n <= 2 * d - 2 {
        (ox + r, oy + r - (layer_n - d + 1) as f64)
    } else if layer_n <= 3 * d - 3 {
        (ox + r - (layer_n - 2 * d + 2) as f64, oy - r)
    } else {
        (ox - r, oy - r + (layer_n - 3 * d + 3) as f64)
    };
    Waypoint2D::new(x, y)
}
