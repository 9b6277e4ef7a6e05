const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle ground distance between two lat/lon points, metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_for_same_point() {
        assert_eq!(haversine_m(43.6, -79.4, 43.6, -79.4), 0.0);
    }

    #[test]
    fn one_millidegree_of_latitude() {
        let d = haversine_m(43.0, -79.0, 43.001, -79.0);
        assert!((d - 111.19).abs() < 0.1, "{d}");
    }
}
