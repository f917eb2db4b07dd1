//! Spherical earth geodesy: forward azimuth, haversine distance and compass
//! quantization. Everything here is pure.

use serde::{Deserialize, Serialize};

use crate::{bearing::CompassDirection, location::Coordinate};

/// Mean earth radius used for distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const DEGREES_PER_POINT: f64 = 360.0 / CompassDirection::ALL.len() as f64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bearing {
    /// Clockwise from north, in `[0, 360)`
    pub degrees: f64,
    /// Raw forward azimuth in `(-π, π]`, not normalized
    pub radians: f64,
}

/// Initial bearing (forward azimuth) when travelling from `from` to `to`.
///
/// Identical points have no defined bearing, those yield `0` (north).
pub fn bearing(from: Coordinate, to: Coordinate) -> Bearing {
    if from == to {
        return Bearing {
            degrees: 0.0,
            radians: 0.0,
        };
    }

    let lat1 = from.latitude().to_radians();
    let lat2 = to.latitude().to_radians();
    let delta_lon = (to.longitude() - from.longitude()).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    let radians = y.atan2(x);

    Bearing {
        degrees: normalize_degrees(radians.to_degrees()),
        radians,
    }
}

/// Great circle distance in meters using the haversine formula
pub fn distance(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude().to_radians();
    let lat2 = to.latitude().to_radians();
    let delta_lat = (to.latitude() - from.latitude()).to_radians();
    let delta_lon = (to.longitude() - from.longitude()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `a` just past 1 for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c * 1000.0
}

/// Quantize a bearing into one of the 16 compass points.
///
/// Uses `f64::round` so exact half-way bearings (11.25°, 33.75°, ...) go to the
/// next point clockwise.
pub fn compass_direction(degrees: f64) -> CompassDirection {
    let index = (normalize_degrees(degrees) / DEGREES_PER_POINT).round() as usize;
    CompassDirection::ALL[index % CompassDirection::ALL.len()]
}

/// Wrap any angle into `[0, 360)`
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).expect("Invalid test coordinate")
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "Expected {expected} ± {tolerance}, got {actual}"
        );
    }

    #[test]
    fn test_one_degree_east_on_equator() {
        let from = coord(0.0, 0.0);
        let to = coord(0.0, 1.0);

        let b = bearing(from, to);
        assert_close(b.degrees, 90.0, 1e-9);
        assert_close(b.radians, std::f64::consts::FRAC_PI_2, 1e-9);
        assert_eq!(compass_direction(b.degrees), CompassDirection::E);

        assert_close(distance(from, to), 111_195.0, 50.0);
    }

    #[test]
    fn test_identical_points() {
        let london = coord(51.5, -0.1);

        let b = bearing(london, london);
        assert_eq!(b.degrees, 0.0);
        assert_eq!(b.radians, 0.0);
        assert_eq!(distance(london, london), 0.0);
        assert_eq!(compass_direction(b.degrees), CompassDirection::N);
    }

    #[test]
    fn test_cardinal_bearings() {
        let origin = coord(10.0, 10.0);
        assert_close(bearing(origin, coord(20.0, 10.0)).degrees, 0.0, 1e-9);
        assert_close(bearing(origin, coord(0.0, 10.0)).degrees, 180.0, 1e-9);

        let west = bearing(coord(0.0, 0.0), coord(0.0, -1.0));
        assert_close(west.degrees, 270.0, 1e-9);
        // Radians are not normalized
        assert_close(west.radians, -std::f64::consts::FRAC_PI_2, 1e-9);
    }

    #[test]
    fn test_bearing_always_in_range() {
        let points = [
            coord(0.0, 0.0),
            coord(89.9, 179.9),
            coord(-89.9, -179.9),
            coord(51.5, -0.1),
            coord(-33.9, 151.2),
            coord(50.27, -5.05),
            coord(0.0, 180.0),
            coord(0.0, -180.0),
        ];

        for a in points {
            for b in points {
                let deg = bearing(a, b).degrees;
                assert!(
                    (0.0..360.0).contains(&deg),
                    "Bearing {a} -> {b} out of range: {deg}"
                );
            }
        }
    }

    #[test]
    fn test_distance_symmetric() {
        let truro = coord(50.2632, -5.051);
        let sydney = coord(-33.8688, 151.2093);
        assert_close(distance(truro, sydney), distance(sydney, truro), 1e-6);
        assert!(distance(truro, sydney) > 0.0);
    }

    #[test]
    fn test_distance_antipodal() {
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM * 1000.0;

        let d = distance(coord(0.0, 0.0), coord(0.0, 180.0));
        assert!(d.is_finite());
        assert_close(d, half_circumference, 1.0);

        let d = distance(coord(90.0, 0.0), coord(-90.0, 0.0));
        assert_close(d, half_circumference, 1.0);
    }

    #[test]
    fn test_distance_near_identical() {
        let a = coord(50.0, -5.0);
        let b = coord(50.0, -5.000_000_1);
        let d = distance(a, b);
        assert!(d.is_finite());
        assert!(d < 0.05, "{d}");
    }

    #[test]
    fn test_compass_points() {
        assert_eq!(compass_direction(0.0), CompassDirection::N);
        assert_eq!(compass_direction(359.9), CompassDirection::N);
        assert_eq!(compass_direction(360.0), CompassDirection::N);
        assert_eq!(compass_direction(180.0), CompassDirection::S);
        assert_eq!(compass_direction(22.5), CompassDirection::NNE);
        assert_eq!(compass_direction(45.0), CompassDirection::NE);
        assert_eq!(compass_direction(270.0), CompassDirection::W);
        assert_eq!(compass_direction(337.5), CompassDirection::NNW);
    }

    #[test]
    fn test_compass_half_boundaries_round_up() {
        assert_eq!(compass_direction(11.25), CompassDirection::NNE);
        assert_eq!(compass_direction(11.2), CompassDirection::N);
        assert_eq!(compass_direction(348.75), CompassDirection::N);
        assert_eq!(compass_direction(348.7), CompassDirection::NNW);
    }

    #[test]
    fn test_compass_wraps_out_of_range() {
        assert_eq!(compass_direction(-90.0), CompassDirection::W);
        assert_eq!(compass_direction(450.0), CompassDirection::E);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(-1e-15), 0.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
        assert_close(normalize_degrees(-45.0), 315.0, 1e-12);
    }
}
