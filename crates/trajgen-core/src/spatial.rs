//! Spherical earth math for geodetic plans.
//!
//! Latitudes and longitudes are in degrees, distances in meters and courses in
//! radians measured clockwise from true north.

use crate::units::{asin_safe, to_2pi};
use nalgebra::Vector3;

/// Radius of the spherical earth model (one nautical mile per arc-minute).
pub const EARTH_RADIUS_M: f64 = 6_366_707.019_493_7;

/// Great-circle distance between two points.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Calculate bearing from point 1 to point 2 in radians.
/// Returns bearing in radians, 0 = north, π/2 = east.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y)
}

/// Course leaving point 1 toward point 2, in `[0, 2π)`.
pub fn initial_course(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    to_2pi(bearing(lat1, lon1, lat2, lon2))
}

/// Course arriving at point 2 from point 1, in `[0, 2π)`.
pub fn final_course(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    to_2pi(bearing(lat2, lon2, lat1, lon1) + std::f64::consts::PI)
}

/// Offset a position by distance and bearing.
///
/// # Arguments
/// * `lat`, `lon` - Starting position in degrees
/// * `distance_m` - Distance in meters (negative flies the reciprocal course)
/// * `bearing_rad` - Bearing in radians (0 = north, π/2 = east)
///
/// # Returns
/// (new_lat, new_lon) in degrees
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Earth-centered cartesian coordinates of a surface point, scaled to the earth radius.
pub fn spherical_to_xyz(lat: f64, lon: f64) -> Vector3<f64> {
    let phi = lat.to_radians();
    let lambda = lon.to_radians();
    Vector3::new(
        EARTH_RADIUS_M * phi.cos() * lambda.cos(),
        EARTH_RADIUS_M * phi.cos() * lambda.sin(),
        EARTH_RADIUS_M * phi.sin(),
    )
}

/// Inverse of [`spherical_to_xyz`]; the vector length is ignored.
pub fn xyz_to_spherical(v: &Vector3<f64>) -> (f64, f64) {
    let r = v.norm();
    if r == 0.0 {
        return (0.0, 0.0);
    }
    let lat = asin_safe(v.z / r);
    let lon = v.y.atan2(v.x);
    (lat.to_degrees(), lon.to_degrees())
}

/// Straight-line radius of a small circle whose surface radius is `surface_radius`.
pub fn to_chordal_radius(surface_radius: f64) -> f64 {
    EARTH_RADIUS_M * (surface_radius / EARTH_RADIUS_M).sin()
}

/// Surface radius of a small circle whose straight-line radius is `chordal_radius`.
pub fn from_chordal_radius(chordal_radius: f64) -> f64 {
    EARTH_RADIUS_M * asin_safe(chordal_radius / EARTH_RADIUS_M)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_haversine_one_arc_minute_is_one_nm() {
        let dist = haversine_distance(0.0, 0.0, 1.0 / 60.0, 0.0);
        assert!((dist - 1852.0).abs() < 0.01, "got {dist}");
    }

    #[test]
    fn test_earth_radius_makes_arc_minute_a_nautical_mile() {
        let arc_minute = (1.0f64 / 60.0).to_radians();
        assert!((EARTH_RADIUS_M * arc_minute - 1852.0).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_same_point() {
        let dist = haversine_distance(33.6846, -117.8265, 33.6846, -117.8265);
        assert!(dist < 0.001);
    }

    #[test]
    fn test_courses_along_equator() {
        assert!((initial_course(0.0, 0.0, 0.0, 1.0) - PI / 2.0).abs() < 1e-12);
        assert!((final_course(0.0, 0.0, 0.0, 1.0) - PI / 2.0).abs() < 1e-12);
        assert!(initial_course(0.0, 0.0, 1.0, 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_offset_by_bearing_inverts_distance() {
        let (lat, lon) = offset_by_bearing(40.0, -75.0, 5_000.0, 1.0);
        let back = haversine_distance(40.0, -75.0, lat, lon);
        assert!((back - 5_000.0).abs() < 1e-6, "got {back}");
        assert!((initial_course(40.0, -75.0, lat, lon) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_xyz_round_trip() {
        let v = spherical_to_xyz(37.5, -122.25);
        assert!((v.norm() - EARTH_RADIUS_M).abs() < 1e-6);
        let (lat, lon) = xyz_to_spherical(&v);
        assert!((lat - 37.5).abs() < 1e-10);
        assert!((lon + 122.25).abs() < 1e-10);
    }

    #[test]
    fn test_chordal_radius_is_shorter() {
        let r = 10_000.0;
        let c = to_chordal_radius(r);
        assert!(c < r);
        assert!((from_chordal_radius(c) - r).abs() < 1e-6);
    }
}
