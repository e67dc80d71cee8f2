//! Positions, velocities and timed navigation points.
//!
//! A [`Position`] is either geodetic (degrees, meters) or Euclidean (meters,
//! x east, y north, z up). A plan never mixes the two; operations between
//! positions of different frames yield NaN.

use crate::spatial;
use crate::units::{to_2pi, turn_delta};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Geodetic coordinates: latitude and longitude in degrees, altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLonAlt {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Position {
    Geodetic(LatLonAlt),
    Euclidean(Vector3<f64>),
}

impl Position {
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Position::Euclidean(Vector3::new(x, y, z))
    }

    pub fn lla(lat: f64, lon: f64, alt: f64) -> Self {
        Position::Geodetic(LatLonAlt { lat, lon, alt })
    }

    pub fn is_geodetic(&self) -> bool {
        matches!(self, Position::Geodetic(_))
    }

    pub fn same_frame(&self, other: &Position) -> bool {
        self.is_geodetic() == other.is_geodetic()
    }

    pub fn alt(&self) -> f64 {
        match self {
            Position::Geodetic(p) => p.alt,
            Position::Euclidean(v) => v.z,
        }
    }

    pub fn with_alt(&self, alt: f64) -> Self {
        match *self {
            Position::Geodetic(p) => Position::lla(p.lat, p.lon, alt),
            Position::Euclidean(v) => Position::xyz(v.x, v.y, alt),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Position::Geodetic(p) => p.lat.is_finite() && p.lon.is_finite() && p.alt.is_finite(),
            Position::Euclidean(v) => v.iter().all(|c| c.is_finite()),
        }
    }

    fn horizontal(&self) -> Option<Vector2<f64>> {
        match self {
            Position::Euclidean(v) => Some(Vector2::new(v.x, v.y)),
            Position::Geodetic(_) => None,
        }
    }

    /// Horizontal distance (great-circle for geodetic positions).
    pub fn distance_h(&self, other: &Position) -> f64 {
        match (self, other) {
            (Position::Geodetic(a), Position::Geodetic(b)) => {
                spatial::haversine_distance(a.lat, a.lon, b.lat, b.lon)
            }
            (Position::Euclidean(a), Position::Euclidean(b)) => {
                Vector2::new(b.x - a.x, b.y - a.y).norm()
            }
            _ => f64::NAN,
        }
    }

    pub fn distance_v(&self, other: &Position) -> f64 {
        (other.alt() - self.alt()).abs()
    }

    /// Course leaving `self` toward `other`.
    pub fn initial_course(&self, other: &Position) -> f64 {
        match (self, other) {
            (Position::Geodetic(a), Position::Geodetic(b)) => {
                spatial::initial_course(a.lat, a.lon, b.lat, b.lon)
            }
            (Position::Euclidean(a), Position::Euclidean(b)) => {
                to_2pi((b.x - a.x).atan2(b.y - a.y))
            }
            _ => f64::NAN,
        }
    }

    /// Course arriving at `other` from `self`.
    pub fn final_course(&self, other: &Position) -> f64 {
        match (self, other) {
            (Position::Geodetic(a), Position::Geodetic(b)) => {
                spatial::final_course(a.lat, a.lon, b.lat, b.lon)
            }
            _ => self.initial_course(other),
        }
    }

    /// Move `d` meters along track `trk`, keeping the altitude.
    pub fn linear_dist_2d(&self, trk: f64, d: f64) -> Position {
        match *self {
            Position::Geodetic(p) => {
                let (lat, lon) = spatial::offset_by_bearing(p.lat, p.lon, d, trk);
                Position::lla(lat, lon, p.alt)
            }
            Position::Euclidean(v) => {
                Position::xyz(v.x + d * trk.sin(), v.y + d * trk.cos(), v.z)
            }
        }
    }

    /// Horizontal midpoint, altitude averaged.
    pub fn mid_point(&self, other: &Position) -> Position {
        let alt = 0.5 * (self.alt() + other.alt());
        match (self, other) {
            (Position::Euclidean(a), Position::Euclidean(b)) => {
                let m = (a + b) * 0.5;
                Position::xyz(m.x, m.y, alt)
            }
            _ => {
                let d = self.distance_h(other);
                self.linear_dist_2d(self.initial_course(other), 0.5 * d)
                    .with_alt(alt)
            }
        }
    }

    /// Move `d` meters along a circular arc around `center`.
    ///
    /// `dir` is +1 for a clockwise (right) turn and -1 for counter-clockwise.
    /// Returns the new position (altitude of `self`) and the track flown there.
    pub fn turn_by_dist_2d(&self, center: &Position, dir: f64, d: f64) -> (Position, f64) {
        match (self, center) {
            (Position::Geodetic(_), Position::Geodetic(c)) => {
                let surface_r = center.distance_h(self);
                let chordal = spatial::to_chordal_radius(surface_r);
                if chordal <= 0.0 {
                    return (*self, f64::NAN);
                }
                let theta = dir * d / chordal;
                let radial = center.initial_course(self) + theta;
                let (lat, lon) = spatial::offset_by_bearing(c.lat, c.lon, surface_r, radial);
                let sn = Position::lla(lat, lon, self.alt());
                let trk = to_2pi(center.final_course(&sn) + dir * FRAC_PI_2);
                (sn, trk)
            }
            (Position::Euclidean(_), Position::Euclidean(_)) => {
                let (Some(s), Some(c)) = (self.horizontal(), center.horizontal()) else {
                    return (*self, f64::NAN);
                };
                let r = s - c;
                let radius = r.norm();
                if radius <= 0.0 {
                    return (*self, f64::NAN);
                }
                let radial = r.x.atan2(r.y) + dir * d / radius;
                let sn = Position::xyz(
                    c.x + radius * radial.sin(),
                    c.y + radius * radial.cos(),
                    self.alt(),
                );
                (sn, to_2pi(radial + dir * FRAC_PI_2))
            }
            _ => (*self, f64::NAN),
        }
    }
}

/// Track of a vehicle at `p` while turning about `center` in direction `dir`.
pub fn track_in_turn(center: &Position, p: &Position, dir: f64) -> f64 {
    to_2pi(center.final_course(p) + dir * FRAC_PI_2)
}

/// Unsigned angle at `center` between the radials to `p1` and `p2`.
pub fn angle_between(p1: &Position, center: &Position, p2: &Position) -> f64 {
    turn_delta(center.initial_course(p1), center.initial_course(p2))
}

/// Ground track, ground speed and vertical speed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    /// Track in radians, clockwise from north.
    pub trk: f64,
    /// Ground speed in m/s.
    pub gs: f64,
    /// Vertical speed in m/s.
    pub vs: f64,
}

impl Velocity {
    pub fn new(trk: f64, gs: f64, vs: f64) -> Self {
        Self { trk, gs, vs }
    }
}

/// A position with a required time of arrival and an optional label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
    pub position: Position,
    /// Seconds from plan epoch.
    pub time: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl NavPoint {
    pub fn new(position: Position, time: f64) -> Self {
        Self {
            position,
            time,
            name: String::new(),
        }
    }

    pub fn named(position: Position, time: f64, name: impl Into<String>) -> Self {
        Self {
            position,
            time,
            name: name.into(),
        }
    }

    pub fn with_time(&self, time: f64) -> Self {
        Self {
            time,
            ..self.clone()
        }
    }

    pub fn with_position(&self, position: Position) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    pub fn append_name(&mut self, name: &str) {
        self.name.push_str(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_euclidean_course_and_distance() {
        let a = Position::xyz(0.0, 0.0, 100.0);
        let b = Position::xyz(100.0, 0.0, 50.0);
        assert!((a.distance_h(&b) - 100.0).abs() < 1e-12);
        assert!((a.initial_course(&b) - PI / 2.0).abs() < 1e-12);
        assert!((a.distance_v(&b) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_mixed_frames_are_nan() {
        let a = Position::xyz(0.0, 0.0, 0.0);
        let b = Position::lla(0.0, 0.0, 0.0);
        assert!(a.distance_h(&b).is_nan());
        assert!(!a.same_frame(&b));
    }

    #[test]
    fn test_turn_by_dist_quarter_circle() {
        // start due west of center heading north, turning right
        let center = Position::xyz(0.0, 0.0, 0.0);
        let start = Position::xyz(-1000.0, 0.0, 30.0);
        let quarter = PI / 2.0 * 1000.0;
        let (p, trk) = start.turn_by_dist_2d(&center, 1.0, quarter);
        assert!(p.distance_h(&Position::xyz(0.0, 1000.0, 30.0)) < 1e-6, "got {p:?}");
        assert!((trk - PI / 2.0).abs() < 1e-9, "track {trk}");
        assert!((angle_between(&start, &center, &p) - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_geodetic_turn_keeps_radius() {
        let center = Position::lla(10.0, 20.0, 0.0);
        let start = center.linear_dist_2d(0.0, 3000.0).with_alt(500.0);
        let (p, _) = start.turn_by_dist_2d(&center, -1.0, 2000.0);
        assert!((center.distance_h(&p) - 3000.0).abs() < 1e-3);
        assert_eq!(p.alt(), 500.0);
        let track = track_in_turn(&center, &start, -1.0);
        assert!((track - 1.5 * PI).abs() < 1e-6, "track {track}");
    }

    #[test]
    fn test_position_serde_untagged() {
        let geo: Position = serde_json::from_str(r#"{"lat":1.0,"lon":2.0,"alt":3.0}"#).unwrap();
        assert_eq!(geo, Position::lla(1.0, 2.0, 3.0));
        let xyz: Position = serde_json::from_str("[1.0,2.0,3.0]").unwrap();
        assert_eq!(xyz, Position::xyz(1.0, 2.0, 3.0));
    }
}
