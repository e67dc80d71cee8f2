//! Turn geometry for a single vertex.
//!
//! Given the points before, at and after a vertex and an unsigned radius,
//! compute where the turn begins (BOT), its midpoint (MOT), where it ends
//! (EOT), its direction, arc length and center. Nothing here touches a plan.

use crate::config::TurnCenterMethod;
use crate::position::{LatLonAlt, NavPoint, Position};
use crate::spatial::{spherical_to_xyz, to_chordal_radius, xyz_to_spherical, EARTH_RADIUS_M};
use crate::units::{asin_safe, sqrt_safe, turn_delta, turn_direction};
use nalgebra::{Vector2, Vector3};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnGeometry {
    pub bot: Position,
    pub mot: Position,
    pub eot: Position,
    /// +1 turning right, -1 turning left.
    pub dir: f64,
    pub arc_length: f64,
    pub center: Position,
}

/// Turn points with times and altitudes assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedTurn {
    pub bot: NavPoint,
    pub mot: NavPoint,
    pub eot: NavPoint,
    pub dir: f64,
    pub center: Position,
}

/// Turn from leg `p1 -> p2` onto leg `p2 -> p3` with the given radius.
///
/// Euclidean positions always use the planar construction; geodetic ones use
/// `method`. Returns `None` for a non-positive radius, mixed frames, or a
/// degenerate vertex (straight through or a full reversal).
pub fn turn_generator(
    p1: &Position,
    p2: &Position,
    p3: &Position,
    radius: f64,
    method: TurnCenterMethod,
) -> Option<TurnGeometry> {
    if !(radius > 0.0) || !radius.is_finite() {
        return None;
    }
    let geometry = match (p1, p2, p3) {
        (Position::Euclidean(a), Position::Euclidean(b), Position::Euclidean(c)) => {
            turn_euclidean(a, b, c, radius)
        }
        (Position::Geodetic(a), Position::Geodetic(b), Position::Geodetic(c)) => match method {
            TurnCenterMethod::Chordal => turn_chordal(a, b, c, radius),
            TurnCenterMethod::Tangent => turn_tangent(p1, p2, p3, radius),
        },
        _ => None,
    }?;
    let finite = [geometry.bot, geometry.mot, geometry.eot, geometry.center]
        .iter()
        .all(Position::is_finite);
    (finite && geometry.arc_length.is_finite()).then_some(geometry)
}

/// As [`turn_generator`], placing the MOT at the vertex time and BOT/EOT
/// symmetrically around it, with altitudes following the vertical speeds
/// of the legs in and out.
pub fn turn_generator_timed(
    np1: &NavPoint,
    np2: &NavPoint,
    np3: &NavPoint,
    radius: f64,
    method: TurnCenterMethod,
) -> Option<TimedTurn> {
    if np1.time > np2.time || np2.time > np3.time {
        return None;
    }
    let geometry = turn_generator(&np1.position, &np2.position, &np3.position, radius, method)?;
    let gs_in = np1.position.distance_h(&np2.position) / (np2.time - np1.time);
    let vs_in = (np2.position.alt() - np1.position.alt()) / (np2.time - np1.time);
    let vs_out = (np3.position.alt() - np2.position.alt()) / (np3.time - np2.time);
    if !(gs_in > 0.0) {
        return None;
    }
    let half = 0.5 * geometry.arc_length / gs_in;
    let alt_mot = np2.position.alt();
    Some(TimedTurn {
        bot: NavPoint::new(geometry.bot.with_alt(alt_mot - vs_in * half), np2.time - half),
        mot: NavPoint::new(geometry.mot.with_alt(alt_mot), np2.time),
        eot: NavPoint::new(geometry.eot.with_alt(alt_mot + vs_out * half), np2.time + half),
        dir: geometry.dir,
        center: geometry.center,
    })
}

fn turn_euclidean(
    p1: &Vector3<f64>,
    p2: &Vector3<f64>,
    p3: &Vector3<f64>,
    radius: f64,
) -> Option<TurnGeometry> {
    let (a, b, c) = (p1.xy(), p2.xy(), p3.xy());
    let ahat = (c - b).try_normalize(0.0)?;
    let bhat = (a - b).try_normalize(0.0)?;
    let v = ahat + bhat;
    let denom = sqrt_safe(v.norm_squared() - v.dot(&ahat).powi(2));
    if !(denom > 0.0) {
        return None;
    }
    let w = v * (radius / denom);
    let bot = b + bhat * w.dot(&bhat);
    let eot = b + ahat * w.dot(&ahat);
    let alpha = 2.0 * asin_safe((bot - eot).norm() / (2.0 * radius));
    let center = b + w;
    let mot = center + (b - center).try_normalize(0.0)? * radius;

    let at = |v: Vector2<f64>| Position::xyz(v.x, v.y, p1.z);
    let (pos1, pos2, pos3) = (at(a), at(b), at(c));
    Some(TurnGeometry {
        bot: at(bot),
        mot: at(mot),
        eot: at(eot),
        dir: turn_direction(pos1.initial_course(&pos2), pos2.initial_course(&pos3)),
        arc_length: alpha * radius,
        center: at(center),
    })
}

/// Unit normal of the great-circle plane through `p` and `q`, pointing toward `r`.
fn side_normal(p: &Vector3<f64>, q: &Vector3<f64>, r: &Vector3<f64>) -> Option<Vector3<f64>> {
    let n = p.cross(q).try_normalize(0.0)?;
    Some(if r.dot(&n) > 0.0 { n } else { -n })
}

fn turn_chordal(p1: &LatLonAlt, p2: &LatLonAlt, p3: &LatLonAlt, radius: f64) -> Option<TurnGeometry> {
    let p = spherical_to_xyz(p1.lat, p1.lon);
    let q = spherical_to_xyz(p2.lat, p2.lon);
    let r = spherical_to_xyz(p3.lat, p3.lon);
    let rp = to_chordal_radius(radius);

    // centers lie at chordal distance rp from both leg planes, on the inside of the turn
    let n1 = side_normal(&p, &q, &r)?;
    let n2 = side_normal(&r, &q, &p)?;
    let d = n1.cross(&n2);
    let dd = d.norm_squared();
    if dd == 0.0 {
        return None;
    }
    let x0 = (n2.cross(&d) + d.cross(&n1)) * (rp / dd);
    let n = if p.dot(&d) > 0.0 { d } else { -d };
    let xn = x0.dot(&n);
    let t = (-xn + sqrt_safe(xn * xn - dd * (x0.norm_squared() - EARTH_RADIUS_M.powi(2)))) / dd;
    let c = x0 + n * t;

    let bote = (c - n1 * rp).try_normalize(0.0)? * EARTH_RADIUS_M;
    let eote = (c - n2 * rp).try_normalize(0.0)? * EARTH_RADIUS_M;
    let turn_angle = 2.0 * asin_safe((bote - eote).norm() / rp / 2.0);

    let to_pos = |v: &Vector3<f64>| {
        let (lat, lon) = xyz_to_spherical(v);
        Position::lla(lat, lon, p1.alt)
    };
    let bot = to_pos(&bote);
    let eot = to_pos(&eote);
    let center = to_pos(&c);
    let vertex = Position::lla(p2.lat, p2.lon, p1.alt);
    let mot = center.linear_dist_2d(center.initial_course(&vertex), center.distance_h(&bot));
    let start = Position::lla(p1.lat, p1.lon, p1.alt);
    let end = Position::lla(p3.lat, p3.lon, p1.alt);
    Some(TurnGeometry {
        bot,
        mot,
        eot,
        dir: turn_direction(start.final_course(&vertex), vertex.initial_course(&end)),
        arc_length: rp * turn_angle,
        center,
    })
}

fn turn_tangent(p1: &Position, p2: &Position, p3: &Position, radius: f64) -> Option<TurnGeometry> {
    let trk_in = p1.final_course(p2);
    let trk_out = p2.initial_course(p3);
    let delta = turn_delta(trk_in, trk_out);
    if !(delta > 0.0) || delta >= PI {
        return None;
    }
    let dir = turn_direction(trk_in, trk_out);
    let theta = delta / 2.0;
    let along = radius * theta.tan();
    let to_center = radius / theta.cos();
    let center_trk = trk_in + dir * (delta + PI) / 2.0;
    let alt = p1.alt();
    Some(TurnGeometry {
        bot: p2.linear_dist_2d(p2.initial_course(p1), along).with_alt(alt),
        mot: p2.linear_dist_2d(center_trk, to_center - radius).with_alt(alt),
        eot: p2.linear_dist_2d(trk_out, along).with_alt(alt),
        dir,
        arc_length: delta * radius,
        center: p2.linear_dist_2d(center_trk, to_center).with_alt(alt),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::nautical_miles;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_euclidean_right_angle() {
        let nm10 = nautical_miles(10.0);
        let p1 = Position::xyz(0.0, 0.0, 100.0);
        let p2 = Position::xyz(nm10, 0.0, 100.0);
        let p3 = Position::xyz(nm10, nm10, 100.0);
        let r = 3000.0;
        let t = turn_generator(&p1, &p2, &p3, r, TurnCenterMethod::Chordal).unwrap();
        // eastbound then northbound is a left turn
        assert_eq!(t.dir, -1.0);
        assert!(t.bot.distance_h(&Position::xyz(nm10 - r, 0.0, 0.0)) < 1e-6, "bot {:?}", t.bot);
        assert!(t.eot.distance_h(&Position::xyz(nm10, r, 0.0)) < 1e-6, "eot {:?}", t.eot);
        assert!(t.center.distance_h(&Position::xyz(nm10 - r, r, 0.0)) < 1e-6);
        assert!((t.arc_length - FRAC_PI_2 * r).abs() < 1e-6);
        assert!((t.center.distance_h(&t.mot) - r).abs() < 1e-6);
    }

    #[test]
    fn test_straight_and_bad_radius_are_rejected() {
        let p1 = Position::xyz(0.0, 0.0, 0.0);
        let p2 = Position::xyz(1000.0, 0.0, 0.0);
        let p3 = Position::xyz(2000.0, 0.0, 0.0);
        assert!(turn_generator(&p1, &p2, &p3, 500.0, TurnCenterMethod::Chordal).is_none());
        let p3 = Position::xyz(1000.0, 1000.0, 0.0);
        assert!(turn_generator(&p1, &p2, &p3, -1.0, TurnCenterMethod::Chordal).is_none());
        assert!(turn_generator(&p1, &p2, &p3, 0.0, TurnCenterMethod::Chordal).is_none());
    }

    #[test]
    fn test_geodetic_methods_agree_on_small_turn() {
        let p2 = Position::lla(35.0, -100.0, 3000.0);
        let p1 = p2.linear_dist_2d(PI, 20_000.0);
        let p3 = p2.linear_dist_2d(FRAC_PI_2, 20_000.0);
        let r = 2500.0;
        let chordal = turn_generator(&p1, &p2, &p3, r, TurnCenterMethod::Chordal).unwrap();
        let tangent = turn_generator(&p1, &p2, &p3, r, TurnCenterMethod::Tangent).unwrap();
        assert_eq!(chordal.dir, 1.0);
        assert_eq!(tangent.dir, 1.0);
        for (a, b) in [
            (chordal.bot, tangent.bot),
            (chordal.eot, tangent.eot),
            (chordal.center, tangent.center),
        ] {
            assert!(a.distance_h(&b) < 1.0, "{a:?} vs {b:?}");
        }
        assert!((chordal.center.distance_h(&chordal.bot) - r).abs() < 0.5);
        assert!((chordal.arc_length - FRAC_PI_2 * r).abs() < 1.0);
        // BOT on the inbound leg, EOT on the outbound one
        assert!((p2.distance_h(&chordal.bot) - r).abs() < 1.0);
        assert!((p2.distance_h(&chordal.eot) - r).abs() < 1.0);
    }

    #[test]
    fn test_timed_turn_is_symmetric_about_vertex() {
        let np1 = NavPoint::new(Position::xyz(0.0, 0.0, 0.0), 0.0);
        let np2 = NavPoint::new(Position::xyz(10_000.0, 0.0, 1000.0), 100.0);
        let np3 = NavPoint::new(Position::xyz(10_000.0, 10_000.0, 1000.0), 200.0);
        let tt = turn_generator_timed(&np1, &np2, &np3, 2000.0, TurnCenterMethod::Chordal).unwrap();
        let half = 0.25 * PI * 2000.0 / 100.0;
        assert!((tt.bot.time - (100.0 - half)).abs() < 1e-9);
        assert!((tt.eot.time - (100.0 + half)).abs() < 1e-9);
        assert_eq!(tt.mot.time, 100.0);
        assert!((tt.bot.position.alt() - (1000.0 - 10.0 * half)).abs() < 1e-9);
        assert_eq!(tt.eot.position.alt(), 1000.0);

        let late = np1.with_time(150.0);
        assert!(turn_generator_timed(&late, &np2, &np3, 2000.0, TurnCenterMethod::Chordal).is_none());
    }
}
