//! Random linear routes for trying the generator out.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trajgen_core::units::{feet, fpm, knots, nautical_miles};
use trajgen_core::{NavPoint, Plan, Position};

/// Route starting point (KSFO area).
const ORIGIN_LAT: f64 = 37.6189;
const ORIGIN_LON: f64 = -122.3750;

/// Build a geodetic route of `legs` legs. Legs run 8-20 NM with heading
/// changes up to 70°, speeds 220-320 kn and climbs or descents up to
/// 1500 fpm.
pub fn random_route(seed: u64, legs: usize) -> Plan {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut plan = Plan::new(format!("demo-{seed}"));
    plan.note = format!("random route, seed {seed}");

    let mut pos = Position::lla(ORIGIN_LAT, ORIGIN_LON, feet(5000.0));
    let mut t = 0.0;
    let mut heading: f64 = rng.random_range(0.0..360.0);
    plan.add(NavPoint::named(pos, t, "WP0"), Default::default());

    for k in 1..=legs {
        let dist = nautical_miles(rng.random_range(8.0..20.0));
        let gs = knots(rng.random_range(220.0..320.0));
        let dt = dist / gs;
        let vs = if rng.random_bool(0.4) {
            fpm(rng.random_range(-1500.0..1500.0))
        } else {
            0.0
        };
        let alt = (pos.alt() + vs * dt).clamp(feet(1000.0), feet(40_000.0));
        pos = pos.linear_dist_2d(heading.to_radians(), dist).with_alt(alt);
        t += dt;
        plan.add(NavPoint::named(pos, t, format!("WP{k}")), Default::default());

        let change: f64 = rng.random_range(0.0..70.0);
        heading += if rng.random_bool(0.5) { change } else { -change };
    }
    tracing::debug!(seed, legs, points = plan.len(), "demo route built");
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_is_reproducible() {
        let a = random_route(42, 5);
        let b = random_route(42, 5);
        assert_eq!(a.len(), 6);
        assert_eq!(a.points(), b.points());
        assert!((1..a.len()).all(|i| a.time(i) > a.time(i - 1)));
    }
}
