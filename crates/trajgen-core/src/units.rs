//! Unit conversions and numeric helpers.
//!
//! Everything inside the engine is SI: meters, seconds, meters per second and
//! radians. Aviation units only appear at the edges (thresholds, test fixtures).

use std::f64::consts::PI;

/// Meters in one nautical mile.
pub const NM: f64 = 1852.0;
/// Meters per second in one knot.
pub const KNOT: f64 = NM / 3600.0;
/// Meters in one foot.
pub const FOOT: f64 = 0.3048;
/// Meters per second in one foot per minute.
pub const FPM: f64 = FOOT / 60.0;
/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.80665;

/// Relative tolerance used for "equal within floating error" comparisons.
pub const PRECISION13: f64 = 1e-13;
/// Coarser tolerance used for near-zero speed checks.
pub const PRECISION5: f64 = 1e-5;

pub fn knots(v: f64) -> f64 {
    v * KNOT
}

pub fn to_knots(mps: f64) -> f64 {
    mps / KNOT
}

pub fn nautical_miles(v: f64) -> f64 {
    v * NM
}

pub fn feet(v: f64) -> f64 {
    v * FOOT
}

pub fn fpm(v: f64) -> f64 {
    v * FPM
}

pub fn to_fpm(mps: f64) -> f64 {
    mps / FPM
}

/// True when `a` and `b` agree within `eps` relative to their magnitude
/// (absolute near zero).
pub fn almost_equals(a: f64, b: f64, eps: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= eps * scale
}

pub fn almost_zero(a: f64) -> bool {
    almost_equals(a, 0.0, PRECISION13)
}

pub fn sqrt_safe(x: f64) -> f64 {
    x.max(0.0).sqrt()
}

pub fn asin_safe(x: f64) -> f64 {
    x.clamp(-1.0, 1.0).asin()
}

/// Root of `a·x² + b·x + c = 0`; `eps` (+1 or -1) selects which root.
///
/// Degenerates to the linear root when `a == 0`. Returns NaN when no real
/// root exists.
pub fn root(a: f64, b: f64, c: f64, eps: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return f64::NAN;
    }
    if a == 0.0 {
        return -c / b;
    }
    let sqb = b * b;
    let ac = 4.0 * a * c;
    if almost_equals(sqb, ac, PRECISION13) || sqb > ac {
        (-b + eps * sqrt_safe(sqb - ac)) / (2.0 * a)
    } else {
        f64::NAN
    }
}

/// Normalize an angle to `[0, 2π)`.
pub fn to_2pi(rad: f64) -> f64 {
    let r = rad.rem_euclid(2.0 * PI);
    if r >= 2.0 * PI {
        0.0
    } else {
        r
    }
}

/// Normalize an angle to `(-π, π]`.
pub fn to_pi(rad: f64) -> f64 {
    let r = to_2pi(rad);
    if r > PI {
        r - 2.0 * PI
    } else {
        r
    }
}

/// Unsigned smallest angle needed to turn from track `a` to track `b`.
pub fn turn_delta(a: f64, b: f64) -> f64 {
    to_pi(b - a).abs()
}

/// +1 for a right (clockwise) turn from `a` to `b`, -1 for a left turn.
pub fn turn_direction(a: f64, b: f64) -> f64 {
    if to_pi(b - a) >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Turn radius for a coordinated turn at ground speed `gs` and bank angle `bank`.
pub fn turn_radius(gs: f64, bank: f64) -> f64 {
    let tan = bank.abs().tan();
    if tan <= 0.0 {
        return f64::INFINITY;
    }
    gs * gs / (GRAVITY * tan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_selects_branch() {
        // x² - 3x + 2 = (x - 1)(x - 2)
        assert!((root(1.0, -3.0, 2.0, 1.0) - 2.0).abs() < 1e-12);
        assert!((root(1.0, -3.0, 2.0, -1.0) - 1.0).abs() < 1e-12);
        assert!((root(0.0, 2.0, -4.0, 1.0) - 2.0).abs() < 1e-12);
        assert!(root(1.0, 0.0, 1.0, 1.0).is_nan());
        assert!(root(0.0, 0.0, 1.0, 1.0).is_nan());
    }

    #[test]
    fn test_angle_normalization() {
        assert!((to_2pi(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
        assert!((to_pi(1.5 * PI) + PI / 2.0).abs() < 1e-12);
        assert!((turn_delta(350f64.to_radians(), 10f64.to_radians()) - 20f64.to_radians()).abs() < 1e-12);
        assert_eq!(turn_direction(350f64.to_radians(), 10f64.to_radians()), 1.0);
        assert_eq!(turn_direction(10f64.to_radians(), 350f64.to_radians()), -1.0);
    }

    #[test]
    fn test_turn_radius_matches_coordinated_turn() {
        let gs = knots(300.0);
        let r = turn_radius(gs, 20f64.to_radians());
        let expected = gs * gs / (GRAVITY * 20f64.to_radians().tan());
        assert!((r - expected).abs() < 1e-9, "radius {r}");
        assert!(turn_radius(gs, 0.0).is_infinite());
    }

    #[test]
    fn test_almost_equals_scales() {
        assert!(almost_equals(1e6, 1e6 + 1e-8, PRECISION13));
        assert!(!almost_equals(1.0, 1.001, PRECISION5));
        assert!(almost_zero(1e-15));
    }
}
