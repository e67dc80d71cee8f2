//! Pre-generation repairs of the linear plan.
//!
//! Repairs never fail the run: anything they cannot fix is left for the
//! generation stages to report.

use crate::config::TrajGenConfig;
use crate::cursor::TimeIndexed;
use crate::diagnostics::DiagnosticKind;
use crate::plan::Plan;
use crate::position::NavPoint;
use crate::trajgen::calc_radius;
use crate::turn::turn_generator;
use crate::units::{almost_zero, fpm, knots, turn_delta};

/// Run the repairs switched on in `config`.
pub fn repair_plan(plan: &mut Plan, config: &TrajGenConfig) {
    if config.repair_turn {
        let repaired = linear_repair_short_turn_legs(plan, config);
        *plan = repaired;
    }
    if config.repair_vs {
        make_vs_short_legs_continuous(plan, config.vs_accel, config.limits.min_vs_delta);
    }
}

/// Replace pairs of vertices whose turns would overlap with one vertex at
/// their midpoint.
pub fn linear_repair_short_turn_legs(plan: &Plan, config: &TrajGenConfig) -> Plan {
    let mut out = plan.clone();
    let min_trk = config.limits.min_trk_delta;
    let mut j = 0;
    while j + 3 < plan.len() {
        if almost_zero(plan.gs_in(j + 1)) || almost_zero(plan.gs_in(j + 2)) {
            j += 1;
            continue;
        }
        let delta1 = turn_delta(plan.trk_in(j + 1), plan.trk_out(j + 1));
        let delta2 = turn_delta(plan.trk_in(j + 2), plan.trk_out(j + 2));
        if delta1 <= min_trk || delta2 <= min_trk {
            j += 1;
            continue;
        }
        let (p0, p1, p2, p3) = (plan.pos(j), plan.pos(j + 1), plan.pos(j + 2), plan.pos(j + 3));
        let r1 = calc_radius(plan, j + 1, config.bank_angle);
        let r2 = calc_radius(plan, j + 2, config.bank_angle);
        let (Some(turn1), Some(turn2)) = (
            turn_generator(p0, p1, p2, r1, config.turn_center),
            turn_generator(p1, p2, p3, r2, config.turn_center),
        ) else {
            j += 1;
            continue;
        };
        if p1.distance_h(&turn1.eot) <= p1.distance_h(&turn2.bot) {
            j += 1;
            continue;
        }

        let (Some(ix0), Some(ix1), Some(ix2)) = (
            out.index_of_time(plan.time(j)),
            out.index_of_time(plan.time(j + 1)),
            out.index_of_time(plan.time(j + 2)),
        ) else {
            j += 1;
            continue;
        };
        let gs_out = out.gs_out(ix0);
        let first = out.get(ix1).clone();
        let second = out.get(ix2).clone();
        out.remove(ix2);
        out.remove(ix1);

        let mid = first.point.position.mid_point(&second.point.position);
        let t_mid = out.time(ix0) + out.pos(ix0).distance_h(&mid) / gs_out;
        let mut tcp = first.tcp;
        tcp.append_info(&second.tcp.info);
        let name = format!("{}{}", first.point.name, second.point.name);
        out.add(NavPoint::named(mid, t_mid, name), tcp);
        if gs_out > 0.0 {
            out.mk_gs_constant(ix0, ix0 + 2, gs_out);
        }
        out.add_warning(
            DiagnosticKind::TurnOverlap,
            format!("turns at {} and {} overlap, replaced by their midpoint", j + 1, j + 2),
            Some(ix0 + 1),
        );
        tracing::debug!(first = j + 1, second = j + 2, "folded short turn leg");
        j += 2;
    }
    out
}

/// Smooth vertices whose vertical-speed change cannot complete before the
/// next one starts, making vertical speed continuous through them.
pub fn make_vs_short_legs_continuous(plan: &mut Plan, vs_accel: f64, min_vs_delta: f64) {
    let accel = vs_accel.abs();
    if !(accel > 0.0) || plan.len() < 3 {
        return;
    }
    let mut end = plan.len() - 1;
    let mut i = 1;
    while i + 1 < end {
        let dt_avail = plan.time(i + 1) - plan.time(i);
        let vs_im1 = plan.vs_out(i - 1);
        let vs_i = plan.vs_out(i);
        let vs_ip1 = plan.vs_out(i + 1);
        let significant = |d: f64| if d < min_vs_delta { 0.0 } else { d };
        let delta_i = significant((vs_i - vs_im1).abs());
        let delta_ip1 = significant((vs_ip1 - vs_i).abs());
        let needed = (delta_i + delta_ip1) / (2.0 * accel);
        let next_to_cruise = vs_i.abs() < fpm(10.0);
        if needed >= dt_avail && !next_to_cruise {
            let ix = if delta_ip1 < delta_i { i + 1 } else { i };
            if plan.gs_out(ix).abs() > knots(1.0) && mk_vs_continuous_at(plan, ix) {
                end -= 1;
            }
        }
        i += 1;
    }
}

/// Move the altitude of `i` onto the straight climb between its neighbors,
/// then drop the point if nothing else distinguishes it. Returns true when
/// the point was removed.
pub fn mk_vs_continuous_at(plan: &mut Plan, i: usize) -> bool {
    if i == 0 || i + 1 >= plan.len() {
        return false;
    }
    let (t_prev, t_next) = (plan.time(i - 1), plan.time(i + 1));
    let vs = (plan.alt(i + 1) - plan.alt(i - 1)) / (t_next - t_prev);
    let alt = plan.alt(i - 1) + vs * (plan.time(i) - t_prev);
    plan.set_alt(i, alt);
    plan.remove_if_redundant(i, true, true, false).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    fn plan_of(points: &[(f64, f64, f64, f64)]) -> Plan {
        let mut p = Plan::new("repair");
        for &(x, y, z, t) in points {
            p.add_position(Position::xyz(x, y, z), t);
        }
        p
    }

    #[test]
    fn test_short_turn_legs_are_folded() {
        // a zig-zag with a 300 m middle leg at 150 m/s: both turns need kilometers
        let p = plan_of(&[
            (0.0, 0.0, 1000.0, 0.0),
            (6000.0, 0.0, 1000.0, 40.0),
            (6000.0, 300.0, 1000.0, 42.0),
            (12_000.0, 300.0, 1000.0, 82.0),
        ]);
        let repaired = linear_repair_short_turn_legs(&p, &TrajGenConfig::default());
        assert_eq!(repaired.len(), 3);
        assert!((repaired.pos(1).distance_h(&Position::xyz(6000.0, 150.0, 1000.0))) < 1e-6);
        assert!(repaired.warnings().any(|d| d.kind == DiagnosticKind::TurnOverlap));
        assert!(!repaired.has_error());
    }

    #[test]
    fn test_wide_legs_are_kept() {
        let p = plan_of(&[
            (0.0, 0.0, 1000.0, 0.0),
            (20_000.0, 0.0, 1000.0, 100.0),
            (20_000.0, 20_000.0, 1000.0, 200.0),
            (40_000.0, 20_000.0, 1000.0, 300.0),
        ]);
        let repaired = linear_repair_short_turn_legs(&p, &TrajGenConfig::default());
        assert_eq!(repaired.len(), 4);
    }

    #[test]
    fn test_vs_continuous_removes_plain_vertex() {
        // 0 -> 100 m in 10 s, then 100 -> 300 m in 10 s, all straight and level speed
        let mut p = plan_of(&[
            (0.0, 0.0, 0.0, 0.0),
            (1000.0, 0.0, 100.0, 10.0),
            (2000.0, 0.0, 300.0, 20.0),
            (3000.0, 0.0, 300.0, 30.0),
        ]);
        assert!(mk_vs_continuous_at(&mut p, 1));
        assert_eq!(p.len(), 3);
        assert_eq!(p.time(1), 20.0);
    }

    #[test]
    fn test_vs_continuous_keeps_named_vertex() {
        let mut p = plan_of(&[
            (0.0, 0.0, 0.0, 0.0),
            (1000.0, 0.0, 100.0, 10.0),
            (2000.0, 0.0, 300.0, 20.0),
        ]);
        p.set_name(1, "FIX");
        assert!(!mk_vs_continuous_at(&mut p, 1));
        assert_eq!(p.len(), 3);
        assert!((p.alt(1) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_vs_legs_smoothed_only_when_enabled() {
        let base = plan_of(&[
            (0.0, 0.0, 0.0, 0.0),
            (1000.0, 0.0, 100.0, 10.0),
            (1200.0, 0.0, 200.0, 12.0),
            (2200.0, 0.0, 200.0, 22.0),
        ]);
        let mut off = base.clone();
        repair_plan(&mut off, &TrajGenConfig::default());
        assert_eq!(off.len(), 4);

        let mut on = base.clone();
        let config = TrajGenConfig {
            repair_vs: true,
            ..TrajGenConfig::default()
        };
        repair_plan(&mut on, &config);
        assert!(on.len() < 4);
    }
}
