//! Linear-to-kinematic plan conversion.
//!
//! [`make_kinematic_plan`] runs the stages in order: close-point merge,
//! optional repairs, AltPreserve marking, turns, ground-speed transitions,
//! constant vertical speed between anchors, vertical-speed transitions and a
//! final cleanup. A stage that records an error stops the pipeline; the
//! partial plan is returned with its diagnostics.

use crate::config::{GenerationLimits, TrajGenConfig};
use crate::cursor::{HighestFirst, TimeIndexed};
use crate::diagnostics::DiagnosticKind;
use crate::error::TrajGenError;
use crate::plan::{Plan, PlanPoint};
use crate::position::{NavPoint, Position, Velocity};
use crate::repair;
use crate::spatial::to_chordal_radius;
use crate::tcp::{SourceRef, TcpData, MANUAL_GS_ACCEL, MANUAL_RADIUS, MANUAL_VS_ACCEL};
use crate::turn::turn_generator;
use crate::units::{almost_equals, almost_zero, turn_delta, turn_radius, PRECISION5};

pub const PARAM_BANK_ANGLE: &str = "TRAJGEN_bank_angle";
pub const PARAM_GS_ACCEL: &str = "TRAJGEN_gs_accel";
pub const PARAM_VS_ACCEL: &str = "TRAJGEN_vs_accel";

/// Scratch offset used to move trailing points out of the way while the
/// points inside a transition are retimed.
const SHIFT_CLEAR: f64 = 1000.0;

/// EOTs closer than this to the preceding point are folded into it (m).
const EOT_MERGE_DIST: f64 = 1.1e-3;

/// Convert a linear plan into a kinematic one.
///
/// Errors are recorded on the returned plan; use
/// [`make_kinematic_plan_checked`] for a `Result`.
pub fn make_kinematic_plan(linear: &Plan, config: &TrajGenConfig) -> Plan {
    let mut plan = linear.clone();
    if let Err(e) = config.validate() {
        plan.add_error(DiagnosticKind::InvalidAccel, e.to_string(), None);
        return finish(plan, linear, config);
    }
    stamp_sources(&mut plan);
    plan.merge_close_points(config.limits.min_dt);
    if plan.len() < 2 || plan.has_error() {
        return finish(plan, linear, config);
    }

    repair::repair_plan(&mut plan, config);
    tracing::debug!(plan = %plan.name, points = plan.len(), "repair pass complete");

    let stages: [(&str, fn(&mut Plan, &TrajGenConfig)); 5] = [
        ("mark_vs_changes", |p, c| mark_vs_changes(p, &c.limits)),
        ("turns", generate_turn_tcps),
        ("ground_speed", generate_gs_tcps),
        ("marked_vs_constant", |p, _| make_marked_vs_constant(p)),
        ("vertical_speed", generate_vs_tcps),
    ];
    for (stage, run) in stages {
        run(&mut plan, config);
        if plan.has_error() {
            tracing::info!(plan = %plan.name, stage, "generation halted");
            return finish(plan, linear, config);
        }
        tracing::info!(plan = %plan.name, stage, points = plan.len(), "stage complete");
    }
    plan.clean_plan(config.limits.min_dt);
    finish(plan, linear, config)
}

/// [`make_kinematic_plan`], mapping the first recorded error to `Err`.
pub fn make_kinematic_plan_checked(linear: &Plan, config: &TrajGenConfig) -> Result<Plan, TrajGenError> {
    make_kinematic_plan(linear, config).into_result()
}

fn finish(mut plan: Plan, linear: &Plan, config: &TrajGenConfig) -> Plan {
    plan.note = linear.note.clone();
    add_params(&mut plan, config);
    plan
}

/// Record the generation limits on the plan.
pub fn add_params(plan: &mut Plan, config: &TrajGenConfig) {
    plan.params.insert(PARAM_BANK_ANGLE.to_string(), config.bank_angle);
    plan.params.insert(PARAM_GS_ACCEL.to_string(), config.gs_accel);
    plan.params.insert(PARAM_VS_ACCEL.to_string(), config.vs_accel);
}

/// Configuration rebuilt from the limits stored by [`add_params`].
pub fn stored_config(plan: &Plan) -> Option<TrajGenConfig> {
    let bank = *plan.params.get(PARAM_BANK_ANGLE)?;
    let gs = *plan.params.get(PARAM_GS_ACCEL)?;
    let vs = *plan.params.get(PARAM_VS_ACCEL)?;
    Some(TrajGenConfig::new(bank, gs, vs))
}

/// Give every point without one a source reference to itself.
pub fn stamp_sources(plan: &mut Plan) {
    for i in 0..plan.len() {
        if plan.tcp(i).source.is_none() {
            let source = SourceRef {
                position: *plan.pos(i),
                time: plan.time(i),
            };
            plan.tcp_mut(i).source = Some(source);
        }
    }
}

/// Rebuild the linear plan a kinematic plan was generated from.
///
/// Points without a source (generated ones) are dropped; the rest return to
/// their source position and time with names, info and overrides restored.
pub fn make_linear_plan(plan: &Plan) -> Plan {
    if plan.points().iter().all(|pp| pp.tcp.source.is_none()) {
        let mut copy = Plan::from_points(plan.name.clone(), plan.points().iter().cloned());
        copy.note = plan.note.clone();
        return copy;
    }
    let mut out = Plan::new(plan.name.clone());
    out.note = plan.note.clone();
    for pp in plan.points() {
        let Some(source) = &pp.tcp.source else {
            continue;
        };
        if out.index_of_time(source.time).is_some() {
            continue;
        }
        let tcp = TcpData {
            source: Some(source.clone()),
            overrides: pp.tcp.overrides,
            info: strip_generated_info(&pp.tcp.info),
            ..TcpData::default()
        };
        out.add(
            NavPoint::named(source.position, source.time, pp.point.name.clone()),
            tcp,
        );
    }
    out
}

fn strip_generated_info(info: &str) -> String {
    [MANUAL_RADIUS, MANUAL_GS_ACCEL, MANUAL_VS_ACCEL]
        .iter()
        .fold(info.to_string(), |s, flag| s.replace(flag, ""))
}

// ---- vertical marking ------------------------------------------------------

/// Flag points where vertical speed changes, or that start a long leg, as
/// AltPreserve anchors.
pub fn mark_vs_changes(plan: &mut Plan, limits: &GenerationLimits) {
    if plan.len() < 2 {
        plan.add_error(
            DiagnosticKind::InvalidInput,
            format!("plan {} is too small for kinematic conversion", plan.name),
            None,
        );
        return;
    }
    for i in 1..plan.len() {
        let vs1 = plan.vs_out(i - 1);
        let vs2 = plan.vs_out(i);
        if vs1.abs() > limits.max_vs {
            plan.add_warning(
                DiagnosticKind::ExcessiveVerticalSpeed,
                format!("input vertical speed {vs1:.2} m/s exceeds {:.2} m/s", limits.max_vs),
                Some(i - 1),
            );
        }
        let leg_time = if i + 1 < plan.len() {
            plan.time(i + 1) - plan.time(i)
        } else {
            0.0
        };
        if (vs1 - vs2).abs() > 0.1 * limits.min_vs_delta || leg_time >= limits.min_mark_leg_time {
            plan.tcp_mut(i).alt_preserve = true;
        }
    }
}

/// Between consecutive AltPreserve anchors (and the last point), set every
/// altitude so vertical speed is constant.
pub fn make_marked_vs_constant(plan: &mut Plan) {
    let mut prev = 0;
    for i in 1..plan.len() {
        if !(plan.tcp(i).alt_preserve || i == plan.len() - 1) {
            continue;
        }
        let (t0, alt0) = (plan.time(prev), plan.alt(prev));
        let vs = (plan.alt(i) - alt0) / (plan.time(i) - t0);
        for j in prev + 1..i {
            let alt = alt0 + vs * (plan.time(j) - t0);
            plan.set_alt(j, alt);
        }
        prev = i;
    }
}

// ---- turns -----------------------------------------------------------------

/// Turn radius at vertex `ix`: the per-point override, else the bank-angle radius.
pub fn calc_radius(plan: &Plan, ix: usize, bank_angle: f64) -> f64 {
    plan.vertex_radius(ix)
        .unwrap_or_else(|| turn_radius(plan.gs_in(ix), bank_angle))
}

/// True when the turn at `i` fits strictly inside the legs reaching the
/// neighboring track changes.
pub fn turn_can_be_inscribed(plan: &Plan, i: usize, bot: &Position, eot: &Position, straight: f64) -> bool {
    let vertex = plan.pos(i);
    let prev = plan.prev_track_change(i, straight);
    let next = plan.next_track_change(i, straight);
    bot.distance_h(vertex) < plan.pos(prev).distance_h(vertex)
        && vertex.distance_h(eot) < vertex.distance_h(plan.pos(next))
}

/// Insert BOT/EOT pairs, highest vertex first.
pub fn generate_turn_tcps(plan: &mut Plan, config: &TrajGenConfig) {
    let mut cursor = HighestFirst::over(plan, 1..plan.len().saturating_sub(1));
    while let Some(i) = cursor.next_index(plan) {
        if i == 0 || i + 1 >= plan.len() || plan.in_accel_zone(i) {
            continue;
        }
        if almost_zero(plan.gs_in(i)) {
            continue;
        }
        generate_turn_tcp_at(plan, i, config);
        if plan.has_error() {
            return;
        }
    }
}

fn generate_turn_tcp_at(plan: &mut Plan, ix: usize, config: &TrajGenConfig) {
    let limits = &config.limits;
    let delta = turn_delta(plan.trk_in(ix), plan.trk_out(ix));
    if delta < limits.min_trk_delta || !(plan.gs_out(ix) > 1e-10) {
        return;
    }
    let manual_radius = plan.vertex_radius(ix).is_some();
    let radius = calc_radius(plan, ix, config.bank_angle);

    let np1 = *plan.pos(ix - 1);
    let np2 = *plan.pos(ix);
    let np3 = if plan.time(ix + 1) - plan.time(ix) < 0.1 && ix + 2 < plan.len() {
        *plan.pos(ix + 2)
    } else {
        *plan.pos(ix + 1)
    };
    let label = match plan.point(ix).name.as_str() {
        "" => String::new(),
        name => format!(" ({name})"),
    };
    let Some(turn) = turn_generator(&np1, &np2, &np3, radius, config.turn_center) else {
        plan.add_error(
            DiagnosticKind::TurnGeometry,
            format!("turn points at {ix}{label} invalid"),
            Some(ix),
        );
        return;
    };
    let dist_bot = turn.bot.distance_h(&np2);
    let dist_eot = turn.eot.distance_h(&np2);
    let t_eot = plan.time_from_distance(ix, dist_eot);
    let surface_radius = turn.center.distance_h(&turn.bot);
    let signed_radius = turn.dir
        * if plan.is_geodetic() {
            to_chordal_radius(surface_radius)
        } else {
            surface_radius
        };

    if !turn_can_be_inscribed(plan, ix, &turn.bot, &turn.eot, limits.max_turn_delta_straight) {
        plan.add_error(
            DiagnosticKind::TurnInfeasible,
            format!(
                "cannot achieve turn at point {ix}{label} from surrounding points at time {:.2}",
                plan.time(ix)
            ),
            Some(ix),
        );
        return;
    }
    if plan.in_trk_change(t_eot) {
        plan.add_error(
            DiagnosticKind::TurnOverlap,
            format!("EOT in new turn overlaps existing turn in time at {ix}{label}"),
            Some(ix),
        );
        return;
    }

    let vertex_time = plan.time(ix);
    let Some(ix_bot) = plan.insert_by_distance(ix, -dist_bot) else {
        plan.add_error(DiagnosticKind::PlanEdit, format!("BOT overlaps point near {ix}"), Some(ix));
        return;
    };
    let gs_in = plan.gs_at_time(plan.time(ix_bot));
    let Some(ix_vertex) = plan.index_of_time(vertex_time) else {
        plan.add_error(DiagnosticKind::PlanEdit, format!("vertex {ix} lost while inserting BOT"), Some(ix));
        return;
    };
    let Some(ix_eot) = plan.insert_by_distance(ix_vertex, dist_bot) else {
        plan.add_error(DiagnosticKind::PlanEdit, format!("EOT overlaps point near {ix}"), Some(ix));
        return;
    };

    let bot_tcp = plan.tcp_mut(ix_bot);
    bot_tcp.set_bot(signed_radius, turn.center);
    if manual_radius {
        bot_tcp.append_info(MANUAL_RADIUS);
    }
    plan.tcp_mut(ix_eot).set_eot();
    let ix_eot = plan.merge_close_points_by_dist(ix_eot, EOT_MERGE_DIST);
    let Some(ix_vertex) = plan.index_of_time(vertex_time).filter(|&v| v > ix_bot && v < ix_eot) else {
        plan.add_error(DiagnosticKind::PlanEdit, format!("BOT/EOT overlaps point {ix}"), Some(ix));
        return;
    };
    tracing::debug!(
        vertex = ix,
        bot = ix_bot,
        eot = ix_eot,
        radius = signed_radius,
        "turn generated"
    );

    let Some((ix_eot, target_gs)) = move_points_within_turn(plan, ix_bot, ix_vertex, ix_eot, gs_in) else {
        plan.add_error(DiagnosticKind::PlanEdit, format!("EOT lost after turn at {ix}"), Some(ix));
        return;
    };
    plan.mk_gs_in(ix_bot, gs_in);
    plan.mk_gs_out(ix_eot, target_gs);
}

/// Move the points between BOT and EOT onto the arc, keeping each one's
/// fraction of the original along-track distance. The vertex becomes the MOT.
/// Returns the new EOT index and the ground speed that was flown into the EOT.
fn move_points_within_turn(
    plan: &mut Plan,
    ix_bot: usize,
    ix_vertex: usize,
    ix_eot: usize,
    gs_in: f64,
) -> Option<(usize, f64)> {
    let vertex = *plan.pos(ix_vertex);
    plan.set_mot(ix_vertex);
    let long_dist = plan.pos(ix_bot).distance_h(&vertex) + vertex.distance_h(plan.pos(ix_eot));

    let mut inner = Plan::new("turn");
    for j in (ix_bot + 1..=ix_eot).rev() {
        let PlanPoint { point, tcp } = plan.get(j).clone();
        inner.add(point, tcp);
    }
    plan.remove_range(ix_bot + 1, ix_eot - 1);
    let target_gs = inner.gs_in(inner.len() - 1);
    inner.add_point(plan.point(ix_bot).clone());

    let ratio = plan.path_distance(ix_bot) / long_dist;
    let t_bot = plan.time(ix_bot);
    plan.time_shift_plan(ix_bot + 1, SHIFT_CLEAR);
    for i in (1..inner.len() - 1).rev() {
        let PlanPoint { point, tcp } = inner.get(i).clone();
        let d_i = ratio * inner.path_distance_between(0, i);
        let (pos, _) = plan.advance_distance_2d(ix_bot, d_i);
        let moved = NavPoint::named(pos.with_alt(point.position.alt()), t_bot + d_i / gs_in, point.name);
        plan.add(moved, tcp);
    }
    for i in 0..inner.len() - 1 {
        plan.mk_gs_out(ix_bot + i, inner.gs_out(i));
    }
    plan.next_eot(ix_bot).map(|e| (e, target_gs))
}

// ---- ground speed ----------------------------------------------------------

/// Acceleration magnitude for point `i`: its override (flagged on the
/// point) or the global limit.
fn gs_accel_for(plan: &mut Plan, i: usize, default: f64) -> f64 {
    match plan.tcp(i).overrides.gs_accel.map(f64::abs).filter(|a| *a > 0.0) {
        Some(a) => {
            plan.append_info(i, MANUAL_GS_ACCEL);
            a
        }
        None => default,
    }
}

/// Insert BGS/EGS pairs wherever ground speed jumps.
pub fn generate_gs_tcps(plan: &mut Plan, config: &TrajGenConfig) {
    let mut i = 1;
    while i < plan.len() {
        if plan.tcp(i).is_gs_tcp() {
            i += 1;
            continue;
        }
        let accel = gs_accel_for(plan, i, config.gs_accel);
        let target = plan.gs_out(i);
        let gs_in = plan.gs_in(i);
        if (target - gs_in).abs() > config.limits.min_gs_delta {
            if almost_equals(target, 0.0, PRECISION5) {
                if let Some(ix_egs) = generate_gs_to_zero(plan, i, accel, target, config.limits.min_dt)
                    .and_then(|ix_bgs| plan.next_egs(ix_bgs))
                {
                    i = ix_egs;
                }
            } else {
                generate_gs_tcps_at(plan, i, accel, config);
                if let Some(ix_egs) = plan.next_egs(i) {
                    i = ix_egs;
                }
            }
            if plan.has_error() {
                return;
            }
        }
        i += 1;
    }
}

/// Nearest later point where ground speed changes by more than
/// `min_gs_delta`, or the last point.
fn next_gs_change(plan: &Plan, i: usize, min_gs_delta: f64) -> usize {
    let last = plan.len().saturating_sub(1);
    (i + 1..last)
        .find(|&k| plan.tcp(k).is_bgs() || (plan.gs_out(k) - plan.gs_in(k)).abs() > min_gs_delta)
        .unwrap_or(last)
}

/// Time and distance to go from `gs_in` to `target` at acceleration `a`.
fn accel_span(gs_in: f64, target: f64, a: f64) -> (f64, f64) {
    let t = (target - gs_in) / a;
    (t, gs_in * t + 0.5 * a * t * t)
}

fn generate_gs_tcps_at(plan: &mut Plan, ix_bgs: usize, accel: f64, config: &TrajGenConfig) {
    let limits = &config.limits;
    let gs_in = plan.gs_in(ix_bgs);
    let mut target = plan.gs_out(ix_bgs);
    let a = if gs_in > target { -accel.abs() } else { accel.abs() };
    let (mut accel_time, mut needed) = accel_span(gs_in, target, a);
    let next_change = next_gs_change(plan, ix_bgs, limits.min_gs_delta);
    let mut fitted = needed < plan.path_distance_between(ix_bgs, next_change);
    if !fitted && config.repair_gs {
        // run on through later vertices while they keep changing speed the same way
        for j in next_change + 1..plan.len() {
            let candidate = plan.gs_out(j - 1);
            let delta = candidate - gs_in;
            if delta * a <= 0.0 || delta.abs() <= limits.min_gs_delta {
                break;
            }
            target = candidate;
            (accel_time, needed) = accel_span(gs_in, target, a);
            if needed < plan.path_distance_between(ix_bgs, j) {
                fitted = true;
                tracing::debug!(bgs = ix_bgs, through = j - 1, "ground-speed transition extended");
                break;
            }
        }
    }
    if !fitted {
        let until = if next_change + 1 == plan.len() {
            "end of plan".to_string()
        } else {
            format!("next speed change at {next_change}")
        };
        plan.add_error(
            DiagnosticKind::GsAccelDistance,
            format!("cannot complete acceleration at i = {ix_bgs} before {until}"),
            Some(ix_bgs),
        );
        return;
    }
    if needed < limits.min_gs_transition_dist {
        plan.add_warning(
            DiagnosticKind::GsAccelDistance,
            format!("ground-speed transition at {ix_bgs} is only {needed:.2} m, left as a step"),
            Some(ix_bgs),
        );
        return;
    }
    let t0 = plan.time(ix_bgs);
    let (egs_pos, _) = plan.advance_distance(ix_bgs, needed);
    let egs = NavPoint::new(egs_pos, t0 + accel_time);
    let mut egs_tcp = TcpData::default();
    egs_tcp.set_egs();
    plan.tcp_mut(ix_bgs).set_bgs(a);
    tracing::debug!(bgs = ix_bgs, accel = a, distance = needed, "ground-speed transition");
    if !adjust_gs_inside_accel(plan, ix_bgs, a, needed) {
        return;
    }
    let Some(ix_egs) = plan.add(egs, egs_tcp) else {
        plan.add_error(
            DiagnosticKind::PlanEdit,
            format!("EGS for the transition at {ix_bgs} conflicts with an existing point"),
            Some(ix_bgs),
        );
        return;
    };
    if ix_egs + 1 < plan.len() && !plan.mk_gs_in(ix_egs + 1, target) {
        plan.add_error(
            DiagnosticKind::PlanEdit,
            format!("cannot resume ground speed {target:.2} m/s after EGS at {ix_egs}"),
            Some(ix_egs + 1),
        );
    }
}

/// Retime every point less than `dist_to_egs` past the BGS for constant
/// acceleration `a`. Fails (clearing the BGS) if another BGS lies inside.
fn adjust_gs_inside_accel(plan: &mut Plan, ix_bgs: usize, a: f64, dist_to_egs: f64) -> bool {
    let gs_bgs = plan.gs_in(ix_bgs);
    let mut last_inside = ix_bgs;
    for ii in ix_bgs + 1..plan.len() {
        if plan.path_distance_between(ix_bgs, ii) < dist_to_egs {
            last_inside = ii;
        } else {
            break;
        }
        if plan.tcp(ii).is_bgs() {
            plan.add_error(
                DiagnosticKind::GsAccelOverlap,
                format!("ground-speed transition overlap: BGS at {ii}"),
                Some(ii),
            );
            plan.tcp_mut(ix_bgs).clear_bgs();
            return false;
        }
    }
    let t_bgs = plan.time(ix_bgs);
    plan.time_shift_plan(ix_bgs + 1, SHIFT_CLEAR);
    let mut ok = true;
    for j in ix_bgs + 1..=last_inside {
        let d_j = plan.path_distance_between(ix_bgs, j);
        let t_j = t_bgs + Plan::time_from_distance_accel(gs_bgs, a, d_j);
        if t_j.is_nan() {
            plan.add_error(
                DiagnosticKind::GsAccelDistance,
                format!("no time reaches point {j} inside the ground-speed transition"),
                Some(j),
            );
            ok = false;
        } else {
            plan.set_time(j, t_j);
        }
    }
    ok
}

/// Decelerate to a stop at point `i`, searching backward for room. Returns
/// the BGS index.
pub fn generate_gs_to_zero(
    plan: &mut Plan,
    i: usize,
    accel: f64,
    target: f64,
    min_dt: f64,
) -> Option<usize> {
    let accel = accel.abs();
    let mut gs_in = plan.gs_in(i);
    let mut needed = (gs_in - target) / accel * (gs_in + target) / 2.0;
    let mut back = 0.0;
    let mut b_seg = None;
    for j in (0..i).rev() {
        back += plan.path_distance(j);
        if back > needed {
            b_seg = Some(j);
            break;
        }
        if j > 0 {
            gs_in = plan.gs_out(j - 1);
        }
        needed = (gs_in - target) / accel * (gs_in + target) / 2.0;
    }
    let Some(b_seg) = b_seg else {
        plan.add_error(
            DiagnosticKind::GsToZero,
            format!("plan too short to decelerate to zero speed at {i}"),
            Some(i),
        );
        return None;
    };
    let offset = back - needed;
    let bgs_time = plan.time_from_distance(b_seg, offset);
    let (bgs_pos, _) = plan.advance_distance(b_seg, offset);
    plan.tcp_mut(i).set_egs();
    let mut bgs_tcp = TcpData::default();
    if plan.in_gs_change(bgs_time) {
        bgs_tcp.set_egs();
    }
    bgs_tcp.set_bgs(-accel);
    let Some(mut ix_bgs) = plan.add(NavPoint::new(bgs_pos, bgs_time), bgs_tcp) else {
        plan.add_error(DiagnosticKind::GsAccelOverlap, format!("BGS for stop at {i} overlaps"), Some(i));
        return None;
    };
    let mut ix_egs = i + 1;
    if ix_bgs > 0 && plan.merge_close_points_at(ix_bgs - 1, min_dt).is_some() {
        ix_bgs -= 1;
        ix_egs -= 1;
    }
    if ix_bgs > 0 {
        plan.mk_gs_in(ix_bgs, gs_in);
    }
    if ix_egs >= plan.len() || !plan.tcp(ix_egs).is_egs() {
        match plan.next_egs(ix_bgs) {
            Some(e) => ix_egs = e,
            None => return Some(ix_bgs),
        }
    }
    adjust_gs_inside_accel_to_egs(plan, ix_bgs, -accel, ix_egs);
    Some(ix_bgs)
}

/// Retime the points between a BGS and an already placed EGS for a stop at
/// the EGS, keeping the gap after the EGS.
fn adjust_gs_inside_accel_to_egs(plan: &mut Plan, ix_bgs: usize, a: f64, ix_egs: usize) {
    if ix_egs >= plan.len() {
        return;
    }
    let gap_after = if ix_egs + 1 < plan.len() {
        plan.time(ix_egs + 1) - plan.time(ix_egs)
    } else {
        0.0
    };
    let gs_bgs = plan.gs_in(ix_bgs);
    for ii in ix_bgs + 1..ix_egs {
        let tcp = plan.tcp_mut(ii);
        tcp.clear_bgs();
        tcp.clear_egs();
    }
    let t_bgs = plan.time(ix_bgs);
    plan.time_shift_plan(ix_bgs + 1, SHIFT_CLEAR);
    for j in ix_bgs + 1..ix_egs {
        let d_j = plan.path_distance_between(ix_bgs, j) - 1e-8;
        let t_j = t_bgs + Plan::time_from_distance_accel(gs_bgs, a, d_j);
        if t_j.is_nan() {
            plan.add_error(
                DiagnosticKind::GsToZero,
                format!("no time reaches point {j} while stopping"),
                Some(j),
            );
        } else {
            plan.set_time(j, t_j);
        }
    }
    let t_egs = t_bgs - gs_bgs / a;
    let Some(ix_egs) = plan.set_time(ix_egs, t_egs) else {
        return;
    };
    if ix_egs + 1 < plan.len() {
        let gap_now = plan.time(ix_egs + 1) - plan.time(ix_egs);
        plan.time_shift_plan(ix_egs + 1, gap_after - gap_now);
    }
}

// ---- direct to -------------------------------------------------------------

/// Seconds to hold the current velocity before turning toward the first
/// point of `plan`: the estimated turn time plus one second, at most half
/// the time left before that point.
pub fn direct_to_continue_time(plan: &Plan, so: &Position, vo: &Velocity, to: f64, bank_angle: f64) -> f64 {
    let Some(first) = plan.points().first() else {
        return f64::NAN;
    };
    let trk = if plan.len() > 1 {
        plan.trk_out(0)
    } else {
        so.initial_course(&first.point.position)
    };
    let est_turn_time = if vo.gs > 0.0 {
        turn_delta(vo.trk, trk) * turn_radius(vo.gs, bank_angle) / vo.gs
    } else {
        0.0
    };
    (est_turn_time + 1.0).min((first.point.time - to) / 2.0)
}

/// Linear plan joining the current state `(so, vo, to)` to `plan`: a point
/// at the current state, a lead-in point along `vo`, then `plan`. The
/// first point of `plan` is skipped when the lead-in does not fit before it.
pub fn gen_direct_to_linear(plan: &Plan, so: Position, vo: Velocity, to: f64, bank_angle: f64) -> Plan {
    let mut lpc = plan.clone();
    if lpc.is_empty() {
        lpc.add_error(DiagnosticKind::InvalidInput, "direct-to needs a plan to join", None);
        return lpc;
    }
    let mut continue_tm = direct_to_continue_time(&lpc, &so, &vo, to, bank_angle);
    if continue_tm > lpc.first_time() - to && lpc.len() > 1 {
        tracing::debug!(plan = %lpc.name, "no room for the lead-in, joining at the second point");
        lpc.remove(0);
        continue_tm = direct_to_continue_time(&lpc, &so, &vo, to, bank_angle);
    }
    if continue_tm.is_nan() || continue_tm <= 0.0 {
        lpc.add_error(
            DiagnosticKind::InvalidInput,
            format!("current time {to:.3} leaves no time to join the plan"),
            Some(0),
        );
        return lpc;
    }
    let lead_pos = so
        .linear_dist_2d(vo.trk, vo.gs * continue_tm)
        .with_alt(so.alt() + vo.vs * continue_tm);
    let lead_in = NavPoint::new(lead_pos, to + continue_tm);
    if lpc.add_point(NavPoint::new(so, to)).is_none() || lpc.add_point(lead_in).is_none() {
        lpc.add_error(DiagnosticKind::PlanEdit, "could not add the direct-to lead-in", Some(0));
    }
    lpc
}

/// Kinematic plan from the current state into `plan`, via
/// [`gen_direct_to_linear`].
pub fn gen_direct_to(plan: &Plan, so: Position, vo: Velocity, to: f64, config: &TrajGenConfig) -> Plan {
    let linear = gen_direct_to_linear(plan, so, vo, to, config.bank_angle);
    if linear.has_error() {
        return finish(linear, plan, config);
    }
    make_kinematic_plan(&linear, config)
}

// ---- vertical speed --------------------------------------------------------

/// Insert BVS/EVS pairs wherever vertical speed jumps.
pub fn generate_vs_tcps(plan: &mut Plan, config: &TrajGenConfig) {
    let mut i = 1;
    while i + 1 < plan.len() {
        let accel = plan
            .tcp(i)
            .overrides
            .vs_accel
            .map(f64::abs)
            .filter(|a| *a > 0.0)
            .unwrap_or(config.vs_accel.abs());
        i = generate_one_vs_tcps(plan, i, accel, &config.limits);
        if plan.has_error() {
            return;
        }
        i += 1;
    }
}

/// Center a vertical acceleration on point `i`. Returns the index to
/// continue from (the EVS when one was added).
fn generate_one_vs_tcps(plan: &mut Plan, i: usize, accel: f64, limits: &GenerationLimits) -> usize {
    if accel == 0.0 {
        plan.add_error(DiagnosticKind::InvalidAccel, "vertical acceleration is zero", Some(i));
        return i;
    }
    let vs1 = plan.vs_out(i - 1);
    let vs2 = plan.vs_out(i);
    let a = if vs1 > vs2 { -accel } else { accel };
    let delta = vs2 - vs1;
    if delta.abs() <= limits.min_vs_delta {
        return i;
    }
    let accel_time = (delta / a).abs();
    let t_begin = plan.time(i) - accel_time / 2.0;
    let t_end = t_begin + accel_time;
    let prev_end = plan
        .prev_evs(i)
        .map_or(plan.first_time(), |e| plan.first_time().max(plan.time(e)));
    let next_change = plan.time(plan.next_vs_change(i, limits.min_vs_delta));
    if t_begin < prev_end || t_end > next_change {
        plan.add_error(
            DiagnosticKind::VsAccelTime,
            format!(
                "insufficient time at i = {i} for vertical accel: begins {t_begin:.1}, previous ends {prev_end:.1}"
            ),
            Some(i),
        );
        return i;
    }
    if t_begin < 0.0 || t_end < 0.0 {
        return i;
    }
    if plan.in_vs_change(t_begin) {
        plan.add_error(DiagnosticKind::VsAccelOverlap, format!("vertical accel overlap at {i}"), Some(i));
        return i;
    }
    let (Some(b_pos), Some(e_pos)) = (plan.position_at(t_begin), plan.position_at(t_end)) else {
        plan.add_error(DiagnosticKind::PlanEdit, format!("vertical accel at {i} leaves the plan"), Some(i));
        return i;
    };

    let PlanPoint { point: vertex, tcp: vertex_tcp } = plan.get(i).clone();
    let manual = vertex_tcp.overrides.vs_accel.is_some_and(|v| v.abs() > 0.0);
    let mut b_tcp = TcpData::default();
    b_tcp.set_bvs(a);
    let mut e_tcp = TcpData::default();
    e_tcp.set_evs();
    let mut b_point = NavPoint::new(b_pos, t_begin);
    if !vertex_tcp.is_tcp() && !vertex_tcp.is_mot() {
        // the BVS takes over the vertex's identity
        plan.remove(i);
        b_point.name = vertex.name;
        b_tcp.info = vertex_tcp.info;
        b_tcp.source = vertex_tcp.source;
        b_tcp.overrides = vertex_tcp.overrides;
    } else if manual {
        b_tcp.append_info(MANUAL_VS_ACCEL);
    }
    let (Some(b), Some(e)) = (plan.add(b_point, b_tcp), plan.add(NavPoint::new(e_pos, t_end), e_tcp)) else {
        plan.add_error(DiagnosticKind::VsAccelOverlap, format!("BVS/EVS at {i} conflict with existing points"), Some(i));
        return i;
    };
    tracing::debug!(bvs = b, evs = e, accel = a, "vertical-speed transition");
    if !fix_alts(plan, b, e, vs1, a, limits.max_alt) {
        plan.add_error(
            DiagnosticKind::AltitudeOutOfBounds,
            format!("generated altitude is out of bounds between {b} and {e}"),
            Some(b),
        );
    }
    e
}

/// Altitudes after the BVS up to the EVS follow `s0 + v0·t + ½at²`.
fn fix_alts(plan: &mut Plan, b: usize, e: usize, vs1: f64, a: f64, max_alt: f64) -> bool {
    let b_alt = plan.alt(b);
    let t_begin = plan.time(b);
    let mut ok = true;
    for k in b + 1..=e {
        let dt = plan.time(k) - t_begin;
        let alt = b_alt + vs1 * dt + 0.5 * a * dt * dt;
        if (0.0..=max_alt).contains(&alt) {
            plan.set_alt(k, alt);
        } else {
            ok = false;
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{fpm, knots, nautical_miles};

    fn pt(x: f64, y: f64, z: f64, t: f64) -> (Position, f64) {
        (Position::xyz(x, y, z), t)
    }

    fn linear(points: &[(Position, f64)]) -> Plan {
        let mut p = Plan::new("linear");
        for (pos, t) in points {
            p.add_position(*pos, *t);
        }
        p
    }

    #[test]
    fn test_mark_vs_changes_marks_level_off_and_long_legs() {
        let mut p = linear(&[
            pt(0.0, 0.0, 0.0, 0.0),
            pt(1000.0, 0.0, 100.0, 10.0),
            pt(2000.0, 0.0, 100.0, 20.0),
            pt(8000.0, 0.0, 100.0, 80.0),
            pt(9000.0, 0.0, 100.0, 90.0),
        ]);
        mark_vs_changes(&mut p, &GenerationLimits::default());
        assert!(p.tcp(1).alt_preserve, "level-off");
        assert!(p.tcp(2).alt_preserve, "60 s leg follows");
        assert!(!p.tcp(3).alt_preserve);
        assert!(!p.has_error());
    }

    #[test]
    fn test_marked_vs_constant_interpolates_between_anchors() {
        let mut p = linear(&[
            pt(0.0, 0.0, 0.0, 0.0),
            pt(1000.0, 0.0, 400.0, 10.0),
            pt(2000.0, 0.0, 100.0, 20.0),
            pt(3000.0, 0.0, 300.0, 30.0),
        ]);
        p.tcp_mut(2).alt_preserve = true;
        make_marked_vs_constant(&mut p);
        assert!((p.alt(1) - 50.0).abs() < 1e-9);
        assert_eq!(p.alt(2), 100.0);
        assert_eq!(p.alt(3), 300.0);
    }

    #[test]
    fn test_straight_plan_is_left_alone() {
        let p = linear(&[
            pt(0.0, 0.0, 1000.0, 0.0),
            pt(10_000.0, 0.0, 1000.0, 100.0),
            pt(20_000.0, 0.0, 1000.0, 200.0),
        ]);
        let k = make_kinematic_plan(&p, &TrajGenConfig::default());
        assert!(!k.has_error(), "{:?}", k.diagnostics());
        assert_eq!(k.len(), 3);
        assert!(k.is_linear());
        assert_eq!(k.params.get(PARAM_GS_ACCEL), Some(&2.0));
    }

    #[test]
    fn test_single_turn_inserts_bot_and_eot() {
        let v = knots(250.0);
        let leg = nautical_miles(5.0);
        let p = linear(&[
            pt(0.0, 0.0, 1000.0, 0.0),
            pt(leg, 0.0, 1000.0, leg / v),
            pt(leg, leg, 1000.0, 2.0 * leg / v),
        ]);
        let k = make_kinematic_plan(&p, &TrajGenConfig::default());
        assert!(!k.has_error(), "{:?}", k.diagnostics());
        let bots: Vec<usize> = (0..k.len()).filter(|&i| k.tcp(i).is_bot()).collect();
        let eots: Vec<usize> = (0..k.len()).filter(|&i| k.tcp(i).is_eot()).collect();
        assert_eq!(bots.len(), 1);
        assert_eq!(eots.len(), 1);
        assert!(bots[0] < eots[0]);
        assert!(k.tcp(bots[0] + 1).is_mot());
        assert!(k.well_formed_error().is_none());
    }

    #[test]
    fn test_speed_change_inserts_bgs_egs_and_respects_limit() {
        let v1 = 100.0;
        let v2 = 150.0;
        let p = linear(&[
            pt(0.0, 0.0, 500.0, 0.0),
            pt(10_000.0, 0.0, 500.0, 10_000.0 / v1),
            pt(30_000.0, 0.0, 500.0, 10_000.0 / v1 + 20_000.0 / v2),
        ]);
        let config = TrajGenConfig::default();
        let k = make_kinematic_plan(&p, &config);
        assert!(!k.has_error(), "{:?}", k.diagnostics());
        let bgs = (0..k.len()).find(|&i| k.tcp(i).is_bgs()).unwrap();
        let egs = k.next_egs(bgs).unwrap();
        assert!((k.tcp(bgs).gs_accel - config.gs_accel).abs() < 1e-12);
        assert!((k.gs_out(bgs) - v1).abs() < 1e-6);
        assert!((k.gs_in(egs) - v2).abs() < 1e-6);
        let dt = k.time(egs) - k.time(bgs);
        assert!(((v2 - v1) / dt - config.gs_accel).abs() < 1e-6);
    }

    /// 150 m/s, 1 km at 100 m/s, then 80 m/s: the first slowdown only fits
    /// by running on through the second.
    fn two_step_slowdown() -> Plan {
        linear(&[
            pt(0.0, 0.0, 500.0, 0.0),
            pt(20_000.0, 0.0, 500.0, 20_000.0 / 150.0),
            pt(21_000.0, 0.0, 500.0, 20_000.0 / 150.0 + 10.0),
            pt(41_000.0, 0.0, 500.0, 20_000.0 / 150.0 + 10.0 + 250.0),
        ])
    }

    #[test]
    fn test_next_gs_change_skips_steady_points() {
        let p = linear(&[
            pt(0.0, 0.0, 500.0, 0.0),
            pt(1000.0, 0.0, 500.0, 10.0),
            pt(2000.0, 0.0, 500.0, 20.0),
            pt(4000.0, 0.0, 500.0, 30.0),
            pt(5000.0, 0.0, 500.0, 40.0),
        ]);
        let min = TrajGenConfig::default().limits.min_gs_delta;
        assert_eq!(next_gs_change(&p, 0, min), 2);
        assert_eq!(next_gs_change(&p, 2, min), 3);
        assert_eq!(next_gs_change(&p, 3, min), 4);
    }

    #[test]
    fn test_gs_repair_runs_through_same_direction_change() {
        let p = two_step_slowdown();
        let config = TrajGenConfig::default();
        let k = make_kinematic_plan(&p, &config);
        assert!(!k.has_error(), "{:?}", k.diagnostics());
        assert!(k.tcp(1).is_bgs());
        let egs = k.next_egs(1).unwrap();
        assert_eq!(egs, 3);
        assert!((k.gs_in(egs) - 80.0).abs() < 1e-6);
        assert!((k.gs_out(egs) - 80.0).abs() < 1e-6);
        // the point crossed by the slowdown stays on the acceleration profile
        assert!((k.gs_in(2) - k.gs_out(2)).abs() < 1e-6);

        let strict = TrajGenConfig {
            repair_gs: false,
            ..TrajGenConfig::default()
        };
        let k = make_kinematic_plan(&p, &strict);
        let err = k.first_error().expect("slowdown does not fit before the next change");
        assert_eq!(err.kind, DiagnosticKind::GsAccelDistance);
        assert_eq!(err.index, Some(1));
    }

    #[test]
    fn test_stop_decelerates_into_hover() {
        // 100 m/s, then 50 s hovering over the last fix
        let p = linear(&[
            pt(0.0, 0.0, 500.0, 0.0),
            pt(10_000.0, 0.0, 500.0, 100.0),
            pt(10_000.0, 0.0, 500.0, 150.0),
        ]);
        let k = make_kinematic_plan(&p, &TrajGenConfig::default());
        assert!(!k.has_error(), "{:?}", k.diagnostics());
        assert_eq!(k.len(), 4);
        assert!(k.tcp(1).is_bgs() && k.tcp(2).is_egs());
        assert!((k.time(1) - 75.0).abs() < 1e-9);
        assert!((k.time(2) - 125.0).abs() < 1e-9);
        assert!((k.time(3) - 175.0).abs() < 1e-9);
        assert!(k.gs_final(1).abs() < 1e-9);
        assert_eq!(make_linear_plan(&k).time(1), 100.0);
    }

    #[test]
    fn test_vertical_change_inserts_bvs_evs() {
        let p = linear(&[
            pt(0.0, 0.0, 1000.0, 0.0),
            pt(10_000.0, 0.0, 1000.0, 100.0),
            pt(20_000.0, 0.0, 1000.0 + fpm(1500.0) * 100.0, 200.0),
        ]);
        let k = make_kinematic_plan(&p, &TrajGenConfig::default());
        assert!(!k.has_error(), "{:?}", k.diagnostics());
        let bvs = (0..k.len()).find(|&i| k.tcp(i).is_bvs()).unwrap();
        let evs = k.next_evs(bvs).unwrap();
        assert!(k.time(bvs) < 100.0 && k.time(evs) > 100.0);
        assert!((k.vs_in(evs) - fpm(1500.0)).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_config_is_reported_on_plan() {
        let p = linear(&[pt(0.0, 0.0, 0.0, 0.0), pt(100.0, 0.0, 0.0, 1.0)]);
        let k = make_kinematic_plan(&p, &TrajGenConfig::new(0.4, -1.0, 1.0));
        assert!(k.has_error());
        assert!(make_kinematic_plan_checked(&p, &TrajGenConfig::new(0.4, -1.0, 1.0)).is_err());
    }

    #[test]
    fn test_stored_config_round_trips_params() {
        let mut p = Plan::new("x");
        let config = TrajGenConfig::new(0.3, 1.5, 0.8);
        add_params(&mut p, &config);
        let back = stored_config(&p).unwrap();
        assert_eq!(back.bank_angle, 0.3);
        assert_eq!(back.gs_accel, 1.5);
        assert_eq!(back.vs_accel, 0.8);
    }
}
