//! Time-ordered flight plan with trajectory change point tags.
//!
//! A [`Plan`] is the single mutable value every generation stage works on.
//! Points are kept sorted by time; adding a point at an existing time merges
//! the two tags when they are compatible. Indices shift on every insertion and
//! removal, so callers re-locate points by time or use the index returned by
//! the mutating call.
//!
//! Kinematic queries (`gs_out`, `trk_out`, `position_velocity`, ...) interpret
//! the open transitions: a segment that starts inside a BOT/EOT pair is an arc
//! about the stored center, inside a BGS/EGS pair ground speed changes at the
//! stored acceleration, inside a BVS/EVS pair vertical speed does.

use crate::cursor::TimeIndexed;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::error::TrajGenError;
use crate::position::{angle_between, track_in_turn, NavPoint, Position, Velocity};
use crate::tcp::TcpData;
use crate::units::{almost_equals, almost_zero, fpm, knots, root, turn_delta, PRECISION5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Points closer in time than this are treated as coincident.
pub const MIN_DT: f64 = 1e-5;

/// Thresholds used by [`Plan::remove_if_redundant`].
const REDUNDANT_TRK: f64 = 0.017_453_292_519_943_295; // 1 degree
const REDUNDANT_GS_KN: f64 = 5.0;
const REDUNDANT_VS_FPM: f64 = 100.0;

/// One entry of a plan: a timed point and its tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPoint {
    #[serde(flatten)]
    pub point: NavPoint,
    #[serde(default)]
    pub tcp: TcpData,
}

impl PlanPoint {
    pub fn new(point: NavPoint, tcp: TcpData) -> Self {
        Self { point, tcp }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    /// Generation parameters stamped on the output (`TRAJGEN_*`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f64>,
    #[serde(default)]
    points: Vec<PlanPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
}

impl Plan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build a plan by adding every point in turn, so ordering and merging
    /// rules apply to deserialized input as well.
    pub fn from_points(name: impl Into<String>, points: impl IntoIterator<Item = PlanPoint>) -> Self {
        let mut plan = Plan::new(name);
        for p in points {
            plan.add(p.point, p.tcp);
        }
        plan
    }

    /// Re-add every point of a deserialized plan, keeping name, note and params.
    pub fn normalized(self) -> Self {
        let Plan {
            name,
            note,
            params,
            points,
            diagnostics,
        } = self;
        let mut plan = Plan::from_points(name, points);
        plan.note = note;
        plan.params = params;
        plan.diagnostics.splice(0..0, diagnostics);
        plan
    }

    // ---- access ------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PlanPoint] {
        &self.points
    }

    pub fn get(&self, i: usize) -> &PlanPoint {
        &self.points[i]
    }

    pub fn point(&self, i: usize) -> &NavPoint {
        &self.points[i].point
    }

    pub fn pos(&self, i: usize) -> &Position {
        &self.points[i].point.position
    }

    pub fn tcp(&self, i: usize) -> &TcpData {
        &self.points[i].tcp
    }

    pub fn tcp_mut(&mut self, i: usize) -> &mut TcpData {
        &mut self.points[i].tcp
    }

    pub fn time(&self, i: usize) -> f64 {
        self.points[i].point.time
    }

    pub fn alt(&self, i: usize) -> f64 {
        self.points[i].point.position.alt()
    }

    pub fn first_time(&self) -> f64 {
        self.points.first().map_or(f64::NAN, |p| p.point.time)
    }

    pub fn last_time(&self) -> f64 {
        self.points.last().map_or(f64::NAN, |p| p.point.time)
    }

    pub fn is_geodetic(&self) -> bool {
        self.points
            .first()
            .is_some_and(|p| p.point.position.is_geodetic())
    }

    /// True when no point carries any TCP or MOT tag.
    pub fn is_linear(&self) -> bool {
        self.points.iter().all(|p| p.tcp.is_linear())
    }

    // ---- diagnostics -------------------------------------------------------

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn add_diagnostic(&mut self, d: Diagnostic) {
        match d.severity {
            Severity::Error => tracing::warn!(plan = %self.name, kind = ?d.kind, index = ?d.index, "{}", d.message),
            Severity::Warning => tracing::debug!(plan = %self.name, kind = ?d.kind, index = ?d.index, "{}", d.message),
        }
        self.diagnostics.push(d);
    }

    pub fn add_error(&mut self, kind: DiagnosticKind, message: impl Into<String>, index: Option<usize>) {
        self.add_diagnostic(Diagnostic::error(kind, message, index));
    }

    pub fn add_warning(&mut self, kind: DiagnosticKind, message: impl Into<String>, index: Option<usize>) {
        self.add_diagnostic(Diagnostic::warning(kind, message, index));
    }

    pub fn has_error(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    /// The plan if it carries no error, otherwise its first error.
    pub fn into_result(self) -> Result<Plan, TrajGenError> {
        match self.first_error() {
            Some(d) => Err(TrajGenError::from(d)),
            None => Ok(self),
        }
    }

    // ---- editing -----------------------------------------------------------

    /// Insert a point in time order.
    ///
    /// A point at an existing time is merged into it when the tags are
    /// compatible; otherwise nothing is added and a warning is recorded.
    /// Returns the index of the (possibly merged) point.
    pub fn add(&mut self, point: NavPoint, tcp: TcpData) -> Option<usize> {
        if !point.time.is_finite() || !point.position.is_finite() {
            self.add_error(
                DiagnosticKind::InvalidInput,
                "attempt to add a point with a non-finite time or position",
                None,
            );
            return None;
        }
        if point.time < 0.0 {
            self.add_error(
                DiagnosticKind::InvalidInput,
                format!("attempt to add a point at negative time {:.4}", point.time),
                None,
            );
            return None;
        }
        if let Some(first) = self.points.first() {
            if !first.point.position.same_frame(&point.position) {
                self.add_error(
                    DiagnosticKind::InvalidInput,
                    "attempt to mix geodetic and euclidean points in one plan",
                    None,
                );
                return None;
            }
        }
        match self
            .points
            .binary_search_by(|p| p.point.time.total_cmp(&point.time))
        {
            Ok(i) => {
                if self.points[i].tcp.mergeable(&tcp) {
                    let merged = self.points[i].tcp.merge(&tcp);
                    self.points[i].tcp = merged;
                    self.points[i].point.append_name(&point.name);
                    Some(i)
                } else {
                    self.add_warning(
                        DiagnosticKind::PlanEdit,
                        format!(
                            "point at time {:.4} conflicts with an existing point, not added",
                            point.time
                        ),
                        Some(i),
                    );
                    None
                }
            }
            Err(i) => {
                self.points.insert(i, PlanPoint { point, tcp });
                Some(i)
            }
        }
    }

    pub fn add_point(&mut self, point: NavPoint) -> Option<usize> {
        self.add(point, TcpData::default())
    }

    pub fn add_position(&mut self, position: Position, time: f64) -> Option<usize> {
        self.add(NavPoint::new(position, time), TcpData::default())
    }

    pub fn remove(&mut self, i: usize) -> Option<PlanPoint> {
        if i < self.points.len() {
            Some(self.points.remove(i))
        } else {
            None
        }
    }

    /// Remove points `from..=to`.
    pub fn remove_range(&mut self, from: usize, to: usize) {
        let end = (to + 1).min(self.points.len());
        if from < end {
            self.points.drain(from..end);
        }
    }

    /// Replace point `i`; the replacement is re-inserted by time.
    pub fn set(&mut self, i: usize, point: NavPoint, tcp: TcpData) -> Option<usize> {
        self.remove(i)?;
        self.add(point, tcp)
    }

    /// Move point `i` to time `t`, returning its new index.
    pub fn set_time(&mut self, i: usize, t: f64) -> Option<usize> {
        if t < 0.0 || !t.is_finite() {
            self.add_error(
                DiagnosticKind::PlanEdit,
                format!("set_time: invalid time {t:.4}"),
                Some(i),
            );
            return None;
        }
        let entry = self.remove(i)?;
        self.add(entry.point.with_time(t), entry.tcp)
    }

    pub fn set_alt(&mut self, i: usize, alt: f64) {
        let p = &mut self.points[i].point;
        p.position = p.position.with_alt(alt);
    }

    pub fn set_tcp(&mut self, i: usize, tcp: TcpData) {
        self.points[i].tcp = tcp;
    }

    pub fn set_name(&mut self, i: usize, name: impl Into<String>) {
        self.points[i].point.name = name.into();
    }

    pub fn set_info(&mut self, i: usize, info: impl Into<String>) {
        self.points[i].tcp.info = info.into();
    }

    pub fn append_info(&mut self, i: usize, info: &str) {
        self.points[i].tcp.append_info(info);
    }

    pub fn set_mot(&mut self, i: usize) {
        self.points[i].tcp.set_mot();
    }

    /// Shift the times of all points from `start` on by `dt`.
    ///
    /// A negative shift removes points that would land at or before the
    /// point preceding `start`, or before time zero.
    pub fn time_shift_plan(&mut self, start: usize, dt: f64) -> bool {
        if dt.is_nan() {
            return false;
        }
        if start >= self.points.len() || dt == 0.0 {
            return true;
        }
        if dt > 0.0 {
            for p in &mut self.points[start..] {
                p.point.time += dt;
            }
        } else {
            let floor = if start > 0 { self.time(start - 1) } else { -1.0 };
            let mut i = start;
            while i < self.points.len() {
                let t = self.points[i].point.time + dt;
                if t > floor && t >= 0.0 {
                    self.points[i].point.time = t;
                    i += 1;
                } else {
                    self.points.remove(i);
                }
            }
        }
        true
    }

    /// Insert a point `d` meters along the path from point `i` (negative is before).
    pub fn insert_by_distance(&mut self, i: usize, d: f64) -> Option<usize> {
        if i >= self.points.len() {
            return None;
        }
        let target = self.path_distance_between(0, i) + d;
        let t = self.time_from_distance(0, target);
        if !t.is_finite() || t < 0.0 {
            return None;
        }
        let pos = self.position_at(t)?;
        self.add_position(pos, t)
    }

    // ---- segment lookup ----------------------------------------------------

    /// Index `i` with `time(i) <= t < time(i + 1)`; the last index when `t`
    /// equals the last time; `None` outside the plan.
    pub fn segment(&self, t: f64) -> Option<usize> {
        let n = self.points.len();
        if n == 0 || !(t >= self.first_time()) || t > self.last_time() {
            return None;
        }
        if t == self.last_time() {
            return Some(n - 1);
        }
        let k = self.points.partition_point(|p| p.point.time <= t);
        Some(k - 1)
    }

    fn prev_where(&self, before: usize, pred: impl Fn(&TcpData) -> bool) -> Option<usize> {
        (0..before.min(self.points.len()))
            .rev()
            .find(|&j| pred(&self.points[j].tcp))
    }

    fn next_where(&self, after: usize, pred: impl Fn(&TcpData) -> bool) -> Option<usize> {
        (after + 1..self.points.len()).find(|&j| pred(&self.points[j].tcp))
    }

    /// Last BOT strictly before `i`.
    pub fn prev_bot(&self, i: usize) -> Option<usize> {
        self.prev_where(i, TcpData::is_bot)
    }

    pub fn prev_eot(&self, i: usize) -> Option<usize> {
        self.prev_where(i, TcpData::is_eot)
    }

    pub fn prev_bgs(&self, i: usize) -> Option<usize> {
        self.prev_where(i, TcpData::is_bgs)
    }

    pub fn prev_bvs(&self, i: usize) -> Option<usize> {
        self.prev_where(i, TcpData::is_bvs)
    }

    pub fn prev_evs(&self, i: usize) -> Option<usize> {
        self.prev_where(i, TcpData::is_evs)
    }

    /// First EOT strictly after `i`.
    pub fn next_eot(&self, i: usize) -> Option<usize> {
        self.next_where(i, TcpData::is_eot)
    }

    pub fn next_egs(&self, i: usize) -> Option<usize> {
        self.next_where(i, TcpData::is_egs)
    }

    pub fn next_evs(&self, i: usize) -> Option<usize> {
        self.next_where(i, TcpData::is_evs)
    }

    /// True when the segment starting at `i` lies inside a turn.
    pub fn in_trk_accel(&self, i: usize) -> bool {
        self.prev_where(i + 1, TcpData::is_trk_tcp)
            .is_some_and(|j| self.points[j].tcp.is_bot())
    }

    pub fn in_gs_accel(&self, i: usize) -> bool {
        self.prev_where(i + 1, TcpData::is_gs_tcp)
            .is_some_and(|j| self.points[j].tcp.is_bgs())
    }

    pub fn in_vs_accel(&self, i: usize) -> bool {
        self.prev_where(i + 1, TcpData::is_vs_tcp)
            .is_some_and(|j| self.points[j].tcp.is_bvs())
    }

    pub fn in_trk_change(&self, t: f64) -> bool {
        self.segment(t).is_some_and(|i| self.in_trk_accel(i))
    }

    pub fn in_gs_change(&self, t: f64) -> bool {
        self.segment(t).is_some_and(|i| self.in_gs_accel(i))
    }

    pub fn in_vs_change(&self, t: f64) -> bool {
        self.segment(t).is_some_and(|i| self.in_vs_accel(i))
    }

    pub fn in_accel(&self, t: f64) -> bool {
        self.in_trk_change(t) || self.in_gs_change(t) || self.in_vs_change(t)
    }

    /// True when point `i` already lies inside an open transition.
    pub fn in_accel_zone(&self, i: usize) -> bool {
        self.in_accel(self.time(i))
    }

    // ---- per-point attributes ----------------------------------------------

    /// Radius requested for the turn at vertex `i`, if any.
    pub fn vertex_radius(&self, i: usize) -> Option<f64> {
        self.points[i]
            .tcp
            .overrides
            .turn_radius
            .map(f64::abs)
            .filter(|r| *r > 0.0)
    }

    /// Center, direction and unsigned radius of the turn the segment at `i` lies in.
    fn turn_of_segment(&self, i: usize) -> Option<(Position, f64, f64)> {
        if !self.in_trk_accel(i) {
            return None;
        }
        let ix_bot = self.prev_bot(i + 1)?;
        let tcp = &self.points[ix_bot].tcp;
        let center = tcp.center?;
        let dir = if tcp.radius_signed < 0.0 { -1.0 } else { 1.0 };
        Some((center, dir, tcp.radius_signed.abs()))
    }

    /// Signed ground-speed acceleration governing the segment at `i`.
    fn gs_accel_of_segment(&self, i: usize) -> f64 {
        if self.in_gs_accel(i) {
            self.prev_bgs(i + 1)
                .map_or(0.0, |j| self.points[j].tcp.gs_accel)
        } else {
            0.0
        }
    }

    fn vs_accel_of_segment(&self, i: usize) -> f64 {
        if self.in_vs_accel(i) {
            self.prev_bvs(i + 1)
                .map_or(0.0, |j| self.points[j].tcp.vs_accel)
        } else {
            0.0
        }
    }

    // ---- distance ----------------------------------------------------------

    /// Length of segment `i` (an arc inside a turn).
    pub fn path_distance(&self, i: usize) -> f64 {
        if i + 1 >= self.points.len() {
            return 0.0;
        }
        let p1 = self.pos(i);
        let p2 = self.pos(i + 1);
        match self.turn_of_segment(i) {
            Some((center, _, radius)) => (angle_between(p1, &center, p2) * radius).abs(),
            None => p1.distance_h(p2),
        }
    }

    /// Path length from point `i` to point `j`.
    pub fn path_distance_between(&self, i: usize, j: usize) -> f64 {
        let j = j.min(self.points.len().saturating_sub(1));
        (i..j).map(|k| self.path_distance(k)).sum()
    }

    pub fn total_path_distance(&self) -> f64 {
        self.path_distance_between(0, self.points.len())
    }

    /// Segment containing the point `d` meters along the path from `start`.
    pub fn segment_by_distance(&self, start: usize, d: f64) -> Option<usize> {
        let n = self.points.len();
        if d < 0.0 || start >= n {
            return None;
        }
        let mut total = 0.0;
        let mut i = start;
        while total < d && i < n {
            total += self.path_distance(i);
            i += 1;
        }
        if total == d {
            return Some(i.min(n - 1));
        }
        if total > d && i <= n {
            return Some(i - 1);
        }
        if (d - total).abs() < 0.01 && i == n {
            return Some(n - 1);
        }
        None
    }

    // ---- ground speed ------------------------------------------------------

    /// Ground speed leaving point `i`.
    pub fn gs_out(&self, i: usize) -> f64 {
        let n = self.points.len();
        if n < 2 || i >= n {
            return f64::NAN;
        }
        if i == n - 1 {
            return self.gs_final(i - 1);
        }
        let dt = self.time(i + 1) - self.time(i);
        let a = self.gs_accel_of_segment(i);
        (self.path_distance(i) / dt - 0.5 * a * dt).max(0.0)
    }

    /// Ground speed arriving at the end of segment `i`.
    pub fn gs_final(&self, i: usize) -> f64 {
        if i + 1 >= self.points.len() {
            return f64::NAN;
        }
        let dt = self.time(i + 1) - self.time(i);
        let a = self.gs_accel_of_segment(i);
        (self.path_distance(i) / dt + 0.5 * a * dt).max(0.0)
    }

    /// Ground speed arriving at point `i`; the first point reports its outbound speed.
    pub fn gs_in(&self, i: usize) -> f64 {
        if i == 0 {
            self.gs_out(0)
        } else {
            self.gs_final(i - 1)
        }
    }

    pub fn gs_at_time(&self, t: f64) -> f64 {
        let Some(seg) = self.segment(t) else {
            return f64::NAN;
        };
        let gs0 = self.gs_out(seg);
        if self.in_gs_accel(seg) && seg + 1 < self.points.len() {
            gs0 + self.gs_accel_of_segment(seg) * (t - self.time(seg))
        } else {
            gs0
        }
    }

    // ---- vertical speed ----------------------------------------------------

    pub fn vs_out(&self, i: usize) -> f64 {
        let n = self.points.len();
        if n < 2 || i >= n {
            return f64::NAN;
        }
        if i == n - 1 {
            return self.vs_final(i - 1);
        }
        let dt = self.time(i + 1) - self.time(i);
        let a = self.vs_accel_of_segment(i);
        (self.alt(i + 1) - self.alt(i)) / dt - 0.5 * a * dt
    }

    pub fn vs_final(&self, i: usize) -> f64 {
        if i + 1 >= self.points.len() {
            return f64::NAN;
        }
        let dt = self.time(i + 1) - self.time(i);
        let a = self.vs_accel_of_segment(i);
        (self.alt(i + 1) - self.alt(i)) / dt + 0.5 * a * dt
    }

    pub fn vs_in(&self, i: usize) -> f64 {
        if i == 0 {
            self.vs_out(0)
        } else {
            self.vs_final(i - 1)
        }
    }

    /// Altitude and vertical speed `dt` seconds into segment `seg`.
    pub fn interpolate_alt_vs(&self, seg: usize, dt: f64) -> (f64, f64) {
        let a = self.vs_accel_of_segment(seg);
        let vs0 = self.vs_out(seg);
        let vs0 = if vs0.is_finite() { vs0 } else { 0.0 };
        (
            self.alt(seg) + vs0 * dt + 0.5 * a * dt * dt,
            vs0 + a * dt,
        )
    }

    // ---- track -------------------------------------------------------------

    pub fn trk_out(&self, i: usize) -> f64 {
        let n = self.points.len();
        if n < 2 || i >= n {
            return f64::NAN;
        }
        if i == n - 1 {
            return self.trk_final(i - 1);
        }
        match self.turn_of_segment(i) {
            Some((center, dir, _)) => track_in_turn(&center, self.pos(i), dir),
            None => self.pos(i).initial_course(self.pos(i + 1)),
        }
    }

    pub fn trk_final(&self, i: usize) -> f64 {
        if i + 1 >= self.points.len() {
            return f64::NAN;
        }
        match self.turn_of_segment(i) {
            Some((center, dir, _)) => track_in_turn(&center, self.pos(i + 1), dir),
            None => self.pos(i).final_course(self.pos(i + 1)),
        }
    }

    pub fn trk_in(&self, i: usize) -> f64 {
        if i == 0 {
            self.trk_out(0)
        } else {
            self.trk_final(i - 1)
        }
    }

    /// Track leaving `i`, looking past hover segments.
    pub fn def_trk_out(&self, i: usize) -> f64 {
        let n = self.points.len();
        let ix = (i..n)
            .find(|&k| !almost_equals(self.gs_out(k), 0.0, PRECISION5))
            .unwrap_or(n.saturating_sub(1));
        self.trk_out(ix)
    }

    /// Track arriving at `i`, looking past hover segments.
    pub fn def_trk_in(&self, i: usize) -> f64 {
        let ix = (1..=i)
            .rev()
            .find(|&k| !almost_equals(self.gs_in(k), 0.0, PRECISION5))
            .unwrap_or(0);
        if ix == 0 {
            self.trk_out(0)
        } else {
            self.trk_in(ix)
        }
    }

    pub fn initial_velocity(&self, i: usize) -> Velocity {
        Velocity::new(self.trk_out(i), self.gs_out(i), self.vs_out(i))
    }

    pub fn final_velocity(&self, i: usize) -> Velocity {
        Velocity::new(self.trk_final(i), self.gs_final(i), self.vs_final(i))
    }

    // ---- time from distance ------------------------------------------------

    /// Smallest non-negative time to cover `dist` from speed `v0` at
    /// acceleration `a`; NaN when unreachable.
    pub fn time_from_distance_accel(v0: f64, a: f64, dist: f64) -> f64 {
        let t1 = root(0.5 * a, v0, -dist, 1.0);
        if t1.is_nan() {
            return t1;
        }
        let t2 = root(0.5 * a, v0, -dist, -1.0);
        if t1 < 0.0 {
            t2
        } else if t2 < 0.0 || t2.is_nan() {
            t1
        } else {
            t1.min(t2)
        }
    }

    fn time_from_distance_within_seg(&self, seg: usize, rdist: f64) -> f64 {
        if seg + 1 >= self.points.len() || rdist < 0.0 {
            return f64::NAN;
        }
        let seg_len = self.path_distance(seg);
        if rdist > seg_len + 1e-9 * seg_len.max(1.0) {
            return f64::NAN;
        }
        let gs0 = self.gs_out(seg);
        let gs1 = self.gs_final(seg);
        if almost_zero(gs0) && almost_zero(gs1) {
            return 0.0;
        }
        if self.in_gs_accel(seg) {
            Self::time_from_distance_accel(gs0, self.gs_accel_of_segment(seg), rdist)
        } else {
            rdist / gs0
        }
    }

    /// Absolute time at path distance `dist` from point `start`.
    pub fn time_from_distance(&self, start: usize, dist: f64) -> f64 {
        let Some(seg) = self.segment_by_distance(start, dist) else {
            return f64::NAN;
        };
        if seg + 1 >= self.points.len() {
            return self.time(seg);
        }
        let within = (dist - self.path_distance_between(start, seg)).max(0.0);
        self.time_from_distance_within_seg(seg, within) + self.time(seg)
    }

    fn dist_from_point_to_time(&self, seg: usize, t: f64) -> f64 {
        let dt = t - self.time(seg);
        if dt < MIN_DT {
            return 0.0;
        }
        let gs0 = self.gs_out(seg);
        if self.in_gs_accel(seg) {
            gs0 * dt + 0.5 * self.gs_accel_of_segment(seg) * dt * dt
        } else {
            gs0 * dt
        }
    }

    // ---- position ----------------------------------------------------------

    /// Position and velocity at time `t`; `None` outside the plan.
    pub fn position_velocity(&self, t: f64) -> Option<(Position, Velocity)> {
        let seg = self.segment(t)?;
        let n = self.points.len();
        if n == 1 {
            return Some((*self.pos(0), Velocity::default()));
        }
        if seg == n - 1 {
            return Some((*self.pos(seg), self.final_velocity(seg - 1)));
        }
        let gs0 = self.gs_out(seg);
        let gs_t = if self.in_gs_accel(seg) {
            gs0 + self.gs_accel_of_segment(seg) * (t - self.time(seg))
        } else {
            gs0
        };
        let dist = self.dist_from_point_to_time(seg, t);
        let so = self.pos(seg);
        let (pos2d, trk) = match self.turn_of_segment(seg) {
            Some((center, dir, _)) => so.turn_by_dist_2d(&center, dir, dist),
            None => {
                let trk = so.initial_course(self.pos(seg + 1));
                (so.linear_dist_2d(trk, dist), trk)
            }
        };
        let (alt, vs) = self.interpolate_alt_vs(seg, t - self.time(seg));
        Some((pos2d.with_alt(alt), Velocity::new(trk, gs_t, vs)))
    }

    pub fn position_at(&self, t: f64) -> Option<Position> {
        self.position_velocity(t).map(|(p, _)| p)
    }

    fn advance_within_seg_2d(&self, seg: usize, d: f64) -> Position {
        let so = self.pos(seg);
        match self.turn_of_segment(seg) {
            Some((center, dir, _)) => so.turn_by_dist_2d(&center, dir, d).0,
            None => so.linear_dist_2d(self.trk_out(seg), d),
        }
    }

    /// Horizontal position `d` meters along the path from point `seg`
    /// (altitude of the segment start) and the segment it lies in.
    pub fn advance_distance_2d(&self, seg: usize, d: f64) -> (Position, usize) {
        let mut remaining = d;
        for i in seg..self.points.len() {
            let pd = self.path_distance(i);
            if remaining < pd {
                return (self.advance_within_seg_2d(i, remaining), i);
            }
            remaining -= pd;
        }
        let last = self.points.len() - 1;
        (*self.pos(last), last)
    }

    /// As [`Plan::advance_distance_2d`], with the altitude flown at that point.
    pub fn advance_distance(&self, ix: usize, d: f64) -> (Position, usize) {
        if d == 0.0 {
            return (*self.pos(ix), ix);
        }
        let mut remaining = d;
        for i in ix..self.points.len() {
            let pd = self.path_distance(i);
            if remaining < pd {
                let p = self.advance_within_seg_2d(i, remaining);
                let t = self.time_from_distance(i, remaining);
                let (alt, _) = self.interpolate_alt_vs(i, t - self.time(i));
                return (p.with_alt(alt), i);
            }
            remaining -= pd;
        }
        let last = self.points.len() - 1;
        (*self.pos(last), last)
    }

    // ---- ground-speed editing ----------------------------------------------

    /// Duration segment `ix - 1` needs so that ground speed into `ix` is `gs`.
    pub fn calc_dt_gs_in(&self, ix: usize, gs: f64) -> f64 {
        if ix == 0 || ix >= self.points.len() {
            return f64::NAN;
        }
        let d = self.path_distance(ix - 1);
        if almost_zero(gs) {
            return if almost_zero(d) { 0.0 } else { f64::NAN };
        }
        if self.in_gs_accel(ix - 1) {
            let a = self.prev_bgs(ix).map_or(0.0, |j| self.points[j].tcp.gs_accel);
            root(0.5 * a, -gs, d, -1.0)
        } else {
            d / gs
        }
    }

    /// Retime `ix` and everything after so ground speed into `ix` is `gs`.
    pub fn mk_gs_in(&mut self, ix: usize, gs: f64) -> bool {
        if ix == 0 || ix >= self.points.len() {
            return false;
        }
        let dt = self.calc_dt_gs_in(ix, gs);
        if dt.is_nan() {
            self.add_warning(
                DiagnosticKind::PlanEdit,
                format!("mk_gs_in: could not make ground speed {gs:.3} m/s"),
                Some(ix),
            );
            return false;
        }
        if almost_zero(dt) {
            return true;
        }
        let shift = dt - (self.time(ix) - self.time(ix - 1));
        self.time_shift_plan(ix, shift)
    }

    /// Retime everything after `ix` so ground speed out of `ix` is `gs`.
    pub fn mk_gs_out(&mut self, ix: usize, gs: f64) -> bool {
        if ix + 1 >= self.points.len() {
            return false;
        }
        let d = self.path_distance(ix);
        let in_accel = self.in_gs_accel(ix);
        let a = if in_accel {
            self.prev_bgs(ix + 1).map_or(0.0, |j| self.points[j].tcp.gs_accel)
        } else {
            0.0
        };
        let dt = if almost_zero(gs) && a <= 0.0 {
            if almost_zero(d) {
                0.0
            } else {
                f64::NAN
            }
        } else if in_accel {
            root(0.5 * a, gs, -d, 1.0)
        } else {
            d / gs
        };
        if dt.is_nan() {
            self.add_warning(
                DiagnosticKind::PlanEdit,
                format!("mk_gs_out: could not make ground speed {gs:.3} m/s"),
                Some(ix),
            );
            return false;
        }
        if almost_zero(dt) {
            return true;
        }
        let shift = self.time(ix) + dt - self.time(ix + 1);
        self.time_shift_plan(ix + 1, shift)
    }

    /// Make ground speed constant `gs` from `wp1` to `wp2`, dropping any
    /// speed transitions inside that range.
    pub fn mk_gs_constant(&mut self, wp1: usize, wp2: usize, gs: f64) {
        if gs <= 0.0 {
            self.add_error(
                DiagnosticKind::PlanEdit,
                "mk_gs_constant: ground speed must be positive",
                Some(wp1),
            );
            return;
        }
        if self.points.is_empty() {
            return;
        }
        let wp2 = wp2.min(self.points.len() - 1);
        if wp1 >= wp2 {
            return;
        }
        self.fix_bgs_egs(wp1, wp2);
        for j in (wp1..wp2).rev() {
            self.mk_gs_out(j, gs);
        }
    }

    /// Clear ground-speed tags strictly inside `wp1..wp2`, re-closing or
    /// re-opening transitions that straddle either end.
    fn fix_bgs_egs(&mut self, wp1: usize, wp2: usize) {
        let in_change1 = self.in_gs_accel(wp1);
        let in_change2 = self.in_gs_accel(wp2);
        let bgs2 = if in_change2 { self.prev_bgs(wp2 + 1) } else { None };
        let (bgs1, egs1) = if in_change1 {
            (self.prev_bgs(wp1 + 1), self.next_egs(wp1))
        } else {
            (None, None)
        };
        for jj in wp1..=wp2 {
            if jj < wp2 {
                self.points[jj].tcp.clear_bgs();
            }
            if jj > wp1 {
                self.points[jj].tcp.clear_egs();
            }
        }
        if egs1.is_some() && bgs1.is_some_and(|b| b < wp1) {
            self.points[wp1].tcp.set_egs();
        }
        if let Some(b) = bgs2.filter(|&b| b < wp2) {
            let a = self.points[b].tcp.gs_accel;
            self.points[wp2].tcp.set_bgs(a);
        }
    }

    // ---- merging and cleanup -----------------------------------------------

    /// Merge point `i + 1` into `i` (or `i` into `i + 1` when only the latter
    /// begins a transition) if they are closer than `min_dt`. Returns the
    /// index that was deleted.
    pub fn merge_close_points_at(&mut self, i: usize, min_dt: f64) -> Option<usize> {
        if i + 1 >= self.points.len() || min_dt <= 0.0 {
            return None;
        }
        if self.time(i + 1) - self.time(i) >= min_dt {
            return None;
        }
        let ix_delete = if i == 0 {
            1
        } else if !self.tcp(i).is_begin_tcp() && self.tcp(i + 1).is_begin_tcp() {
            i
        } else {
            i + 1
        };
        let mut tcp_i = self.tcp(i).clone();
        let mut tcp_ip1 = self.tcp(i + 1).clone();
        let deleted = self.points.remove(ix_delete);
        if tcp_i.is_bot() && tcp_ip1.is_eot() {
            tcp_i.clear_bot();
            tcp_ip1.clear_eot();
        }
        if tcp_i.is_bgs() && tcp_ip1.is_egs() {
            tcp_i.clear_bgs();
            tcp_ip1.clear_egs();
        }
        if tcp_i.is_bvs() && tcp_ip1.is_evs() {
            tcp_i.clear_bvs();
            tcp_ip1.clear_evs();
        }
        let merged = tcp_i.merge(&tcp_ip1);
        let keep = &mut self.points[i];
        if ix_delete != i {
            keep.point.append_name(&deleted.point.name);
        } else if !deleted.point.name.is_empty() {
            keep.point.name = format!("{}{}", deleted.point.name, keep.point.name);
        }
        keep.tcp = merged;
        Some(ix_delete)
    }

    /// Merge every pair of neighbors closer than `min_dt`.
    pub fn merge_close_points(&mut self, min_dt: f64) {
        for i in (0..self.points.len().saturating_sub(1)).rev() {
            if i + 1 < self.points.len() {
                self.merge_close_points_at(i, min_dt);
            }
        }
    }

    /// Fold point `j - 1` into `j` when they are horizontally closer than
    /// `min_dist`. Returns the index of the surviving point.
    pub fn merge_close_points_by_dist(&mut self, j: usize, min_dist: f64) -> usize {
        if j == 0 || j >= self.points.len() {
            return j;
        }
        if self.pos(j).distance_h(self.pos(j - 1)) >= min_dist {
            return j;
        }
        let merged = self.tcp(j).merge(self.tcp(j - 1));
        let prev_name = self.point(j - 1).name.clone();
        self.points[j].tcp = merged;
        self.points[j].point.append_name(&prev_name);
        self.points.remove(j - 1);
        j - 1
    }

    /// Remove point `ix` when it changes neither track (1°) nor, when
    /// selected, ground speed (5 kn) and vertical speed (100 fpm).
    /// Endpoints, tagged, named and annotated points are kept.
    pub fn remove_if_redundant(&mut self, ix: usize, trk: bool, gs: bool, vs: bool) -> Option<usize> {
        if ix == 0 || ix + 1 >= self.points.len() {
            return None;
        }
        let tcp = self.tcp(ix);
        if tcp.is_tcp() || tcp.alt_preserve || tcp.is_mot() || !tcp.info.is_empty() {
            return None;
        }
        if !self.point(ix).name.is_empty() {
            return None;
        }
        let vin = self.final_velocity(ix - 1);
        let vout = self.initial_velocity(ix);
        let redundant = (!trk || turn_delta(vin.trk, vout.trk) <= REDUNDANT_TRK)
            && (!gs || (vin.gs - vout.gs).abs() <= knots(REDUNDANT_GS_KN))
            && (!vs || (vin.vs - vout.vs).abs() <= fpm(REDUNDANT_VS_FPM));
        if redundant {
            self.points.remove(ix);
            Some(ix)
        } else {
            None
        }
    }

    /// Remove redundant interior points (track and ground speed), last to first.
    pub fn remove_redundant_points(&mut self) {
        for i in (1..self.points.len().saturating_sub(1)).rev() {
            self.remove_if_redundant(i, true, true, false);
        }
    }

    /// Merge points closer than `min_dt` and mark every point original
    /// (clearing AltPreserve). Running it twice changes nothing more.
    pub fn clean_plan(&mut self, min_dt: f64) {
        self.merge_close_points(min_dt);
        for p in &mut self.points {
            p.tcp.alt_preserve = false;
        }
    }

    // ---- change-point search -----------------------------------------------

    /// Nearest earlier point where track changes (an EOT, or a vertex whose
    /// turn exceeds `straight`); 0 when there is none.
    pub fn prev_track_change(&self, i: usize, straight: f64) -> usize {
        for k in (1..i.min(self.points.len())).rev() {
            if self.tcp(k).is_eot() {
                return k;
            }
            if almost_equals(self.gs_in(k), 0.0, PRECISION5) {
                continue;
            }
            if turn_delta(self.trk_in(k), self.def_trk_out(k)) > straight {
                return k;
            }
        }
        0
    }

    /// Nearest later point where track changes (a BOT, or a vertex whose
    /// turn exceeds `straight`); the last point when there is none.
    pub fn next_track_change(&self, i: usize, straight: f64) -> usize {
        let last = self.points.len().saturating_sub(1);
        for k in i + 1..self.points.len() {
            if k == last || self.tcp(k).is_bot() {
                return k;
            }
            if almost_equals(self.gs_out(k), 0.0, PRECISION5) {
                continue;
            }
            if turn_delta(self.def_trk_in(k), self.trk_out(k)) > straight {
                return k;
            }
        }
        last
    }

    /// Nearest later point where vertical speed changes by more than `min_vs_delta`.
    pub fn next_vs_change(&self, i: usize, min_vs_delta: f64) -> usize {
        let last = self.points.len().saturating_sub(1);
        for k in i + 1..self.points.len() {
            if k == last || self.tcp(k).is_bvs() {
                return k;
            }
            if (self.vs_out(k - 1) - self.vs_out(k)).abs() > min_vs_delta {
                return k;
            }
        }
        last
    }

    /// First structural problem found, if any: non-increasing times, or a
    /// begin/end tag out of order on some axis.
    pub fn well_formed_error(&self) -> Option<String> {
        for (i, w) in self.points.windows(2).enumerate() {
            if !(w[1].point.time > w[0].point.time) {
                return Some(format!("time not increasing at {}", i + 1));
            }
        }
        let mut open = [false; 3];
        for (i, p) in self.points.iter().enumerate() {
            let t = &p.tcp;
            let axes = [
                (t.is_eot(), t.is_bot()),
                (t.is_egs(), t.is_bgs()),
                (t.is_evs(), t.is_bvs()),
            ];
            for (axis, (ends, begins)) in axes.into_iter().enumerate() {
                if ends {
                    if !open[axis] {
                        return Some(format!("end without begin at {i}"));
                    }
                    open[axis] = false;
                }
                if begins {
                    if open[axis] {
                        return Some(format!("nested begin at {i}"));
                    }
                    open[axis] = true;
                }
            }
        }
        if open.iter().any(|o| *o) {
            return Some("transition left open at end of plan".to_string());
        }
        None
    }
}

impl TimeIndexed for Plan {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn time_at(&self, i: usize) -> f64 {
        self.time(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::TrkTcp;

    fn straight_plan() -> Plan {
        // 100 m/s eastbound, climbing 5 m/s
        let mut p = Plan::new("straight");
        for k in 0..4 {
            let t = 10.0 * k as f64;
            p.add_position(Position::xyz(100.0 * t, 0.0, 1000.0 + 5.0 * t), t);
        }
        p
    }

    #[test]
    fn test_add_keeps_time_order_and_merges() {
        let mut p = Plan::new("p");
        assert_eq!(p.add_position(Position::xyz(0.0, 0.0, 0.0), 10.0), Some(0));
        assert_eq!(p.add_position(Position::xyz(0.0, 0.0, 0.0), 0.0), Some(0));
        assert_eq!(p.add_position(Position::xyz(0.0, 0.0, 0.0), 5.0), Some(1));
        assert_eq!(p.len(), 3);

        let mut eot = TcpData::default();
        eot.set_eot();
        assert_eq!(p.add(NavPoint::named(Position::xyz(0.0, 0.0, 0.0), 5.0, "x"), eot.clone()), Some(1));
        assert_eq!(p.tcp(1).trk, TrkTcp::Eot);
        assert_eq!(p.point(1).name, "x");
        // second EOT at the same time is refused
        assert_eq!(p.add(NavPoint::new(Position::xyz(0.0, 0.0, 0.0), 5.0), eot), None);
        assert!(!p.has_error());
        assert_eq!(p.warnings().count(), 1);
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let mut p = Plan::new("p");
        assert_eq!(p.add_position(Position::xyz(0.0, 0.0, 0.0), -1.0), None);
        assert_eq!(p.add_position(Position::xyz(0.0, 0.0, 0.0), f64::NAN), None);
        p.add_position(Position::xyz(0.0, 0.0, 0.0), 0.0);
        assert_eq!(p.add_position(Position::lla(0.0, 0.0, 0.0), 1.0), None);
        assert!(p.has_error());
        assert!(matches!(p.into_result(), Err(TrajGenError::InvalidInput(_))));
    }

    #[test]
    fn test_segment_lookup() {
        let p = straight_plan();
        assert_eq!(p.segment(0.0), Some(0));
        assert_eq!(p.segment(15.0), Some(1));
        assert_eq!(p.segment(20.0), Some(2));
        assert_eq!(p.segment(30.0), Some(3));
        assert_eq!(p.segment(30.1), None);
        assert_eq!(p.segment(-0.1), None);
    }

    #[test]
    fn test_linear_speeds() {
        let p = straight_plan();
        assert!((p.gs_out(0) - 100.0).abs() < 1e-9);
        assert!((p.gs_in(3) - 100.0).abs() < 1e-9);
        assert!((p.vs_out(1) - 5.0).abs() < 1e-9);
        assert!((p.trk_out(2) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((p.time_from_distance(0, 1500.0) - 15.0).abs() < 1e-9);
        let (pos, v) = p.position_velocity(12.5).unwrap();
        assert!(pos.distance_h(&Position::xyz(1250.0, 0.0, 0.0)) < 1e-9);
        assert!((pos.alt() - 1062.5).abs() < 1e-9);
        assert!((v.gs - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_shift_negative_drops_overtaken_points() {
        let mut p = straight_plan();
        assert!(p.time_shift_plan(2, -15.0));
        // point at 20 would move to 5 <= 10: removed; point at 30 moves to 15
        assert_eq!(p.len(), 3);
        assert_eq!(p.time(2), 15.0);
        assert!(p.time_shift_plan(1, 2.0));
        assert_eq!(p.time(1), 12.0);
        assert_eq!(p.time(2), 17.0);
    }

    #[test]
    fn test_insert_by_distance_and_set_time() {
        let mut p = straight_plan();
        let ix = p.insert_by_distance(1, -250.0).unwrap();
        assert_eq!(ix, 1);
        assert!((p.time(1) - 7.5).abs() < 1e-9);
        let moved = p.set_time(1, 25.0).unwrap();
        assert_eq!(moved, 3);
    }

    #[test]
    fn test_mk_gs_out_and_in() {
        let mut p = straight_plan();
        assert!(p.mk_gs_out(1, 50.0));
        assert!((p.gs_out(1) - 50.0).abs() < 1e-9);
        assert!((p.time(3) - 40.0).abs() < 1e-9);
        assert!(p.mk_gs_in(1, 200.0));
        assert!((p.time(1) - 5.0).abs() < 1e-9);
        assert!((p.gs_out(1) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_accel_segment_speeds() {
        let mut p = Plan::new("accel");
        // accelerate 1 m/s² from 10 m/s over 10 s: 150 m
        let mut bgs = TcpData::default();
        bgs.set_bgs(1.0);
        let mut egs = TcpData::default();
        egs.set_egs();
        p.add(NavPoint::new(Position::xyz(0.0, 0.0, 0.0), 0.0), bgs);
        p.add(NavPoint::new(Position::xyz(150.0, 0.0, 0.0), 10.0), egs);
        p.add_position(Position::xyz(350.0, 0.0, 0.0), 20.0);
        assert!((p.gs_out(0) - 10.0).abs() < 1e-9);
        assert!((p.gs_final(0) - 20.0).abs() < 1e-9);
        assert!((p.gs_at_time(5.0) - 15.0).abs() < 1e-9);
        assert!((p.gs_out(1) - 20.0).abs() < 1e-9);
        assert!(p.in_gs_change(3.0));
        assert!(!p.in_gs_change(12.0));
        assert!((p.time_from_distance(0, 34.5) - 3.0).abs() < 1e-9);
        assert!(p.well_formed_error().is_none());
    }

    #[test]
    fn test_merge_close_points_combines_tags() {
        let mut p = straight_plan();
        let mut eot = TcpData::default();
        eot.set_eot();
        p.add(NavPoint::named(Position::xyz(1000.0, 0.0, 1050.0), 10.0 + 1e-6, "late"), eot);
        assert_eq!(p.len(), 5);
        p.merge_close_points(MIN_DT);
        assert_eq!(p.len(), 4);
        assert!(p.tcp(1).is_eot());
        assert_eq!(p.point(1).name, "late");
    }

    #[test]
    fn test_clean_plan_is_idempotent() {
        let mut p = straight_plan();
        p.tcp_mut(1).alt_preserve = true;
        p.add_position(Position::xyz(2000.0, 0.0, 1100.0), 20.0 + 1e-7);
        p.clean_plan(MIN_DT);
        let once = p.clone();
        p.clean_plan(MIN_DT);
        assert_eq!(once.points(), p.points());
        assert!(p.points().iter().all(|pp| !pp.tcp.alt_preserve));
    }

    #[test]
    fn test_remove_redundant_points() {
        let mut p = straight_plan();
        p.remove_redundant_points();
        assert_eq!(p.len(), 2);
        assert_eq!(p.time(1), 30.0);
    }

    #[test]
    fn test_track_change_search() {
        let mut p = Plan::new("dogleg");
        p.add_position(Position::xyz(0.0, 0.0, 0.0), 0.0);
        p.add_position(Position::xyz(1000.0, 0.0, 0.0), 10.0);
        p.add_position(Position::xyz(2000.0, 0.0, 0.0), 20.0);
        p.add_position(Position::xyz(2000.0, 1000.0, 0.0), 30.0);
        p.add_position(Position::xyz(2000.0, 2000.0, 0.0), 40.0);
        let straight = 1f64.to_radians();
        assert_eq!(p.prev_track_change(2, straight), 0);
        assert_eq!(p.next_track_change(0, straight), 2);
        assert_eq!(p.next_track_change(2, straight), 4);
        assert_eq!(p.prev_track_change(4, straight), 2);
    }

    #[test]
    fn test_well_formed_detects_open_transition() {
        let mut p = straight_plan();
        p.tcp_mut(1).set_bvs(0.5);
        assert!(p.well_formed_error().is_some());
        p.tcp_mut(2).set_evs();
        assert!(p.well_formed_error().is_none());
    }
}
