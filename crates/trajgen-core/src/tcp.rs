//! Trajectory change point tags.
//!
//! Every plan point carries a [`TcpData`] that independently tracks the
//! track, ground-speed and vertical-speed axes. A point may end one
//! transition and begin the next on the same axis (`EotBot`, `EgsBgs`,
//! `EvsBvs`).

use crate::position::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrkTcp {
    #[default]
    None,
    Bot,
    Mot,
    Eot,
    EotBot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GsTcp {
    #[default]
    None,
    Bgs,
    Egs,
    EgsBgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VsTcp {
    #[default]
    None,
    Bvs,
    Evs,
    EvsBvs,
}

/// The fixed set of trajectory change point kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TcpKind {
    Bot,
    Mot,
    Eot,
    Bgs,
    Egs,
    Bvs,
    Evs,
}

impl fmt::Display for TcpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TcpKind::Bot => "BOT",
            TcpKind::Mot => "MOT",
            TcpKind::Eot => "EOT",
            TcpKind::Bgs => "BGS",
            TcpKind::Egs => "EGS",
            TcpKind::Bvs => "BVS",
            TcpKind::Evs => "EVS",
        };
        f.write_str(s)
    }
}

/// The linear point a generated or moved point descends from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub position: Position,
    pub time: f64,
}

/// Per-vertex values that replace the global generation limits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PointOverrides {
    /// Turn radius in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_radius: Option<f64>,
    /// Ground-speed acceleration magnitude in m/s².
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gs_accel: Option<f64>,
    /// Vertical-speed acceleration magnitude in m/s².
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vs_accel: Option<f64>,
}

impl PointOverrides {
    pub fn is_empty(&self) -> bool {
        self.turn_radius.is_none() && self.gs_accel.is_none() && self.vs_accel.is_none()
    }

    /// Field-wise union; values already set win.
    pub fn or(&self, other: &PointOverrides) -> PointOverrides {
        PointOverrides {
            turn_radius: self.turn_radius.or(other.turn_radius),
            gs_accel: self.gs_accel.or(other.gs_accel),
            vs_accel: self.vs_accel.or(other.vs_accel),
        }
    }
}

/// Info flag appended to a BOT whose radius came from a per-vertex override.
pub const MANUAL_RADIUS: &str = "<manualRadius>";
/// Info flag appended to a point whose ground-speed acceleration was overridden.
pub const MANUAL_GS_ACCEL: &str = "<manualGsAccel>";
/// Info flag appended to a BVS whose acceleration was overridden.
pub const MANUAL_VS_ACCEL: &str = "<manualVsAccel>";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpData {
    pub trk: TrkTcp,
    pub gs: GsTcp,
    pub vs: VsTcp,
    /// Signed turn radius stored on a BOT; negative turns left.
    pub radius_signed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<Position>,
    /// Signed acceleration stored on a BGS.
    pub gs_accel: f64,
    /// Signed acceleration stored on a BVS.
    pub vs_accel: f64,
    pub alt_preserve: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(skip_serializing_if = "PointOverrides::is_empty")]
    pub overrides: PointOverrides,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub info: String,
}

impl TcpData {
    pub fn is_bot(&self) -> bool {
        matches!(self.trk, TrkTcp::Bot | TrkTcp::EotBot)
    }

    pub fn is_eot(&self) -> bool {
        matches!(self.trk, TrkTcp::Eot | TrkTcp::EotBot)
    }

    pub fn is_mot(&self) -> bool {
        self.trk == TrkTcp::Mot
    }

    pub fn is_bgs(&self) -> bool {
        matches!(self.gs, GsTcp::Bgs | GsTcp::EgsBgs)
    }

    pub fn is_egs(&self) -> bool {
        matches!(self.gs, GsTcp::Egs | GsTcp::EgsBgs)
    }

    pub fn is_bvs(&self) -> bool {
        matches!(self.vs, VsTcp::Bvs | VsTcp::EvsBvs)
    }

    pub fn is_evs(&self) -> bool {
        matches!(self.vs, VsTcp::Evs | VsTcp::EvsBvs)
    }

    pub fn is_trk_tcp(&self) -> bool {
        self.is_bot() || self.is_eot()
    }

    pub fn is_gs_tcp(&self) -> bool {
        self.gs != GsTcp::None
    }

    pub fn is_vs_tcp(&self) -> bool {
        self.vs != VsTcp::None
    }

    /// True for any begin or end point; MOT does not count.
    pub fn is_tcp(&self) -> bool {
        self.is_trk_tcp() || self.is_gs_tcp() || self.is_vs_tcp()
    }

    pub fn is_begin_tcp(&self) -> bool {
        self.is_bot() || self.is_bgs() || self.is_bvs()
    }

    pub fn is_linear(&self) -> bool {
        !self.is_tcp() && !self.is_mot()
    }

    /// All kinds this point carries, in axis order.
    pub fn kinds(&self) -> Vec<TcpKind> {
        let mut kinds = Vec::new();
        if self.is_eot() {
            kinds.push(TcpKind::Eot);
        }
        if self.is_bot() {
            kinds.push(TcpKind::Bot);
        }
        if self.is_mot() {
            kinds.push(TcpKind::Mot);
        }
        if self.is_egs() {
            kinds.push(TcpKind::Egs);
        }
        if self.is_bgs() {
            kinds.push(TcpKind::Bgs);
        }
        if self.is_evs() {
            kinds.push(TcpKind::Evs);
        }
        if self.is_bvs() {
            kinds.push(TcpKind::Bvs);
        }
        kinds
    }

    pub fn set_bot(&mut self, radius_signed: f64, center: Position) -> &mut Self {
        self.trk = if self.is_eot() { TrkTcp::EotBot } else { TrkTcp::Bot };
        self.radius_signed = radius_signed;
        self.center = Some(center);
        self
    }

    pub fn set_eot(&mut self) -> &mut Self {
        self.trk = if self.is_bot() { TrkTcp::EotBot } else { TrkTcp::Eot };
        self
    }

    pub fn set_mot(&mut self) -> &mut Self {
        if self.trk == TrkTcp::None {
            self.trk = TrkTcp::Mot;
        }
        self
    }

    pub fn set_bgs(&mut self, accel: f64) -> &mut Self {
        self.gs = if self.is_egs() { GsTcp::EgsBgs } else { GsTcp::Bgs };
        self.gs_accel = accel;
        self
    }

    pub fn set_egs(&mut self) -> &mut Self {
        self.gs = if self.is_bgs() { GsTcp::EgsBgs } else { GsTcp::Egs };
        self
    }

    pub fn set_bvs(&mut self, accel: f64) -> &mut Self {
        self.vs = if self.is_evs() { VsTcp::EvsBvs } else { VsTcp::Bvs };
        self.vs_accel = accel;
        self
    }

    pub fn set_evs(&mut self) -> &mut Self {
        self.vs = if self.is_bvs() { VsTcp::EvsBvs } else { VsTcp::Evs };
        self
    }

    pub fn clear_bot(&mut self) {
        self.trk = match self.trk {
            TrkTcp::EotBot => TrkTcp::Eot,
            TrkTcp::Bot => TrkTcp::None,
            other => other,
        };
        if !self.is_bot() {
            self.radius_signed = 0.0;
            self.center = None;
        }
    }

    pub fn clear_eot(&mut self) {
        self.trk = match self.trk {
            TrkTcp::EotBot => TrkTcp::Bot,
            TrkTcp::Eot => TrkTcp::None,
            other => other,
        };
    }

    pub fn clear_bgs(&mut self) {
        self.gs = match self.gs {
            GsTcp::EgsBgs => GsTcp::Egs,
            GsTcp::Bgs => GsTcp::None,
            other => other,
        };
        if !self.is_bgs() {
            self.gs_accel = 0.0;
        }
    }

    pub fn clear_egs(&mut self) {
        self.gs = match self.gs {
            GsTcp::EgsBgs => GsTcp::Bgs,
            GsTcp::Egs => GsTcp::None,
            other => other,
        };
    }

    pub fn clear_bvs(&mut self) {
        self.vs = match self.vs {
            VsTcp::EvsBvs => VsTcp::Evs,
            VsTcp::Bvs => VsTcp::None,
            other => other,
        };
        if !self.is_bvs() {
            self.vs_accel = 0.0;
        }
    }

    pub fn clear_evs(&mut self) {
        self.vs = match self.vs {
            VsTcp::EvsBvs => VsTcp::Bvs,
            VsTcp::Evs => VsTcp::None,
            other => other,
        };
    }

    pub fn append_info(&mut self, info: &str) {
        if !self.info.contains(info) {
            self.info.push_str(info);
        }
    }

    /// Two tags can share a point unless both begin or both end the same axis.
    pub fn mergeable(&self, other: &TcpData) -> bool {
        let trk_ok = !(self.is_bot() && other.is_bot()) && !(self.is_eot() && other.is_eot());
        let gs_ok = !(self.is_bgs() && other.is_bgs()) && !(self.is_egs() && other.is_egs());
        let vs_ok = !(self.is_bvs() && other.is_bvs()) && !(self.is_evs() && other.is_evs());
        trk_ok && gs_ok && vs_ok
    }

    /// Combine two tags on one point. Begin data (radius, center, accelerations)
    /// comes from whichever side begins the axis.
    pub fn merge(&self, other: &TcpData) -> TcpData {
        let mut out = self.clone();

        if other.is_eot() {
            out.set_eot();
        }
        if other.is_bot() {
            out.radius_signed = other.radius_signed;
            out.center = other.center;
            out.trk = if out.is_eot() { TrkTcp::EotBot } else { TrkTcp::Bot };
        }
        if other.is_mot() {
            out.set_mot();
        }

        if other.is_egs() {
            out.set_egs();
        }
        if other.is_bgs() {
            out.set_bgs(other.gs_accel);
        }

        if other.is_evs() {
            out.set_evs();
        }
        if other.is_bvs() {
            out.set_bvs(other.vs_accel);
        }

        out.alt_preserve = self.alt_preserve || other.alt_preserve;
        if out.source.is_none() {
            out.source = other.source.clone();
        }
        out.overrides = self.overrides.or(&other.overrides);
        if !other.info.is_empty() {
            out.append_info(&other.info);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center() -> Position {
        Position::xyz(0.0, 0.0, 0.0)
    }

    #[test]
    fn test_eot_and_bot_merge_into_eotbot() {
        let mut eot = TcpData::default();
        eot.set_eot();
        let mut bot = TcpData::default();
        bot.set_bot(-1500.0, center());

        assert!(eot.mergeable(&bot));
        let merged = eot.merge(&bot);
        assert_eq!(merged.trk, TrkTcp::EotBot);
        assert_eq!(merged.radius_signed, -1500.0);
        assert!(merged.center.is_some());
        assert_eq!(merged.kinds(), vec![TcpKind::Eot, TcpKind::Bot]);
    }

    #[test]
    fn test_same_begin_is_not_mergeable() {
        let mut a = TcpData::default();
        a.set_bgs(1.0);
        let mut b = TcpData::default();
        b.set_bgs(-1.0);
        assert!(!a.mergeable(&b));

        let mut c = TcpData::default();
        c.set_evs();
        assert!(a.mergeable(&c));
    }

    #[test]
    fn test_clear_restores_linear() {
        let mut t = TcpData::default();
        t.set_bvs(0.5);
        t.set_evs();
        assert_eq!(t.vs, VsTcp::EvsBvs);
        t.clear_bvs();
        assert_eq!(t.vs, VsTcp::Evs);
        assert_eq!(t.vs_accel, 0.0);
        t.clear_evs();
        assert!(t.is_linear());
    }

    #[test]
    fn test_merge_keeps_existing_source_and_unions_overrides() {
        let src = SourceRef {
            position: center(),
            time: 3.0,
        };
        let a = TcpData {
            source: Some(src.clone()),
            overrides: PointOverrides {
                turn_radius: Some(500.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let b = TcpData {
            source: Some(SourceRef {
                position: center(),
                time: 9.0,
            }),
            overrides: PointOverrides {
                gs_accel: Some(1.5),
                ..Default::default()
            },
            info: "<x>".into(),
            alt_preserve: true,
            ..Default::default()
        };
        let m = a.merge(&b);
        assert_eq!(m.source, Some(src));
        assert_eq!(m.overrides.turn_radius, Some(500.0));
        assert_eq!(m.overrides.gs_accel, Some(1.5));
        assert!(m.alt_preserve);
        assert_eq!(m.info, "<x>");
    }
}
