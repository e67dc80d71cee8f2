//! Generation limits and repair switches.

use crate::error::TrajGenError;
use crate::units::{feet, fpm, knots};
use serde::{Deserialize, Serialize};

/// How turn begin/end points are placed on a geodetic plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnCenterMethod {
    /// Exact intersection of the two great-circle offset planes, chordal radius.
    #[default]
    Chordal,
    /// Tangent points placed `R·tan(Δ/2)` along each leg from the vertex.
    Tangent,
}

/// Thresholds below which a change is treated as "no change".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationLimits {
    /// Minimum track change that produces a turn (rad)
    pub min_trk_delta: f64,
    /// Minimum ground-speed change that produces a BGS/EGS pair (m/s)
    pub min_gs_delta: f64,
    /// Minimum vertical-speed change that produces a BVS/EVS pair (m/s)
    pub min_vs_delta: f64,
    /// Points closer in time than this are merged (s)
    pub min_dt: f64,
    /// Legs at least this long mark their start as AltPreserve (s)
    pub min_mark_leg_time: f64,
    /// Input vertical speed above this raises a warning (m/s)
    pub max_vs: f64,
    /// Generated altitudes must stay within [0, max_alt] (m)
    pub max_alt: f64,
    /// Ground-speed transitions shorter than this are skipped (m)
    pub min_gs_transition_dist: f64,
    /// Track change still considered "straight" when searching for neighbors (rad)
    pub max_turn_delta_straight: f64,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        Self {
            min_trk_delta: 1f64.to_radians(),
            min_gs_delta: knots(10.0),
            min_vs_delta: fpm(200.0),
            min_dt: 1e-5,
            min_mark_leg_time: 50.0,
            max_vs: fpm(10_000.0),
            max_alt: feet(60_000.0),
            min_gs_transition_dist: feet(50.0),
            max_turn_delta_straight: 1f64.to_radians(),
        }
    }
}

/// Vehicle performance limits and repair switches for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajGenConfig {
    /// Maximum bank angle (rad)
    pub bank_angle: f64,
    /// Ground-speed acceleration limit (m/s²)
    pub gs_accel: f64,
    /// Vertical-speed acceleration limit (m/s²)
    pub vs_accel: f64,
    /// Fold vertices whose neighboring turns would collide
    pub repair_turn: bool,
    /// Let a speed change extend over following legs when the first is too short
    pub repair_gs: bool,
    /// Smooth vertical-speed legs too short for their accelerations
    pub repair_vs: bool,
    pub turn_center: TurnCenterMethod,
    pub limits: GenerationLimits,
}

impl Default for TrajGenConfig {
    fn default() -> Self {
        Self {
            bank_angle: 25f64.to_radians(),
            gs_accel: 2.0,
            vs_accel: 1.0,
            repair_turn: false,
            repair_gs: true,
            repair_vs: false,
            turn_center: TurnCenterMethod::default(),
            limits: GenerationLimits::default(),
        }
    }
}

impl TrajGenConfig {
    pub fn new(bank_angle: f64, gs_accel: f64, vs_accel: f64) -> Self {
        Self {
            bank_angle,
            gs_accel,
            vs_accel,
            ..Self::default()
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, TrajGenError> {
        let config: TrajGenConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrajGenError> {
        let check = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(TrajGenError::Config(format!("{name} must be positive, got {v}")))
            }
        };
        check("bank_angle", self.bank_angle)?;
        check("gs_accel", self.gs_accel)?;
        check("vs_accel", self.vs_accel)?;
        if self.bank_angle >= std::f64::consts::FRAC_PI_2 {
            return Err(TrajGenError::Config(format!(
                "bank_angle must be below 90 degrees, got {}",
                self.bank_angle.to_degrees()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_repair_only_ground_speed() {
        let c = TrajGenConfig::default();
        assert!(!c.repair_turn);
        assert!(c.repair_gs);
        assert!(!c.repair_vs);
        assert_eq!(c.turn_center, TurnCenterMethod::Chordal);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_json_fills_missing_fields() {
        let c = TrajGenConfig::from_json_str(r#"{"gs_accel": 3.0, "turn_center": "tangent"}"#)
            .unwrap();
        assert_eq!(c.gs_accel, 3.0);
        assert_eq!(c.turn_center, TurnCenterMethod::Tangent);
        assert_eq!(c.vs_accel, TrajGenConfig::default().vs_accel);
        assert!((c.limits.min_dt - 1e-5).abs() < 1e-18);
    }

    #[test]
    fn test_validate_rejects_zero_accel() {
        let c = TrajGenConfig::new(0.3, 0.0, 1.0);
        assert!(matches!(c.validate(), Err(TrajGenError::Config(_))));
        assert!(TrajGenConfig::from_json_str("{\"bank_angle\": -1}").is_err());
    }
}
