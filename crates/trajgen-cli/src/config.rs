//! CLI configuration: defaults, then a JSON file, then environment, then flags.

use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use trajgen_core::TrajGenConfig;

/// Overrides read from the environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Bank angle in degrees (`TRAJGEN_BANK_DEG`)
    pub bank_deg: Option<f64>,
    /// Ground-speed acceleration in m/s² (`TRAJGEN_GS_ACCEL`)
    pub gs_accel: Option<f64>,
    /// Vertical-speed acceleration in m/s² (`TRAJGEN_VS_ACCEL`)
    pub vs_accel: Option<f64>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bank_deg: env::var("TRAJGEN_BANK_DEG").ok().and_then(|s| s.parse().ok()),
            gs_accel: env::var("TRAJGEN_GS_ACCEL").ok().and_then(|s| s.parse().ok()),
            vs_accel: env::var("TRAJGEN_VS_ACCEL").ok().and_then(|s| s.parse().ok()),
        }
    }

    pub fn apply(&self, config: &mut TrajGenConfig) {
        if let Some(bank) = self.bank_deg {
            config.bank_angle = bank.to_radians();
        }
        if let Some(a) = self.gs_accel {
            config.gs_accel = a;
        }
        if let Some(a) = self.vs_accel {
            config.vs_accel = a;
        }
    }
}

/// Base configuration: the file at `path` if given, otherwise defaults.
pub fn load_file(path: Option<&Path>) -> Result<TrajGenConfig> {
    let Some(path) = path else {
        return Ok(TrajGenConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    TrajGenConfig::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_only_set_fields() {
        let mut config = TrajGenConfig::default();
        let overrides = Config {
            bank_deg: Some(30.0),
            gs_accel: None,
            vs_accel: Some(0.5),
        };
        overrides.apply(&mut config);
        assert!((config.bank_angle - 30f64.to_radians()).abs() < 1e-12);
        assert_eq!(config.gs_accel, TrajGenConfig::default().gs_accel);
        assert_eq!(config.vs_accel, 0.5);
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let config = load_file(None).unwrap();
        assert_eq!(config.vs_accel, TrajGenConfig::default().vs_accel);
    }
}
