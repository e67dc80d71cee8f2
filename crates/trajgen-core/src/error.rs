//! `Result`-side view of generation failures.

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrajGenError {
    #[error("turn infeasible at vertex {index:?}: {message}")]
    TurnInfeasible { message: String, index: Option<usize> },
    #[error("transition overlap at vertex {index:?}: {message}")]
    Overlap { message: String, index: Option<usize> },
    #[error("kinematic infeasibility at vertex {index:?}: {message}")]
    Kinematic { message: String, index: Option<usize> },
    #[error("numerical degeneracy at vertex {index:?}: {message}")]
    Degenerate { message: String, index: Option<usize> },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl From<&Diagnostic> for TrajGenError {
    fn from(d: &Diagnostic) -> Self {
        let message = d.message.clone();
        let index = d.index;
        match d.kind {
            DiagnosticKind::TurnInfeasible => TrajGenError::TurnInfeasible { message, index },
            DiagnosticKind::TurnOverlap
            | DiagnosticKind::GsAccelOverlap
            | DiagnosticKind::VsAccelOverlap => TrajGenError::Overlap { message, index },
            DiagnosticKind::GsAccelDistance
            | DiagnosticKind::GsToZero
            | DiagnosticKind::VsAccelTime => TrajGenError::Kinematic { message, index },
            DiagnosticKind::TurnGeometry
            | DiagnosticKind::AltitudeOutOfBounds
            | DiagnosticKind::InvalidAccel
            | DiagnosticKind::PlanEdit
            | DiagnosticKind::ExcessiveVerticalSpeed => TrajGenError::Degenerate { message, index },
            DiagnosticKind::InvalidInput => TrajGenError::InvalidInput(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_maps_to_taxonomy() {
        let d = Diagnostic::error(DiagnosticKind::GsAccelDistance, "too short", Some(4));
        let err = TrajGenError::from(&d);
        assert!(matches!(err, TrajGenError::Kinematic { index: Some(4), .. }));
        assert!(err.to_string().contains("too short"));
    }
}
