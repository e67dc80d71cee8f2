//! Errors and warnings recorded on a plan during generation.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Malformed input: bad times, mixed frames, too few points.
    InvalidInput,
    /// Turn radius too large for the surrounding legs.
    TurnInfeasible,
    /// New turn would overlap an existing turn in time.
    TurnOverlap,
    /// Turn geometry could not be constructed.
    TurnGeometry,
    /// Not enough distance to finish a ground-speed change.
    GsAccelDistance,
    /// Not enough distance to stop.
    GsToZero,
    /// Ground-speed change would overlap another one.
    GsAccelOverlap,
    /// Not enough time to finish a vertical-speed change.
    VsAccelTime,
    /// Vertical-speed change would overlap another one.
    VsAccelOverlap,
    /// Generated altitude left the permitted band.
    AltitudeOutOfBounds,
    /// Acceleration limit is zero or otherwise unusable.
    InvalidAccel,
    /// A plan edit could not be carried out.
    PlanEdit,
    /// Input vertical speed above the warning threshold.
    ExcessiveVerticalSpeed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    /// Offending vertex, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            index,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            index,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.index {
            Some(i) => write!(f, "{level} at {i}: {}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}
