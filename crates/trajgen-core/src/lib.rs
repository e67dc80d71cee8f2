pub mod config;
pub mod cursor;
pub mod diagnostics;
pub mod error;
pub mod plan;
pub mod position;
pub mod repair;
pub mod spatial;
pub mod tcp;
pub mod trajgen;
pub mod turn;
pub mod units;

pub use config::{GenerationLimits, TrajGenConfig, TurnCenterMethod};
pub use cursor::{HighestFirst, TimeIndexed};
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
pub use error::TrajGenError;
pub use plan::{Plan, PlanPoint};
pub use position::{LatLonAlt, NavPoint, Position, Velocity};
pub use repair::{
    linear_repair_short_turn_legs, make_vs_short_legs_continuous, mk_vs_continuous_at, repair_plan,
};
pub use tcp::{GsTcp, PointOverrides, SourceRef, TcpData, TcpKind, TrkTcp, VsTcp};
pub use trajgen::{
    direct_to_continue_time, gen_direct_to, gen_direct_to_linear, generate_gs_tcps,
    generate_turn_tcps, generate_vs_tcps, make_kinematic_plan, make_kinematic_plan_checked,
    make_linear_plan, make_marked_vs_constant, mark_vs_changes, stored_config,
};
pub use turn::{turn_generator, turn_generator_timed, TimedTurn, TurnGeometry};
