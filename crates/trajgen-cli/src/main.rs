//! trajgen - convert linear flight plans into kinematic trajectories

mod config;
mod demo;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trajgen_core::{make_kinematic_plan, make_linear_plan, Plan, TrajGenConfig, TurnCenterMethod};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a kinematic plan from a linear plan
    Generate {
        /// Linear plan (JSON)
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Rebuild the linear plan a kinematic plan came from
    Revert {
        /// Kinematic plan (JSON)
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Generate a kinematic plan for a random route
    Demo {
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 6)]
        legs: usize,
        /// Write the linear route only
        #[arg(long)]
        linear_only: bool,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        limits: LimitArgs,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LimitArgs {
    /// Generation config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Maximum bank angle in degrees
    #[arg(long)]
    bank_deg: Option<f64>,
    /// Ground-speed acceleration (m/s²)
    #[arg(long)]
    gs_accel: Option<f64>,
    /// Vertical-speed acceleration (m/s²)
    #[arg(long)]
    vs_accel: Option<f64>,
    #[arg(long, value_enum)]
    turn_center: Option<TurnCenterArg>,
    /// Treat warnings as failures
    #[arg(long)]
    fail_on_warning: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TurnCenterArg {
    Chordal,
    Tangent,
}

impl From<TurnCenterArg> for TurnCenterMethod {
    fn from(arg: TurnCenterArg) -> Self {
        match arg {
            TurnCenterArg::Chordal => TurnCenterMethod::Chordal,
            TurnCenterArg::Tangent => TurnCenterMethod::Tangent,
        }
    }
}

impl LimitArgs {
    fn resolve(&self) -> Result<TrajGenConfig> {
        let mut config = config::load_file(self.config.as_deref())?;
        config::Config::from_env().apply(&mut config);
        if let Some(bank) = self.bank_deg {
            config.bank_angle = bank.to_radians();
        }
        if let Some(a) = self.gs_accel {
            config.gs_accel = a;
        }
        if let Some(a) = self.vs_accel {
            config.vs_accel = a;
        }
        if let Some(method) = self.turn_center {
            config.turn_center = method.into();
        }
        config.validate().context("invalid generation limits")?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: DateTime<Utc>,
    ok: bool,
    plan: &'a Plan,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    match cli.command {
        Command::Generate { input, output, limits } => {
            let config = limits.resolve()?;
            let linear = read_plan(&input)?;
            generate(&linear, &config, limits.fail_on_warning, output.output.as_deref())
        }
        Command::Revert { input, output } => {
            let kinematic = read_plan(&input)?;
            let linear = make_linear_plan(&kinematic);
            tracing::info!("Reverted {} to {} points", kinematic.name, linear.len());
            write_report(&linear, true, output.output.as_deref())
        }
        Command::Demo { seed, legs, linear_only, output, limits } => {
            let linear = demo::random_route(seed, legs);
            if linear_only {
                return write_report(&linear, true, output.output.as_deref());
            }
            let config = limits.resolve()?;
            generate(&linear, &config, limits.fail_on_warning, output.output.as_deref())
        }
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("trajgen_cli=info".parse()?)
        .add_directive("trajgen_core=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    Ok(())
}

fn read_plan(path: &Path) -> Result<Plan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading plan {}", path.display()))?;
    let mut value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing plan {}", path.display()))?;
    // accept our own report output as input
    if let Some(inner) = value.get_mut("plan").map(serde_json::Value::take) {
        value = inner;
    }
    let plan: Plan = serde_json::from_value(value)
        .with_context(|| format!("parsing plan {}", path.display()))?;
    Ok(plan.normalized())
}

fn generate(linear: &Plan, config: &TrajGenConfig, fail_on_warning: bool, out: Option<&Path>) -> Result<()> {
    tracing::info!("Generating kinematic plan for {} ({} points)", linear.name, linear.len());
    let kinematic = make_kinematic_plan(linear, config);
    let warnings = kinematic.warnings().count();
    let ok = !kinematic.has_error() && !(fail_on_warning && warnings > 0);
    write_report(&kinematic, ok, out)?;

    if let Some(err) = kinematic.first_error() {
        bail!("generation failed: {}", err);
    }
    if fail_on_warning && warnings > 0 {
        bail!("generation produced {} warning(s)", warnings);
    }
    tracing::info!("Generated {} points, {} warning(s)", kinematic.len(), warnings);
    Ok(())
}

fn write_report(plan: &Plan, ok: bool, out: Option<&Path>) -> Result<()> {
    let report = Report {
        generated_at: Utc::now(),
        ok,
        plan,
    };
    let json = serde_json::to_string_pretty(&report).context("serializing plan")?;
    match out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
