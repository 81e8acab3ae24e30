//! Command-line parsing for the thermal parameter fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! modeling and fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::OutputSelection;
use crate::math::InputHold;
use crate::logging::LogFormat;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "cell-thermal",
    version,
    about = "Identify battery-cell thermal model parameters from measured data"
)]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    /// Log directives (e.g. `cell_thermal::fit=trace`); overrides -v/-q and RUST_LOG.
    #[arg(long, value_name = "DIRECTIVES", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit parameters to one or more experiments and print diagnostics.
    Fit(FitArgs),
    /// Evaluate a stored parameter record against an experiment.
    Validate(ValidateArgs),
    /// Simulate a stored parameter record over an experiment's inputs.
    Simulate(SimulateArgs),
    /// Generate steady-state and pulsed experiments from ground truth.
    Synth(SynthArgs),
}

/// Options shared by commands that read an experiment CSV.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Initial state as `in_temp,air_temp` (defaults to the first samples).
    #[arg(long, value_name = "IN,AIR", value_parser = parse_x0)]
    pub x0: Option<[f64; 2]>,

    /// Which measured temperatures to use as outputs (defaults to all present).
    #[arg(long, value_enum)]
    pub outputs: Option<OutputChoice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputChoice {
    Surface,
    Air,
    Both,
}

impl From<OutputChoice> for OutputSelection {
    fn from(c: OutputChoice) -> Self {
        match c {
            OutputChoice::Surface => OutputSelection::Surface,
            OutputChoice::Air => OutputSelection::Air,
            OutputChoice::Both => OutputSelection::Both,
        }
    }
}

/// Input interpolation between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum HoldChoice {
    Zero,
    #[default]
    Linear,
}

impl From<HoldChoice> for InputHold {
    fn from(c: HoldChoice) -> Self {
        match c {
            HoldChoice::Zero => InputHold::Zero,
            HoldChoice::Linear => InputHold::Linear,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Experiment CSV(s) to fit; several are fitted in parallel.
    #[arg(long = "data", value_name = "CSV", required = true, num_args = 1..)]
    pub data: Vec<PathBuf>,

    /// Experiment used to resolve derived parameters (defaults to each fitted dataset).
    #[arg(long, value_name = "CSV")]
    pub reference: Option<PathBuf>,

    /// Run configuration JSON.
    #[arg(long, value_name = "JSON")]
    pub config: PathBuf,

    #[command(flatten)]
    pub data_args: DataArgs,

    /// Log every objective evaluation at info level.
    #[arg(long)]
    pub trace_objective: bool,

    /// Write the fitted parameter record (JSON).
    #[arg(long, value_name = "PATH")]
    pub export_params: Option<PathBuf>,

    /// Write the full run report (JSON).
    #[arg(long, value_name = "PATH")]
    pub export_report: Option<PathBuf>,

    /// Write the engine request record (JSON); needs `engine` in the config.
    #[arg(long, value_name = "PATH")]
    pub export_engine: Option<PathBuf>,

    /// Write the simulated trajectory (CSV).
    #[arg(long, value_name = "PATH")]
    pub export_sim: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ValidateArgs {
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Parameter record JSON.
    #[arg(long, value_name = "JSON")]
    pub params: PathBuf,

    #[command(flatten)]
    pub data_args: DataArgs,

    /// Acceptance threshold on the MSE.
    #[arg(long, default_value_t = 1e-3)]
    pub max_mse: f64,

    /// Input hold used when the record was fitted.
    #[arg(long, value_enum, default_value_t = HoldChoice::Linear)]
    pub hold: HoldChoice,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    #[arg(long, value_name = "JSON")]
    pub params: PathBuf,

    #[command(flatten)]
    pub data_args: DataArgs,

    /// Input hold between samples.
    #[arg(long, value_enum, default_value_t = HoldChoice::Linear)]
    pub hold: HoldChoice,

    /// Output CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Ground-truth JSON (five parameters plus `in_temp`, `air_temp`).
    #[arg(long, value_name = "JSON")]
    pub params: PathBuf,

    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Heat generation during the experiments (W).
    #[arg(long, default_value_t = 2.0)]
    pub power: f64,

    /// Standard deviation of Gaussian sensor noise (K).
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

fn parse_x0(s: &str) -> Result<[f64; 2], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [a, b] = parts.as_slice() else {
        return Err(format!("expected two comma-separated values, got '{s}'"));
    };
    let parse = |v: &str| v.parse::<f64>().map_err(|e| format!("'{v}': {e}"));
    Ok([parse(*a)?, parse(*b)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_accepts_several_datasets() {
        let cli = Cli::try_parse_from([
            "cell-thermal", "-v", "fit", "--data", "a.csv", "b.csv", "--config", "run.json",
            "--x0", "25, 24.5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.data.len(), 2);
        assert_eq!(args.data_args.x0, Some([25.0, 24.5]));
    }

    #[test]
    fn validate_and_simulate_take_a_hold() {
        let cli = Cli::try_parse_from([
            "cell-thermal", "validate", "--data", "a.csv", "--params", "p.json", "--hold", "zero",
        ])
        .unwrap();
        let Command::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(InputHold::from(args.hold), InputHold::Zero);

        let cli = Cli::try_parse_from([
            "cell-thermal", "simulate", "--data", "a.csv", "--params", "p.json", "--out", "s.csv",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(InputHold::from(args.hold), InputHold::default());
    }

    #[test]
    fn log_filter_is_global() {
        let cli = Cli::try_parse_from([
            "cell-thermal", "synth", "--params", "t.json", "--out-dir", "out",
            "--log-filter", "cell_thermal=debug",
        ])
        .unwrap();
        assert_eq!(cli.log_filter.as_deref(), Some("cell_thermal=debug"));
    }

    #[test]
    fn bad_x0_is_rejected() {
        assert!(parse_x0("1,2,3").is_err());
        assert!(parse_x0("a,2").is_err());
    }
}
