//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - loads experiments and the run configuration
//! - runs fitting + validation
//! - prints reports
//! - writes optional exports

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};

use crate::cli::{Cli, Command, DataArgs, FitArgs, SimulateArgs, SynthArgs, ValidateArgs};
use crate::config::RunConfig;
use crate::data::generate_pair;
use crate::error::AppError;
use crate::io::{
    load_dataset, read_ground_truth, read_params, write_dataset_csv, write_engine_request,
    write_ground_truth, write_params, write_simulation_csv, IngestOptions,
};
use crate::logging::{init_logging, LogConfig};
use crate::validate::Acceptance;

pub mod pipeline;

/// Entry point for the `cell-thermal` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(
        &LogConfig::from_verbosity(cli.verbose, cli.quiet, cli.log_format).with_filter(cli.log_filter),
    );

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Validate(args) => handle_validate(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn ingest_options(args: &DataArgs, config: Option<&RunConfig>) -> IngestOptions {
    IngestOptions {
        outputs: args
            .outputs
            .map(Into::into)
            .or_else(|| config.and_then(|c| c.outputs)),
        x0: args.x0,
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let mut config = RunConfig::load(&args.config)?;
    if args.trace_objective {
        config.minimizer.verbose = true;
    }
    if args.export_engine.is_some() && config.engine.is_none() {
        return Err(AppError::new(
            2,
            "--export-engine needs an `engine` section in the run configuration.",
        ));
    }

    let options = ingest_options(&args.data_args, Some(&config));
    let results = pipeline::run_fit(&args.data, args.reference.as_deref(), &config, &options)?;
    let multi = results.len() > 1;

    let mut first_error = None;
    for result in results {
        let run = match result.run {
            Ok(run) => run,
            Err(err) => {
                eprintln!("{}: {err}", result.path.display());
                first_error.get_or_insert(err);
                continue;
            }
        };

        println!(
            "{}",
            crate::report::format_run_summary(&run.report, Some(&run.ingest.stats))
        );

        let tag = result.path.file_stem().and_then(|s| s.to_str()).unwrap_or("run");
        if let Some(path) = &args.export_params {
            write_params(&export_path(path, tag, multi), &run.outcome.params)?;
        }
        if let Some(path) = &args.export_report {
            run.report.write_json(&export_path(path, tag, multi))?;
        }
        if let (Some(path), Some(engine)) = (&args.export_engine, &config.engine) {
            let request = engine.request(run.outcome.params, run.ingest.dataset.x0()[0]);
            write_engine_request(&export_path(path, tag, multi), &request)?;
        }
        if let Some(path) = &args.export_sim {
            let (full, evaluation) =
                pipeline::run_simulate(&run.outcome.params, &run.ingest, config.hold)?;
            write_simulation_csv(
                &export_path(path, tag, multi),
                &run.ingest.dataset,
                &full,
                &evaluation.residual,
            )?;
        }
        if !run.report.accepted {
            warn!(dataset = %result.path.display(), mse = run.report.validation.residuals.mse, "fit is outside acceptance");
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn handle_validate(args: ValidateArgs) -> Result<(), AppError> {
    let params = read_params(&args.params)?;
    let ingest = load_dataset(&args.data, &ingest_options(&args.data_args, None))?;
    let (report, _) = pipeline::run_validate(&params, &ingest, args.hold.into())?;

    let acceptance = Acceptance {
        max_mse: args.max_mse,
        ..Acceptance::default()
    };
    println!("Parameters: {}", crate::report::format_params(&params));
    print!("{}", crate::report::format_validation(&report));
    println!(
        "Acceptance (mse <= {:.1e}): {}",
        acceptance.max_mse,
        if report.accepts(&acceptance) { "PASS" } else { "FAIL" }
    );
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let params = read_params(&args.params)?;
    let ingest = load_dataset(&args.data, &ingest_options(&args.data_args, None))?;
    let (full, evaluation) = pipeline::run_simulate(&params, &ingest, args.hold.into())?;
    write_simulation_csv(&args.out, &ingest.dataset, &full, &evaluation.residual)?;
    info!(path = %args.out.display(), samples = ingest.dataset.len(), "simulation written");
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let truth = read_ground_truth(&args.params)?;
    let pair = generate_pair(&truth, args.power, args.noise, args.seed)?;

    std::fs::create_dir_all(&args.out_dir).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create output directory '{}': {e}", args.out_dir.display()),
        )
    })?;
    write_dataset_csv(&args.out_dir.join("exp1_sim.csv"), &pair.steady_state)?;
    write_dataset_csv(&args.out_dir.join("exp2_sim.csv"), &pair.pulsed)?;
    write_ground_truth(&args.out_dir.join("params.json"), &truth)?;

    println!(
        "Wrote exp1_sim.csv ({} samples), exp2_sim.csv ({} samples), params.json to {}",
        pair.steady_state.len(),
        pair.pulsed.len(),
        args.out_dir.display()
    );
    Ok(())
}

/// `base` itself for a single dataset, `<stem>_<tag>.<ext>` next to it otherwise.
fn export_path(base: &Path, tag: &str, multi: bool) -> PathBuf {
    if !multi {
        return base.to_path_buf();
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("export");
    let name = match base.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{tag}.{ext}"),
        None => format!("{stem}_{tag}"),
    };
    base.with_file_name(name)
}
