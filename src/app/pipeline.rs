//! Shared "fit pipeline" logic used by the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! CSV ingest -> parameter resolution -> fit (parallel per dataset) ->
//! validation -> report
//!
//! The command handlers can then focus on presentation and exports.

use std::path::{Path, PathBuf};

use tracing::{info, info_span, Span};

use crate::config::RunConfig;
use crate::domain::ThermalParams;
use crate::error::AppError;
use crate::fit::{fit_batch, generate_evaluation, simulate, EvaluationResult, FitJob, FitOutcome, Trajectory};
use crate::io::{load_dataset, IngestOptions, IngestedData};
use crate::math::InputHold;
use crate::models::build_system;
use crate::report::RunReport;
use crate::validate::{ValidationReport, Validator};

/// All computed outputs of one fitted dataset.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub ingest: IngestedData,
    pub outcome: FitOutcome,
    pub evaluation: EvaluationResult,
    pub report: RunReport,
}

/// Per-dataset result of a `fit` invocation, in input order.
#[derive(Debug)]
pub struct FitRunResult {
    pub path: PathBuf,
    pub run: Result<FitRun, AppError>,
}

/// Execute the full fitting pipeline over every dataset.
///
/// Ingest errors abort the whole run; fit errors are reported per dataset.
pub fn run_fit(
    paths: &[PathBuf],
    reference: Option<&Path>,
    config: &RunConfig,
    ingest: &IngestOptions,
) -> Result<Vec<FitRunResult>, AppError> {
    let span = info_span!("fit");

    let ingested = paths
        .iter()
        .map(|p| load_dataset(p, ingest))
        .collect::<Result<Vec<_>, _>>()?;
    let reference = reference
        .map(|p| load_dataset(p, &IngestOptions::default()))
        .transpose()?;

    let jobs: Vec<FitJob> = ingested
        .iter()
        .map(|ing| FitJob {
            label: ing.path.display().to_string(),
            dataset: ing.dataset.clone(),
            reference: reference.as_ref().map(|r| r.dataset.clone()),
            initial_guess: config.initial_guess,
            fixed: config.fixed_spec(),
            free: config.free.clone(),
            options: config.fit_options(),
            priors: config.prior.clone(),
        })
        .collect();

    info!(parent: &span, jobs = jobs.len(), "fitting datasets");
    let results = fit_batch(&jobs, &span);

    Ok(results
        .into_iter()
        .zip(ingested)
        .map(|(result, ing)| FitRunResult {
            path: ing.path.clone(),
            run: result
                .outcome
                .map_err(AppError::from)
                .and_then(|outcome| finish_run(ing, outcome, config, &span)),
        })
        .collect())
}

fn finish_run(
    ingest: IngestedData,
    outcome: FitOutcome,
    config: &RunConfig,
    span: &Span,
) -> Result<FitRun, AppError> {
    let evaluation = generate_evaluation(&ingest.dataset)
        .with_hold(config.hold)
        .with_span(span.clone())
        .evaluate_system(&outcome.system)?;
    let validation = Validator::new(config.metric, config.hold)
        .with_span(span.clone())
        .validate(&outcome.system, &evaluation);
    let report = RunReport::new(
        ingest.path.display().to_string(),
        &outcome,
        validation,
        config.acceptance,
    );
    Ok(FitRun {
        ingest,
        outcome,
        evaluation,
        report,
    })
}

/// Evaluate a stored record against a dataset.
pub fn run_validate(
    params: &ThermalParams,
    ingest: &IngestedData,
    hold: InputHold,
) -> Result<(ValidationReport, EvaluationResult), AppError> {
    let span = info_span!("validate");
    let validator = Validator::new(Default::default(), hold).with_span(span);
    Ok(validator.validate_params(params, &ingest.dataset)?)
}

/// Full two-output simulation plus residuals against the measured outputs.
pub fn run_simulate(
    params: &ThermalParams,
    ingest: &IngestedData,
    hold: InputHold,
) -> Result<(Trajectory, EvaluationResult), AppError> {
    let ds = &ingest.dataset;
    let full = simulate(&build_system(params)?, ds.u(), ds.t(), ds.x0(), hold);
    let evaluation = generate_evaluation(ds).with_hold(hold).evaluate(params)?;
    Ok((full, evaluation))
}
