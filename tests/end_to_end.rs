//! Identification from two synthetic experiments with known ground truth.
//!
//! exp1 holds constant power until steady state and pins `rout`; exp2 pulses
//! the power and is used to fit `cp` and `rin` with `cair`, `rair` fixed.

use approx::assert_relative_eq;

use cell_thermal::data::{generate_pair, ExperimentPair, GroundTruth};
use cell_thermal::domain::{Dataset, ThermalParams, INPUT_AMBIENT, INPUT_POWER};
use cell_thermal::error::FitError;
use cell_thermal::fit::{fit_parameters, Algorithm, FitOptions, Metric, MinimizerConfig, Optimizer};
use cell_thermal::params::{DerivedRule, FixedSpec, ParameterSet};
use cell_thermal::validate::{Acceptance, Validator};

const ALPHA: f64 = 0.1;

fn truth() -> GroundTruth {
    GroundTruth {
        params: ThermalParams::new(100.0, 10.0, 3.0, 5.0, 2.0),
        in_temp: 25.0,
        air_temp: 25.0,
    }
}

fn experiments(noise_std: f64) -> ExperimentPair {
    generate_pair(&truth(), 2.0, noise_std, 2024).unwrap()
}

/// `(y_last_surface − u_last_ambient) / u_last_power`.
fn rout_from_last_sample(exp1: &Dataset) -> f64 {
    let n = exp1.len() - 1;
    (exp1.y()[(n, 0)] - exp1.u()[(n, INPUT_AMBIENT)]) / exp1.u()[(n, INPUT_POWER)]
}

fn fixed(exp1: &Dataset) -> FixedSpec {
    let t = truth().params;
    FixedSpec::new()
        .value("cair", t.cair)
        .value("rout", rout_from_last_sample(exp1))
        .value("rair", t.rair)
}

fn nelder_mead() -> FitOptions {
    FitOptions {
        minimizer: MinimizerConfig {
            algorithm: Algorithm::NelderMead,
            tol: 1e-8,
            max_iter: 2000,
            ..MinimizerConfig::default()
        },
        ..FitOptions::default()
    }
}

fn assert_within_alpha(fitted: f64, real: f64, name: &str) {
    let err = (fitted - real).abs() / real;
    assert!(err <= ALPHA, "{name}: {fitted} vs {real} ({:.2}% error)", 100.0 * err);
}

#[test]
fn steady_state_rout_matches_ground_truth() {
    let pair = experiments(0.0);
    assert_relative_eq!(rout_from_last_sample(&pair.steady_state), 5.0, max_relative = 1e-6);
}

#[test]
fn fit_recovers_cp_and_rin() {
    let pair = experiments(0.0);
    let guess = ThermalParams::new(50.0, 10.0, 6.0, 5.0, 2.0);
    let fixed = fixed(&pair.steady_state);

    let fit = fit_parameters(&pair.pulsed, &pair.steady_state, &guess, &fixed, None, &nelder_mead(), None)
        .unwrap();
    let real = truth().params;

    assert_within_alpha(fit.params.cp, real.cp, "cp");
    assert_within_alpha(fit.params.rin, real.rin, "rin");

    // Pinned values come back exactly as resolved.
    assert_eq!(fit.params.cair, real.cair);
    assert_eq!(fit.params.rair, real.rair);
    assert_eq!(fit.params.rout, rout_from_last_sample(&pair.steady_state));

    let (report, _) = Validator::default().validate_params(&fit.params, &pair.pulsed).unwrap();
    assert_eq!(report.observability.rank, 2);
    assert!(report.residuals.mse <= 1e-3, "mse = {:e}", report.residuals.mse);
    assert!(report.accepts(&Acceptance::default()));
}

#[test]
fn derived_rule_resolved_against_reference_experiment() {
    let pair = experiments(0.0);
    let fixed = FixedSpec::new()
        .value("cair", 10.0)
        .value("rair", 2.0)
        .derived("rout", DerivedRule::SteadyStateRout { tail: 1 });
    let guess = ThermalParams::new(150.0, 10.0, 2.0, 1.0, 2.0);

    let set = ParameterSet::resolve(&guess, &fixed, None, &pair.steady_state).unwrap();
    let fit = Optimizer::new(nelder_mead()).fit(&pair.pulsed, &set).unwrap();

    assert_eq!(fit.params.rout, set.seeds().rout);
    assert_within_alpha(fit.params.cp, 100.0, "cp");
    assert_within_alpha(fit.params.rin, 3.0, "rin");
}

#[test]
fn noisy_measurements_still_meet_acceptance() {
    let pair = experiments(0.01);
    let fixed = FixedSpec::new()
        .value("cair", 10.0)
        .value("rair", 2.0)
        .derived("rout", DerivedRule::SteadyStateRout { tail: 50 });
    let guess = ThermalParams::new(60.0, 10.0, 4.5, 5.0, 2.0);

    let fit = fit_parameters(&pair.pulsed, &pair.steady_state, &guess, &fixed, None, &nelder_mead(), None)
        .unwrap();
    assert_within_alpha(fit.params.cp, 100.0, "cp");
    assert_within_alpha(fit.params.rin, 3.0, "rin");

    let (report, _) = Validator::default().validate_params(&fit.params, &pair.pulsed).unwrap();
    assert!(report.residuals.mse <= 1e-3, "mse = {:e}", report.residuals.mse);
}

#[test]
fn lbfgs_on_mse_recovers_cp_and_rin() {
    let pair = experiments(0.0);
    let options = FitOptions {
        metric: Metric::Mse,
        minimizer: MinimizerConfig {
            algorithm: Algorithm::Lbfgs,
            tol: 1e-10,
            max_iter: 500,
            ..MinimizerConfig::default()
        },
        ..FitOptions::default()
    };
    let guess = ThermalParams::new(70.0, 10.0, 4.0, 5.0, 2.0);

    let fit = fit_parameters(
        &pair.pulsed,
        &pair.steady_state,
        &guess,
        &fixed(&pair.steady_state),
        None,
        &options,
        None,
    )
    .unwrap();
    assert_within_alpha(fit.params.cp, 100.0, "cp");
    assert_within_alpha(fit.params.rin, 3.0, "rin");
}

#[test]
fn default_options_recover_cp_and_rin_from_a_distant_seed() {
    let pair = experiments(0.0);
    let rout = rout_from_last_sample(&pair.steady_state);
    let guess = ThermalParams::new(1.0, 10.0, 1.0, rout, 2.0);

    let fit = fit_parameters(
        &pair.pulsed,
        &pair.steady_state,
        &guess,
        &fixed(&pair.steady_state),
        None,
        &FitOptions::default(),
        None,
    )
    .unwrap();
    assert!(fit.diagnostics.converged, "{}", fit.diagnostics.message);
    assert_within_alpha(fit.params.cp, 100.0, "cp");
    assert_within_alpha(fit.params.rin, 3.0, "rin");

    let (report, _) = Validator::default().validate_params(&fit.params, &pair.pulsed).unwrap();
    assert!(report.residuals.mse <= 1e-3, "mse = {:e}", report.residuals.mse);
}

#[test]
fn default_nelder_mead_settles_on_the_minimum() {
    let pair = experiments(0.0);
    let options = FitOptions {
        minimizer: MinimizerConfig {
            algorithm: Algorithm::NelderMead,
            ..MinimizerConfig::default()
        },
        ..FitOptions::default()
    };
    let guess = ThermalParams::new(50.0, 10.0, 6.0, 5.0, 2.0);

    let fit = fit_parameters(
        &pair.pulsed,
        &pair.steady_state,
        &guess,
        &fixed(&pair.steady_state),
        None,
        &options,
        None,
    )
    .unwrap();
    assert_within_alpha(fit.params.cp, 100.0, "cp");
    assert_within_alpha(fit.params.rin, 3.0, "rin");
}

#[test]
fn overconstrained_spec_fails_before_fitting() {
    let pair = experiments(0.0);
    let free = vec!["cp".to_string(), "rout".to_string()];
    let err = fit_parameters(
        &pair.pulsed,
        &pair.steady_state,
        &truth().params,
        &fixed(&pair.steady_state),
        Some(free.as_slice()),
        &nelder_mead(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, FitError::OverconstrainedParameter { ref name, .. } if name == "rout"));
}
