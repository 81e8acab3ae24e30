//! Independent fits over several datasets, in parallel.

use rayon::prelude::*;
use tracing::{info_span, Span};

use crate::domain::{Dataset, ThermalParams};
use crate::error::FitError;
use crate::fit::{FitOptions, FitOutcome, JointPrior, Optimizer, PriorSpec};
use crate::params::{FixedSpec, ParameterSet};

/// One self-contained fitting run.
#[derive(Debug, Clone)]
pub struct FitJob {
    pub label: String,
    pub dataset: Dataset,
    /// Context for derived parameters; the fitting dataset when `None`.
    pub reference: Option<Dataset>,
    pub initial_guess: ThermalParams,
    pub fixed: FixedSpec,
    pub free: Option<Vec<String>>,
    pub options: FitOptions,
    pub priors: Vec<PriorSpec>,
}

impl FitJob {
    pub fn new(label: impl Into<String>, dataset: Dataset, initial_guess: ThermalParams) -> Self {
        Self {
            label: label.into(),
            dataset,
            reference: None,
            initial_guess,
            fixed: FixedSpec::new(),
            free: None,
            options: FitOptions::default(),
            priors: Vec::new(),
        }
    }

    /// Run this job on the current thread, under `span`.
    pub fn run(&self, span: Span) -> Result<FitOutcome, FitError> {
        let reference = self.reference.as_ref().unwrap_or(&self.dataset);
        let set = {
            let _enter = span.enter();
            ParameterSet::resolve(&self.initial_guess, &self.fixed, self.free.as_deref(), reference)?
        };
        let mut optimizer = Optimizer::new(self.options.clone()).with_span(span);
        let prior = JointPrior::from_specs(&self.priors)?;
        if !prior.is_empty() {
            optimizer = optimizer.with_prior(prior);
        }
        optimizer.fit(&self.dataset, &set)
    }
}

/// Result of one job, tagged with its label.
#[derive(Debug)]
pub struct JobResult {
    pub label: String,
    pub outcome: Result<FitOutcome, FitError>,
}

/// Fit every job in parallel; results come back in input order.
///
/// One failing job does not affect the others.
pub fn fit_batch(jobs: &[FitJob], parent: &Span) -> Vec<JobResult> {
    jobs.par_iter()
        .map(|job| {
            let span = info_span!(parent: parent, "fit_job", label = %job.label);
            JobResult {
                label: job.label.clone(),
                outcome: job.run(span),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputSelection;
    use crate::fit::{simulate, Algorithm, MinimizerConfig};
    use crate::math::InputHold;
    use crate::models::build_system;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    fn dataset(params: &ThermalParams, power: f64) -> Dataset {
        let n = 400;
        let t = DVector::from_fn(n, |i, _| i as f64 * 5.0);
        let u = DMatrix::from_fn(n, 2, |i, j| match j {
            0 => 22.0,
            _ => if (i / 50) % 2 == 0 { power } else { 0.0 },
        });
        let x0 = DVector::from_row_slice(&[22.0, 22.0]);
        let sys = build_system(params).unwrap();
        let traj = simulate(&sys, &u, &t, &x0, InputHold::Linear);
        Dataset::new(traj.outputs, u, t, x0, OutputSelection::Both).unwrap()
    }

    fn job(label: &str, truth: &ThermalParams, power: f64) -> FitJob {
        let mut job = FitJob::new(label, dataset(truth, power), ThermalParams { cp: 70.0, ..*truth });
        job.free = Some(vec!["cp".into()]);
        job.options.minimizer = MinimizerConfig {
            algorithm: Algorithm::NelderMead,
            tol: 1e-10,
            max_iter: 500,
            ..MinimizerConfig::default()
        };
        job
    }

    #[test]
    fn results_keep_input_order_and_isolate_failures() {
        let a = ThermalParams::new(100.0, 10.0, 3.0, 5.0, 2.0);
        let b = ThermalParams::new(150.0, 12.0, 2.0, 4.0, 2.5);
        let mut broken = job("broken", &a, 2.0);
        broken.fixed = FixedSpec::new().value("cp", 1.0);

        let jobs = vec![job("a", &a, 2.0), broken, job("b", &b, 3.0)];
        let results = fit_batch(&jobs, &Span::none());

        let labels: Vec<_> = results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["a", "broken", "b"]);

        let fit_a = results[0].outcome.as_ref().unwrap();
        assert_relative_eq!(fit_a.params.cp, 100.0, max_relative = 1e-3);
        assert!(matches!(
            results[1].outcome,
            Err(FitError::OverconstrainedParameter { .. })
        ));
        let fit_b = results[2].outcome.as_ref().unwrap();
        assert_relative_eq!(fit_b.params.cp, 150.0, max_relative = 1e-3);
    }
}
