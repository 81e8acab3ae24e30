//! Trajectory evaluation.
//!
//! [`generate_evaluation`] binds a dataset once and returns an [`Evaluator`]
//! that only needs a parameter record per call. Each call builds the model,
//! discretizes it exactly for the sample spacing, simulates from `x0`, and
//! reports outputs, states and residuals. Calls are pure: the same record and
//! dataset always give the same numbers.

use nalgebra::{DMatrix, DVector};
use tracing::{trace, Span};

use crate::domain::{Dataset, ThermalParams};
use crate::error::FitError;
use crate::fit::metric;
use crate::math::{InputHold, TransitionCache};
use crate::models::{build_system_for, StateSpace};

/// Output of one simulation against measured data.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// `[n_samples, n_outputs]` model outputs aligned with `t`.
    pub simulated: DMatrix<f64>,
    /// `[n_samples, 2]` state trajectory (internal, air).
    pub states: DMatrix<f64>,
    /// `measured − simulated`.
    pub residual: DMatrix<f64>,
}

impl EvaluationResult {
    pub fn mse(&self) -> f64 {
        metric::mse(&self.residual)
    }

    pub fn l2(&self) -> f64 {
        metric::l2(&self.residual)
    }
}

/// Simulated trajectory without reference to measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub outputs: DMatrix<f64>,
    pub states: DMatrix<f64>,
}

/// Simulate `system` over inputs `u` (one row per sample) at times `t` from `x0`.
///
/// The caller guarantees `rows(u) == len(t)`, `t` strictly increasing and
/// `len(x0) == n_states` (true for any [`Dataset`]).
pub fn simulate(
    system: &StateSpace,
    u: &DMatrix<f64>,
    t: &DVector<f64>,
    x0: &DVector<f64>,
    hold: InputHold,
) -> Trajectory {
    let inputs: Vec<DVector<f64>> = u.row_iter().map(|r| r.transpose()).collect();
    simulate_rows(system, &inputs, t, x0, hold)
}

fn simulate_rows(
    system: &StateSpace,
    inputs: &[DVector<f64>],
    t: &DVector<f64>,
    x0: &DVector<f64>,
    hold: InputHold,
) -> Trajectory {
    let n = inputs.len();
    let mut outputs = DMatrix::zeros(n, system.n_outputs());
    let mut states = DMatrix::zeros(n, system.n_states());
    let mut cache = TransitionCache::new(&system.a, &system.b, hold);

    let mut x = x0.clone();
    for k in 0..n {
        let y = system.output(&x, &inputs[k]);
        outputs.set_row(k, &y.transpose());
        states.set_row(k, &x.transpose());
        if k + 1 < n {
            let h = t[k + 1] - t[k];
            x = cache.get(h).step(&x, &inputs[k], &inputs[k + 1]);
        }
    }

    Trajectory { outputs, states }
}

/// An evaluation function bound to one dataset.
#[derive(Debug, Clone)]
pub struct Evaluator<'a> {
    dataset: &'a Dataset,
    inputs: Vec<DVector<f64>>,
    hold: InputHold,
    span: Span,
}

/// Bind `dataset` and return its evaluator.
pub fn generate_evaluation(dataset: &Dataset) -> Evaluator<'_> {
    Evaluator {
        dataset,
        inputs: dataset.u().row_iter().map(|r| r.transpose()).collect(),
        hold: InputHold::default(),
        span: Span::current(),
    }
}

impl<'a> Evaluator<'a> {
    pub fn with_hold(mut self, hold: InputHold) -> Self {
        self.hold = hold;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn hold(&self) -> InputHold {
        self.hold
    }

    /// Simulate the model built from `params` and compare it to the measurements.
    pub fn evaluate(&self, params: &ThermalParams) -> Result<EvaluationResult, FitError> {
        let system = build_system_for(params, self.dataset.outputs())?;
        self.evaluate_system(&system)
    }

    /// Same as [`Self::evaluate`] for an already built system.
    pub fn evaluate_system(&self, system: &StateSpace) -> Result<EvaluationResult, FitError> {
        let measured = self.dataset.y();
        if system.n_outputs() != measured.ncols() {
            return Err(FitError::ShapeMismatch(format!(
                "system has {} outputs, dataset has {}",
                system.n_outputs(),
                measured.ncols()
            )));
        }
        if system.n_states() != self.dataset.x0().len() {
            return Err(FitError::ShapeMismatch(format!(
                "system has {} states, x0 has {}",
                system.n_states(),
                self.dataset.x0().len()
            )));
        }

        let Trajectory { outputs, states } =
            simulate_rows(system, &self.inputs, self.dataset.t(), self.dataset.x0(), self.hold);
        let residual = measured - &outputs;
        trace!(parent: &self.span, samples = outputs.nrows(), "evaluated trajectory");

        Ok(EvaluationResult {
            simulated: outputs,
            states,
            residual,
        })
    }
}
