//! Black-box minimizers.
//!
//! The optimizer only needs "minimize this scalar function from here". This
//! module provides that as the [`Minimizer`] trait, plus an implementation on
//! top of argmin offering L-BFGS (with finite-difference gradients) and
//! Nelder–Mead.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use serde::{Deserialize, Serialize};
use tracing::{info, trace, Span};

use crate::error::FitError;

/// Scalar function of the search vector.
pub trait Objective: Sync {
    fn eval(&self, x: &[f64]) -> Result<f64, FitError>;

    /// Finite-difference gradient unless overridden.
    fn gradient(&self, x: &[f64], mode: GradientMode) -> Result<Vec<f64>, FitError> {
        numerical_gradient(|p| self.eval(p), x, mode)
    }
}

impl<F> Objective for F
where
    F: Fn(&[f64]) -> Result<f64, FitError> + Sync,
{
    fn eval(&self, x: &[f64]) -> Result<f64, FitError> {
        self(x)
    }
}

/// Finite-difference scheme used when the objective has no analytic gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientMode {
    /// Forward differences, step `sqrt(ε)·max(|x|, 1)`.
    #[serde(rename = "2-point")]
    TwoPoint,
    /// Central differences, step `ε^(1/3)·max(|x|, 1)`.
    #[default]
    #[serde(rename = "3-point")]
    ThreePoint,
}

pub fn numerical_gradient<F>(f: F, x: &[f64], mode: GradientMode) -> Result<Vec<f64>, FitError>
where
    F: Fn(&[f64]) -> Result<f64, FitError>,
{
    let mut grad = vec![0.0; x.len()];
    let mut probe = x.to_vec();
    match mode {
        GradientMode::TwoPoint => {
            let f0 = f(x)?;
            for i in 0..x.len() {
                let h = f64::EPSILON.sqrt() * x[i].abs().max(1.0);
                probe[i] = x[i] + h;
                grad[i] = (f(&probe)? - f0) / h;
                probe[i] = x[i];
            }
        }
        GradientMode::ThreePoint => {
            for i in 0..x.len() {
                let h = f64::EPSILON.cbrt() * x[i].abs().max(1.0);
                probe[i] = x[i] + h;
                let f_plus = f(&probe)?;
                probe[i] = x[i] - h;
                let f_minus = f(&probe)?;
                probe[i] = x[i];
                grad[i] = (f_plus - f_minus) / (2.0 * h);
            }
        }
    }
    Ok(grad)
}

/// Search algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Limited-memory BFGS with More–Thuente line search.
    #[default]
    Lbfgs,
    /// Derivative-free downhill simplex.
    NelderMead,
}

/// Minimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerConfig {
    pub algorithm: Algorithm,
    /// Only used by gradient-based algorithms.
    pub gradient: GradientMode,
    /// Convergence tolerance: gradient norm and cost change for L-BFGS,
    /// standard deviation of simplex costs for Nelder–Mead. Both are absolute
    /// in cost units, so the default sits well below the per-iteration
    /// improvement seen on a slow plateau.
    pub tol: f64,
    pub max_iter: u64,
    /// Log every objective evaluation at info level.
    pub verbose: bool,
    /// Number of correction pairs kept by L-BFGS.
    pub lbfgs_memory: usize,
    /// Offset of the initial simplex vertices from the seed.
    pub simplex_step: f64,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Lbfgs,
            gradient: GradientMode::ThreePoint,
            tol: 1e-6,
            max_iter: 1000,
            verbose: false,
            lbfgs_memory: 10,
            simplex_step: 0.1,
        }
    }
}

impl MinimizerConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(FitError::Config(format!("tol must be positive, got {}", self.tol)));
        }
        if self.max_iter == 0 {
            return Err(FitError::Config("max_iter must be at least 1".into()));
        }
        if self.lbfgs_memory == 0 {
            return Err(FitError::Config("lbfgs_memory must be at least 1".into()));
        }
        if !(self.simplex_step.is_finite() && self.simplex_step > 0.0) {
            return Err(FitError::Config(format!(
                "simplex_step must be positive, got {}",
                self.simplex_step
            )));
        }
        Ok(())
    }
}

/// Result of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerOutcome {
    /// Best point found.
    pub x: Vec<f64>,
    /// Objective at `x`.
    pub fval: f64,
    pub iterations: u64,
    /// Objective evaluations, gradient probes included.
    pub evaluations: usize,
    pub converged: bool,
    /// Termination reason reported by the backend.
    pub message: String,
}

impl fmt::Display for MinimizerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MinimizerOutcome(fval={:.6e}, iterations={}, evaluations={}, converged={})",
            self.fval, self.iterations, self.evaluations, self.converged
        )
    }
}

/// Minimizes an objective from a starting point.
pub trait Minimizer {
    fn name(&self) -> &str;

    fn minimize(&self, objective: &dyn Objective, x0: &[f64]) -> Result<MinimizerOutcome, FitError>;
}

/// Wraps an [`Objective`] for argmin.
struct ArgminProblem<'a> {
    objective: &'a dyn Objective,
    gradient: GradientMode,
    evaluations: &'a AtomicUsize,
    verbose: bool,
    span: &'a Span,
}

impl ArgminProblem<'_> {
    fn counted_eval(&self, x: &[f64]) -> Result<f64, FitError> {
        let n = self.evaluations.fetch_add(1, Ordering::Relaxed) + 1;
        let cost = self.objective.eval(x)?;
        if self.verbose {
            info!(parent: self.span, evaluation = n, cost, "objective");
        } else {
            trace!(parent: self.span, evaluation = n, cost, "objective");
        }
        Ok(cost)
    }
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        self.counted_eval(param)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        numerical_gradient(|p| self.counted_eval(p), param, self.gradient)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

/// argmin-backed [`Minimizer`].
#[derive(Debug, Clone)]
pub struct ArgminMinimizer {
    config: MinimizerConfig,
    span: Span,
}

impl ArgminMinimizer {
    pub fn new(config: MinimizerConfig) -> Self {
        Self {
            config,
            span: Span::current(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &MinimizerConfig {
        &self.config
    }

    fn run_lbfgs(&self, problem: ArgminProblem<'_>, x0: &[f64]) -> Result<Finished, FitError> {
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.config.lbfgs_memory)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| FitError::Config(format!("invalid tolerance: {e}")))?
            .with_tolerance_cost(self.config.tol)
            .map_err(|e| FitError::Config(format!("invalid tolerance: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(x0.to_vec()).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| FitError::Minimizer(e.to_string()))?;

        let state = res.state();
        let x = state
            .get_best_param()
            .ok_or_else(|| FitError::Minimizer("no best parameters recorded".into()))?
            .clone();
        Ok(Finished {
            x,
            fval: state.get_best_cost(),
            iterations: state.get_iter(),
            status: state.get_termination_status().clone(),
        })
    }

    fn run_nelder_mead(&self, problem: ArgminProblem<'_>, x0: &[f64]) -> Result<Finished, FitError> {
        let simplex = initial_simplex(x0, self.config.simplex_step);
        let solver = NelderMead::new(simplex)
            .with_sd_tolerance(self.config.tol)
            .map_err(|e| FitError::Config(format!("invalid tolerance: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.config.max_iter))
            .run()
            .map_err(|e| FitError::Minimizer(e.to_string()))?;

        let state = res.state();
        let x = state
            .get_best_param()
            .ok_or_else(|| FitError::Minimizer("no best parameters recorded".into()))?
            .clone();
        Ok(Finished {
            x,
            fval: state.get_best_cost(),
            iterations: state.get_iter(),
            status: state.get_termination_status().clone(),
        })
    }
}

struct Finished {
    x: Vec<f64>,
    fval: f64,
    iterations: u64,
    status: TerminationStatus,
}

/// Seed plus one vertex per dimension, offset by `step` along that axis.
fn initial_simplex(x0: &[f64], step: f64) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(x0.len() + 1);
    simplex.push(x0.to_vec());
    for i in 0..x0.len() {
        let mut v = x0.to_vec();
        v[i] += step;
        simplex.push(v);
    }
    simplex
}

impl Minimizer for ArgminMinimizer {
    fn name(&self) -> &str {
        match self.config.algorithm {
            Algorithm::Lbfgs => "lbfgs",
            Algorithm::NelderMead => "nelder-mead",
        }
    }

    fn minimize(&self, objective: &dyn Objective, x0: &[f64]) -> Result<MinimizerOutcome, FitError> {
        self.config.validate()?;
        if x0.is_empty() {
            return Err(FitError::Config("nothing to minimize: empty start vector".into()));
        }

        let evaluations = AtomicUsize::new(0);
        let problem = ArgminProblem {
            objective,
            gradient: self.config.gradient,
            evaluations: &evaluations,
            verbose: self.config.verbose,
            span: &self.span,
        };

        let finished = match self.config.algorithm {
            Algorithm::Lbfgs => self.run_lbfgs(problem, x0)?,
            Algorithm::NelderMead => self.run_nelder_mead(problem, x0)?,
        };

        let converged = matches!(
            finished.status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(MinimizerOutcome {
            x: finished.x,
            fval: finished.fval,
            iterations: finished.iterations,
            evaluations: evaluations.load(Ordering::Relaxed),
            converged,
            message: finished.status.to_string(),
        })
    }
}
