//! Parameter fitting for a single dataset.
//!
//! Given:
//! - a dataset `(y, u, t, x0)`
//! - a resolved [`ParameterSet`] (fixed and derived values already settled)
//! - an error metric and a minimizer configuration
//!
//! the [`Optimizer`] searches the free subspace, merges the optimum with the
//! pinned values, and rebuilds the state-space matrices.
//!
//! The search runs in log space by default, which keeps every proposal
//! strictly positive. Proposals that still leave the physical domain (linear
//! search) score `+inf` instead of aborting the run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Span};

use crate::domain::{Dataset, ThermalParams};
use crate::error::FitError;
use crate::fit::{
    generate_evaluation, ArgminMinimizer, ErrorMetric, Evaluator, JointPrior, Metric, Minimizer,
    MinimizerConfig, Prior,
};
use crate::math::InputHold;
use crate::models::{build_system_for, StateSpace};
use crate::params::{FixedSpec, ParameterSet};

/// Coordinates the minimizer works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSpace {
    /// `z = ln(value)`.
    #[default]
    Log,
    /// `z = value`.
    Linear,
}

impl SearchSpace {
    pub fn to_search(self, value: f64) -> f64 {
        match self {
            SearchSpace::Log => value.ln(),
            SearchSpace::Linear => value,
        }
    }

    pub fn from_search(self, z: f64) -> f64 {
        match self {
            SearchSpace::Log => z.exp(),
            SearchSpace::Linear => z,
        }
    }
}

/// Fitting options that affect how a run is calibrated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitOptions {
    pub metric: Metric,
    pub minimizer: MinimizerConfig,
    pub search_space: SearchSpace,
    pub hold: InputHold,
}

/// How the minimizer finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub converged: bool,
    pub iterations: u64,
    /// Objective at the optimum (metric minus log prior).
    pub objective: f64,
    pub evaluations: usize,
    pub message: String,
    pub algorithm: String,
    pub metric: String,
}

/// Result of a converged fit.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub params: ThermalParams,
    pub system: StateSpace,
    pub parameter_set: ParameterSet,
    pub diagnostics: Diagnostics,
}

/// Drives a [`Minimizer`] over the free parameters of a run.
pub struct Optimizer {
    options: FitOptions,
    metric: Arc<dyn ErrorMetric>,
    prior: Option<Arc<dyn Prior>>,
    minimizer: Option<Arc<dyn Minimizer + Send + Sync>>,
    span: Span,
}

impl Optimizer {
    pub fn new(options: FitOptions) -> Self {
        Self {
            metric: Arc::new(options.metric),
            options,
            prior: None,
            minimizer: None,
            span: Span::current(),
        }
    }

    /// Replace the configured metric, e.g. with an [`crate::fit::FnMetric`].
    pub fn with_metric(mut self, metric: impl ErrorMetric + 'static) -> Self {
        self.metric = Arc::new(metric);
        self
    }

    /// Minimize `metric − log p(params)` instead of the bare metric.
    pub fn with_prior(mut self, prior: impl Prior + 'static) -> Self {
        self.prior = Some(Arc::new(prior));
        self
    }

    /// Use `minimizer` instead of the argmin backend built from the options.
    pub fn with_minimizer(mut self, minimizer: impl Minimizer + Send + Sync + 'static) -> Self {
        self.minimizer = Some(Arc::new(minimizer));
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Fit the free parameters of `set` against `dataset`.
    pub fn fit(&self, dataset: &Dataset, set: &ParameterSet) -> Result<FitOutcome, FitError> {
        self.options.minimizer.validate()?;

        let evaluator = generate_evaluation(dataset)
            .with_hold(self.options.hold)
            .with_span(self.span.clone());
        let free = set.free_names();
        let algorithm = self.algorithm_name();

        info!(
            parent: &self.span,
            free = ?free.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
            samples = dataset.len(),
            algorithm = %algorithm,
            metric = self.metric.name(),
            "optimization started"
        );

        if free.is_empty() {
            return self.evaluate_pinned(&evaluator, set, algorithm);
        }

        let space = self.options.search_space;
        let z0: Vec<f64> = set.free_vector().iter().map(|v| space.to_search(*v)).collect();

        let objective = |z: &[f64]| -> Result<f64, FitError> {
            let values: Vec<f64> = z.iter().map(|zi| space.from_search(*zi)).collect();
            let params = set.merge(&values)?;
            match self.cost(&evaluator, &params) {
                Ok(cost) => Ok(cost),
                Err(FitError::Domain { .. }) => Ok(f64::INFINITY),
                Err(e) => Err(e),
            }
        };

        let outcome = match &self.minimizer {
            Some(m) => m.minimize(&objective, &z0)?,
            None => ArgminMinimizer::new(self.options.minimizer.clone())
                .with_span(self.span.clone())
                .minimize(&objective, &z0)?,
        };

        if !outcome.converged {
            warn!(
                parent: &self.span,
                iterations = outcome.iterations,
                objective = outcome.fval,
                message = %outcome.message,
                "optimization did not converge"
            );
            return Err(FitError::NonConvergence {
                last_objective: outcome.fval,
                iterations: outcome.iterations,
                message: outcome.message,
            });
        }

        let values: Vec<f64> = outcome.x.iter().map(|zi| space.from_search(*zi)).collect();
        let params = set.merge(&values)?;
        let system = build_system_for(&params, dataset.outputs())?;

        info!(
            parent: &self.span,
            iterations = outcome.iterations,
            evaluations = outcome.evaluations,
            objective = outcome.fval,
            params = %params,
            "optimization finished"
        );

        Ok(FitOutcome {
            params,
            system,
            parameter_set: set.clone(),
            diagnostics: Diagnostics {
                converged: true,
                iterations: outcome.iterations,
                objective: outcome.fval,
                evaluations: outcome.evaluations,
                message: outcome.message,
                algorithm,
                metric: self.metric.name().to_string(),
            },
        })
    }

    fn algorithm_name(&self) -> String {
        match &self.minimizer {
            Some(m) => m.name().to_string(),
            None => ArgminMinimizer::new(self.options.minimizer.clone())
                .name()
                .to_string(),
        }
    }

    /// Metric plus negative log prior; NaN counts as `+inf`.
    fn cost(&self, evaluator: &Evaluator<'_>, params: &ThermalParams) -> Result<f64, FitError> {
        let result = evaluator.evaluate(params)?;
        let mut cost = self
            .metric
            .evaluate(evaluator.dataset().y(), &result.simulated);
        if let Some(prior) = &self.prior {
            cost -= prior.log_density(params);
        }
        Ok(if cost.is_nan() { f64::INFINITY } else { cost })
    }

    fn evaluate_pinned(
        &self,
        evaluator: &Evaluator<'_>,
        set: &ParameterSet,
        algorithm: String,
    ) -> Result<FitOutcome, FitError> {
        let params = set.merge(&[])?;
        let objective = self.cost(evaluator, &params)?;
        let system = build_system_for(&params, evaluator.dataset().outputs())?;
        debug!(parent: &self.span, objective, "no free parameters, evaluated once");
        Ok(FitOutcome {
            params,
            system,
            parameter_set: set.clone(),
            diagnostics: Diagnostics {
                converged: true,
                iterations: 0,
                objective,
                evaluations: 1,
                message: "no free parameters".into(),
                algorithm,
                metric: self.metric.name().to_string(),
            },
        })
    }
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("options", &self.options)
            .field("metric", &self.metric.name())
            .field("prior", &self.prior.is_some())
            .finish()
    }
}

/// Resolve the parameter set and fit it in one call.
///
/// Derived parameters are resolved against `reference` (use the fitting
/// dataset itself when there is no separate reference experiment).
pub fn fit_parameters(
    dataset: &Dataset,
    reference: &Dataset,
    initial_guess: &ThermalParams,
    fixed: &FixedSpec,
    free: Option<&[String]>,
    options: &FitOptions,
    prior: Option<JointPrior>,
) -> Result<FitOutcome, FitError> {
    let set = ParameterSet::resolve(initial_guess, fixed, free, reference)?;
    let mut optimizer = Optimizer::new(options.clone());
    if let Some(prior) = prior.filter(|p| !p.is_empty()) {
        optimizer = optimizer.with_prior(prior);
    }
    optimizer.fit(dataset, &set)
}
