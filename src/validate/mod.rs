//! Post-fit validation: observability and residual quality.
//!
//! Nothing here fails a fit. The reports carry scores; callers decide what
//! is acceptable through [`Acceptance`].

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Span};

use crate::domain::{Dataset, ThermalParams};
use crate::error::FitError;
use crate::fit::{generate_evaluation, metric, ErrorMetric, EvaluationResult, Metric};
use crate::math::{numerical_rank, InputHold};
use crate::models::{build_system_for, StateSpace};

/// Rank of the stacked observability matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservabilityReport {
    pub rank: usize,
    pub n_states: usize,
    pub tolerance: f64,
    pub singular_values: Vec<f64>,
    pub condition_number: f64,
}

impl ObservabilityReport {
    pub fn is_observable(&self) -> bool {
        self.rank == self.n_states
    }
}

/// `[C; CA; …; CA^(n-1)]`.
pub fn observability_matrix(system: &StateSpace) -> DMatrix<f64> {
    let n = system.n_states();
    let p = system.n_outputs();
    let mut out = DMatrix::zeros(n * p, n);
    let mut block = system.c.clone();
    for k in 0..n {
        out.view_mut((k * p, 0), (p, n)).copy_from(&block);
        block = &block * &system.a;
    }
    out
}

pub fn check_observability(system: &StateSpace) -> ObservabilityReport {
    let info = numerical_rank(&observability_matrix(system));
    ObservabilityReport {
        rank: info.rank,
        n_states: system.n_states(),
        tolerance: info.tolerance,
        condition_number: info.condition_number(),
        singular_values: info.singular_values.iter().copied().collect(),
    }
}

/// Residual scores of a simulated trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualReport {
    /// `Σ r² / n_samples`, summed over channels.
    pub mse: f64,
    pub l2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub channel_mse: Vec<f64>,
    /// Name and value of the metric the run was fitted on.
    pub metric: String,
    pub score: f64,
}

impl ResidualReport {
    pub fn from_residual(residual: &DMatrix<f64>, metric: Metric) -> Self {
        Self {
            mse: metric::mse(residual),
            l2: metric::l2(residual),
            rmse: metric::rmse(residual),
            mae: metric::mae(residual),
            channel_mse: metric::channel_mse(residual),
            metric: metric.name().to_string(),
            score: metric.apply(residual),
        }
    }
}

/// Advisory thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Acceptance {
    pub max_mse: f64,
    pub require_observable: bool,
}

impl Default for Acceptance {
    fn default() -> Self {
        Self {
            max_mse: 1e-3,
            require_observable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub observability: ObservabilityReport,
    pub residuals: ResidualReport,
}

impl ValidationReport {
    pub fn accepts(&self, acceptance: &Acceptance) -> bool {
        let observable = !acceptance.require_observable || self.observability.is_observable();
        observable && self.residuals.mse <= acceptance.max_mse
    }
}

/// Checks fitted systems against data.
#[derive(Debug, Clone)]
pub struct Validator {
    metric: Metric,
    hold: InputHold,
    span: Span,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Metric::default(), InputHold::default())
    }
}

impl Validator {
    pub fn new(metric: Metric, hold: InputHold) -> Self {
        Self {
            metric,
            hold,
            span: Span::current(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Validate an already simulated fit.
    pub fn validate(&self, system: &StateSpace, evaluation: &EvaluationResult) -> ValidationReport {
        let observability = check_observability(system);
        let residuals = ResidualReport::from_residual(&evaluation.residual, self.metric);

        if observability.is_observable() {
            info!(
                parent: &self.span,
                rank = observability.rank,
                mse = residuals.mse,
                score = residuals.score,
                "validation finished"
            );
        } else {
            warn!(
                parent: &self.span,
                rank = observability.rank,
                n_states = observability.n_states,
                "system is not observable"
            );
        }

        ValidationReport {
            observability,
            residuals,
        }
    }

    /// Simulate `params` over `dataset` and validate the result.
    pub fn validate_params(
        &self,
        params: &ThermalParams,
        dataset: &Dataset,
    ) -> Result<(ValidationReport, EvaluationResult), FitError> {
        let system = build_system_for(params, dataset.outputs())?;
        let evaluation = generate_evaluation(dataset)
            .with_hold(self.hold)
            .with_span(self.span.clone())
            .evaluate_system(&system)?;
        Ok((self.validate(&system, &evaluation), evaluation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputSelection;
    use crate::fit::simulate;
    use crate::models::build_system;
    use nalgebra::DVector;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn truth() -> ThermalParams {
        ThermalParams::new(100.0, 10.0, 3.0, 5.0, 2.0)
    }

    /// Log-uniform over three decades per parameter.
    fn random_params(rng: &mut StdRng) -> ThermalParams {
        let mut draw = || 10f64.powf(rng.gen_range(-1.0..2.0));
        ThermalParams::new(draw(), draw(), draw(), draw(), draw())
    }

    #[test]
    fn positive_parameters_give_observable_system() {
        for outputs in [OutputSelection::Both, OutputSelection::Surface, OutputSelection::Air] {
            let sys = build_system_for(&truth(), outputs).unwrap();
            let report = check_observability(&sys);
            assert!(report.is_observable(), "{outputs:?}: rank {}", report.rank);
        }
    }

    #[test]
    fn random_positive_parameters_give_observable_system() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let p = random_params(&mut rng);
            for outputs in [OutputSelection::Both, OutputSelection::Surface, OutputSelection::Air] {
                // With only the surface row, rin·cp = rair·cair cancels the CA row.
                let (tau_in, tau_air) = (p.rin * p.cp, p.rair * p.cair);
                let matched = (tau_in - tau_air).abs() < 1e-2 * tau_in.max(tau_air);
                if outputs == OutputSelection::Surface && matched {
                    continue;
                }
                let sys = build_system_for(&p, outputs).unwrap();
                let report = check_observability(&sys);
                assert_eq!(report.rank, 2, "{p:?} {outputs:?}: {:?}", report.singular_values);
            }
        }
    }

    #[test]
    fn surface_only_degenerates_when_node_time_constants_match() {
        // rin·cp = rair·cair = 8, all values exact in binary.
        let p = ThermalParams::new(4.0, 2.0, 2.0, 1.0, 4.0);
        let surface = check_observability(&build_system_for(&p, OutputSelection::Surface).unwrap());
        assert!(surface.condition_number > 1e12, "cond = {:e}", surface.condition_number);

        let both = check_observability(&build_system_for(&p, OutputSelection::Both).unwrap());
        assert!(both.is_observable());
    }

    #[test]
    fn observability_matrix_stacks_c_and_ca() {
        let sys = build_system_for(&truth(), OutputSelection::Surface).unwrap();
        let o = observability_matrix(&sys);
        assert_eq!(o.shape(), (2, 2));
        let ca = &sys.c * &sys.a;
        assert_eq!(o.row(1), ca.row(0));
    }

    #[test]
    fn unobservable_system_is_flagged() {
        let mut sys = build_system(&truth()).unwrap();
        // Decouple the air node and hide it from the outputs.
        sys.a = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -2.0]);
        sys.c = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
        sys.d = DMatrix::zeros(1, 2);
        let report = check_observability(&sys);
        assert_eq!(report.rank, 1);
        assert!(!report.is_observable());
    }

    #[test]
    fn exact_model_passes_acceptance() {
        let n = 300;
        let t = DVector::from_fn(n, |i, _| i as f64 * 10.0);
        let u = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 24.0 } else if i < 150 { 2.0 } else { 0.0 });
        let x0 = DVector::from_row_slice(&[24.0, 24.0]);
        let sys = build_system(&truth()).unwrap();
        let traj = simulate(&sys, &u, &t, &x0, InputHold::Linear);
        let ds = Dataset::new(traj.outputs, u, t, x0, OutputSelection::Both).unwrap();

        let (report, _) = Validator::default().validate_params(&truth(), &ds).unwrap();
        assert!(report.accepts(&Acceptance::default()));
        assert_eq!(report.residuals.channel_mse.len(), 2);

        let mut off = truth();
        off.rin = 6.0;
        let (worse, _) = Validator::default().validate_params(&off, &ds).unwrap();
        assert!(worse.residuals.mse > report.residuals.mse);
        assert!(!worse.accepts(&Acceptance { max_mse: 1e-12, ..Acceptance::default() }));
    }
}
