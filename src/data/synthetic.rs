//! Synthetic experiments simulated from ground-truth parameters.
//!
//! Two canned profiles mirror the usual bench procedure: a long constant-power
//! run that settles to steady state (used to derive `rout`), and a pulsed run
//! that excites the dynamics (used to fit the capacitances and `rin`).

use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, OutputSelection, ThermalParams};
use crate::error::FitError;
use crate::fit::simulate;
use crate::math::InputHold;
use crate::models::{build_system, StateSpace};

/// Applied heat generation over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PowerProfile {
    Constant { power: f64 },
    /// Square wave between `power` and zero, starting high.
    Pulsed { power: f64, period: f64, duty: f64 },
}

impl PowerProfile {
    pub fn at(&self, t: f64) -> f64 {
        match *self {
            PowerProfile::Constant { power } => power,
            PowerProfile::Pulsed { power, period, duty } => {
                if (t / period).fract() < duty { power } else { 0.0 }
            }
        }
    }
}

/// Sampling plan of one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub duration: f64,
    pub dt: f64,
    pub ambient: f64,
    pub profile: PowerProfile,
    /// Standard deviation of additive Gaussian sensor noise (K).
    pub noise_std: f64,
}

/// Ground-truth record written next to synthetic data.
///
/// Serializes as the five parameter keys plus the initial temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    #[serde(flatten)]
    pub params: ThermalParams,
    pub in_temp: f64,
    pub air_temp: f64,
}

impl GroundTruth {
    pub fn x0(&self) -> DVector<f64> {
        DVector::from_row_slice(&[self.in_temp, self.air_temp])
    }
}

/// Longest time constant of the model, from the eigenvalues of `A`.
pub fn slowest_time_constant(system: &StateSpace) -> Option<f64> {
    system
        .a
        .complex_eigenvalues()
        .iter()
        .map(|l| l.re)
        .filter(|re| *re < 0.0)
        .map(|re| -1.0 / re)
        .reduce(f64::max)
}

/// Constant power held for 40 time constants: the surface settles to `T_amb + P·rout`.
pub fn steady_state_plan(system: &StateSpace, ambient: f64, power: f64) -> Result<ExperimentPlan, FitError> {
    let tau = time_constant(system)?;
    Ok(ExperimentPlan {
        duration: 40.0 * tau,
        dt: tau / 50.0,
        ambient,
        profile: PowerProfile::Constant { power },
        noise_std: 0.0,
    })
}

/// Ten on/off pulses, each two time constants long.
pub fn pulsed_plan(system: &StateSpace, ambient: f64, power: f64) -> Result<ExperimentPlan, FitError> {
    let tau = time_constant(system)?;
    Ok(ExperimentPlan {
        duration: 20.0 * tau,
        dt: tau / 50.0,
        ambient,
        profile: PowerProfile::Pulsed {
            power,
            period: 2.0 * tau,
            duty: 0.5,
        },
        noise_std: 0.0,
    })
}

fn time_constant(system: &StateSpace) -> Result<f64, FitError> {
    slowest_time_constant(system)
        .filter(|tau| tau.is_finite() && *tau > 0.0)
        .ok_or_else(|| FitError::InvalidData("model has no decaying mode".into()))
}

/// Simulate `plan` from `truth` and return the measured dataset.
///
/// Noise, when requested, is drawn from a generator seeded with `seed`, so the
/// same call always produces the same data.
pub fn generate_experiment(
    truth: &GroundTruth,
    plan: &ExperimentPlan,
    outputs: OutputSelection,
    hold: InputHold,
    seed: u64,
) -> Result<Dataset, FitError> {
    if !(plan.dt.is_finite() && plan.dt > 0.0 && plan.duration >= plan.dt) {
        return Err(FitError::Config(format!(
            "experiment needs 0 < dt <= duration, got dt={}, duration={}",
            plan.dt, plan.duration
        )));
    }
    if !(plan.noise_std.is_finite() && plan.noise_std >= 0.0) {
        return Err(FitError::Config(format!("noise_std must be >= 0, got {}", plan.noise_std)));
    }

    let n = (plan.duration / plan.dt).floor() as usize + 1;
    let t = DVector::from_fn(n, |i, _| i as f64 * plan.dt);
    let u = DMatrix::from_fn(n, 2, |i, j| if j == 0 { plan.ambient } else { plan.profile.at(t[i]) });

    let system = build_system(&truth.params)?;
    let x0 = truth.x0();
    let traj = simulate(&system, &u, &t, &x0, hold);

    let mut y = DMatrix::zeros(n, outputs.count());
    for (dst, &src) in outputs.rows().iter().enumerate() {
        y.set_column(dst, &traj.outputs.column(src));
    }

    if plan.noise_std > 0.0 {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, plan.noise_std)
            .map_err(|e| FitError::Config(format!("noise distribution error: {e}")))?;
        for v in y.iter_mut() {
            *v += normal.sample(&mut rng);
        }
    }

    Dataset::new(y, u, t, x0, outputs)
}

/// The pair of experiments used for identification.
#[derive(Debug, Clone)]
pub struct ExperimentPair {
    pub steady_state: Dataset,
    pub pulsed: Dataset,
}

pub fn generate_pair(
    truth: &GroundTruth,
    power: f64,
    noise_std: f64,
    seed: u64,
) -> Result<ExperimentPair, FitError> {
    let system = build_system(&truth.params)?;
    let ambient = truth.in_temp;

    let mut exp1 = steady_state_plan(&system, ambient, power)?;
    exp1.noise_std = noise_std;
    let mut exp2 = pulsed_plan(&system, ambient, power)?;
    exp2.noise_std = noise_std;

    Ok(ExperimentPair {
        steady_state: generate_experiment(truth, &exp1, OutputSelection::Both, InputHold::Linear, seed)?,
        pulsed: generate_experiment(
            truth,
            &exp2,
            OutputSelection::Both,
            InputHold::Linear,
            seed.wrapping_add(1),
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::steady_state_rout;
    use approx::assert_relative_eq;

    fn truth() -> GroundTruth {
        GroundTruth {
            params: ThermalParams::new(100.0, 10.0, 3.0, 5.0, 2.0),
            in_temp: 25.0,
            air_temp: 25.0,
        }
    }

    #[test]
    fn slowest_time_constant_matches_closed_form() {
        let sys = build_system(&truth().params).unwrap();
        let tr = sys.a.trace();
        let det = sys.a.determinant();
        let disc = (tr * tr - 4.0 * det).sqrt();
        let slow = (tr + disc) / 2.0;
        assert_relative_eq!(slowest_time_constant(&sys).unwrap(), -1.0 / slow, max_relative = 1e-9);
    }

    #[test]
    fn steady_state_experiment_recovers_rout() {
        let pair = generate_pair(&truth(), 2.0, 0.0, 7).unwrap();
        let rout = steady_state_rout(&pair.steady_state, 1).unwrap();
        assert_relative_eq!(rout, 5.0, max_relative = 1e-6);
    }

    #[test]
    fn pulsed_profile_switches_power() {
        let p = PowerProfile::Pulsed { power: 3.0, period: 10.0, duty: 0.5 };
        assert_eq!(p.at(0.0), 3.0);
        assert_eq!(p.at(4.9), 3.0);
        assert_eq!(p.at(5.1), 0.0);
        assert_eq!(p.at(12.0), 3.0);
    }

    #[test]
    fn noise_is_seeded() {
        let sys = build_system(&truth().params).unwrap();
        let mut plan = pulsed_plan(&sys, 25.0, 2.0).unwrap();
        plan.noise_std = 0.05;
        let a = generate_experiment(&truth(), &plan, OutputSelection::Both, InputHold::Linear, 3).unwrap();
        let b = generate_experiment(&truth(), &plan, OutputSelection::Both, InputHold::Linear, 3).unwrap();
        let c = generate_experiment(&truth(), &plan, OutputSelection::Both, InputHold::Linear, 4).unwrap();
        assert_eq!(a.y(), b.y());
        assert_ne!(a.y(), c.y());
    }

    #[test]
    fn ground_truth_serializes_flat() {
        let value = serde_json::to_value(truth()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 7);
        assert_eq!(obj["rout"], 5.0);
        assert_eq!(obj["in_temp"], 25.0);
    }

    #[test]
    fn surface_only_selection_keeps_one_column() {
        let sys = build_system(&truth().params).unwrap();
        let plan = pulsed_plan(&sys, 25.0, 2.0).unwrap();
        let ds = generate_experiment(&truth(), &plan, OutputSelection::Surface, InputHold::Zero, 0).unwrap();
        assert_eq!(ds.y().ncols(), 1);
    }
}
