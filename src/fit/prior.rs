//! Optional priors over the thermal parameters.
//!
//! A prior turns the fit into a MAP estimate: the optimizer minimizes
//! `metric − log p(params)`. Without a prior the objective is the bare metric.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::domain::{ParamName, ThermalParams};
use crate::error::FitError;

/// Log density over a full parameter record.
pub trait Prior: Send + Sync {
    /// `-inf` outside the support.
    fn log_density(&self, params: &ThermalParams) -> f64;
}

/// Normal density on one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPrior {
    pub param: ParamName,
    pub mean: f64,
    /// Pre-computed `1 / sigma`.
    pub inv_width: f64,
}

impl GaussianPrior {
    pub fn new(param: ParamName, mean: f64, sigma: f64) -> Result<Self, FitError> {
        if !(sigma.is_finite() && sigma > 0.0) || !mean.is_finite() {
            return Err(FitError::Config(format!(
                "gaussian prior on {param}: need finite mean and positive sigma, got mean={mean}, sigma={sigma}"
            )));
        }
        Ok(Self {
            param,
            mean,
            inv_width: 1.0 / sigma,
        })
    }
}

impl Prior for GaussianPrior {
    fn log_density(&self, params: &ThermalParams) -> f64 {
        let z = (params.get(self.param) - self.mean) * self.inv_width;
        -0.5 * z * z + self.inv_width.ln() - 0.5 * (2.0 * PI).ln()
    }
}

/// Flat density on `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformPrior {
    pub param: ParamName,
    pub low: f64,
    pub high: f64,
}

impl UniformPrior {
    pub fn new(param: ParamName, low: f64, high: f64) -> Result<Self, FitError> {
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(FitError::Config(format!(
                "uniform prior on {param}: need finite low < high, got [{low}, {high}]"
            )));
        }
        Ok(Self { param, low, high })
    }
}

impl Prior for UniformPrior {
    fn log_density(&self, params: &ThermalParams) -> f64 {
        let v = params.get(self.param);
        if (self.low..=self.high).contains(&v) {
            -(self.high - self.low).ln()
        } else {
            f64::NEG_INFINITY
        }
    }
}

/// Product of independent priors.
#[derive(Default)]
pub struct JointPrior {
    terms: Vec<Box<dyn Prior>>,
}

impl JointPrior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prior: impl Prior + 'static) -> Self {
        self.terms.push(Box::new(prior));
        self
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Build from configuration entries.
    pub fn from_specs(specs: &[PriorSpec]) -> Result<Self, FitError> {
        let mut joint = Self::new();
        for spec in specs {
            joint = match *spec {
                PriorSpec::Gaussian { ref param, mean, sigma } => {
                    joint.with(GaussianPrior::new(param.parse()?, mean, sigma)?)
                }
                PriorSpec::Uniform { ref param, low, high } => {
                    joint.with(UniformPrior::new(param.parse()?, low, high)?)
                }
            };
        }
        Ok(joint)
    }
}

impl Prior for JointPrior {
    fn log_density(&self, params: &ThermalParams) -> f64 {
        self.terms.iter().map(|p| p.log_density(params)).sum()
    }
}

impl std::fmt::Debug for JointPrior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JointPrior").field("terms", &self.terms.len()).finish()
    }
}

/// Prior as it appears in a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PriorSpec {
    Gaussian { param: String, mean: f64, sigma: f64 },
    Uniform { param: String, low: f64, high: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record() -> ThermalParams {
        ThermalParams::new(100.0, 10.0, 3.0, 5.0, 2.0)
    }

    #[test]
    fn gaussian_peaks_at_mean() {
        let p = GaussianPrior::new(ParamName::Cp, 100.0, 10.0).unwrap();
        let at_mean = p.log_density(&record());
        let mut off = record();
        off.cp = 120.0;
        assert!(p.log_density(&off) < at_mean);
        // log N(0; 0, 10)
        assert_relative_eq!(at_mean, -(10.0f64).ln() - 0.5 * (2.0 * PI).ln(), epsilon = 1e-12);
    }

    #[test]
    fn uniform_is_flat_inside_and_impossible_outside() {
        let p = UniformPrior::new(ParamName::Rin, 1.0, 5.0).unwrap();
        assert_relative_eq!(p.log_density(&record()), -(4.0f64).ln());
        let mut off = record();
        off.rin = 6.0;
        assert_eq!(p.log_density(&off), f64::NEG_INFINITY);
    }

    #[test]
    fn joint_prior_sums_log_densities() {
        let g = GaussianPrior::new(ParamName::Cp, 100.0, 10.0).unwrap();
        let u = UniformPrior::new(ParamName::Rin, 1.0, 5.0).unwrap();
        let expected = g.log_density(&record()) + u.log_density(&record());
        let joint = JointPrior::new().with(g).with(u);
        assert_eq!(joint.len(), 2);
        assert_relative_eq!(joint.log_density(&record()), expected);
    }

    #[test]
    fn specs_parse_from_json() {
        let specs: Vec<PriorSpec> = serde_json::from_str(
            r#"[{"kind":"gaussian","param":"cp","mean":100,"sigma":10},
                {"kind":"uniform","param":"rin","low":0.5,"high":10}]"#,
        )
        .unwrap();
        let joint = JointPrior::from_specs(&specs).unwrap();
        assert_eq!(joint.len(), 2);
        assert!(joint.log_density(&record()).is_finite());
    }

    #[test]
    fn invalid_specs_are_rejected() {
        let bad_name = [PriorSpec::Gaussian {
            param: "cq".into(),
            mean: 1.0,
            sigma: 1.0,
        }];
        assert!(matches!(
            JointPrior::from_specs(&bad_name),
            Err(FitError::UnknownParameter(_))
        ));
        assert!(GaussianPrior::new(ParamName::Cp, 1.0, 0.0).is_err());
        assert!(UniformPrior::new(ParamName::Cp, 2.0, 1.0).is_err());
    }
}
