//! Error metrics comparing measured and simulated outputs.
//!
//! All metrics take `[n_samples, n_outputs]` matrices. Sums run over every
//! output channel; means divide by the number of samples unless noted.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Scalar summary of the mismatch between two output trajectories.
pub trait ErrorMetric: Send + Sync {
    fn name(&self) -> &str;

    /// Both matrices have the same shape.
    fn evaluate(&self, measured: &DMatrix<f64>, simulated: &DMatrix<f64>) -> f64;
}

/// Built-in metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `sqrt(Σ r² / n_samples)`.
    #[default]
    L2,
    /// `Σ r² / n_samples`.
    Mse,
    /// `sqrt(Σ r² / (n_samples · n_outputs))`.
    Rmse,
    /// `Σ |r| / (n_samples · n_outputs)`.
    Mae,
}

impl Metric {
    pub fn apply(self, residual: &DMatrix<f64>) -> f64 {
        match self {
            Metric::L2 => l2(residual),
            Metric::Mse => mse(residual),
            Metric::Rmse => rmse(residual),
            Metric::Mae => mae(residual),
        }
    }
}

impl ErrorMetric for Metric {
    fn name(&self) -> &str {
        match self {
            Metric::L2 => "l2",
            Metric::Mse => "mse",
            Metric::Rmse => "rmse",
            Metric::Mae => "mae",
        }
    }

    fn evaluate(&self, measured: &DMatrix<f64>, simulated: &DMatrix<f64>) -> f64 {
        self.apply(&(measured - simulated))
    }
}

/// Adapter turning a closure into an [`ErrorMetric`].
pub struct FnMetric<F> {
    name: String,
    func: F,
}

impl<F> FnMetric<F>
where
    F: Fn(&DMatrix<f64>, &DMatrix<f64>) -> f64 + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> ErrorMetric for FnMetric<F>
where
    F: Fn(&DMatrix<f64>, &DMatrix<f64>) -> f64 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, measured: &DMatrix<f64>, simulated: &DMatrix<f64>) -> f64 {
        (self.func)(measured, simulated)
    }
}

fn samples(residual: &DMatrix<f64>) -> f64 {
    residual.nrows().max(1) as f64
}

fn entries(residual: &DMatrix<f64>) -> f64 {
    residual.len().max(1) as f64
}

pub fn mse(residual: &DMatrix<f64>) -> f64 {
    residual.norm_squared() / samples(residual)
}

pub fn l2(residual: &DMatrix<f64>) -> f64 {
    mse(residual).sqrt()
}

pub fn rmse(residual: &DMatrix<f64>) -> f64 {
    (residual.norm_squared() / entries(residual)).sqrt()
}

pub fn mae(residual: &DMatrix<f64>) -> f64 {
    residual.iter().map(|r| r.abs()).sum::<f64>() / entries(residual)
}

/// Mean squared residual of each output channel.
pub fn channel_mse(residual: &DMatrix<f64>) -> Vec<f64> {
    let n = samples(residual);
    residual.column_iter().map(|c| c.norm_squared() / n).collect()
}
