//! Measured experiment data.
//!
//! Layout follows the usual state-space convention:
//!
//! - `y`: `[n_samples, n_outputs]` measured temperatures (surface and/or air)
//! - `u`: `[n_samples, 2]` inputs, ambient temperature then power
//! - `t`: `[n_samples]` strictly increasing sample times (s)
//! - `x0`: `[2]` initial state, internal then air temperature

use nalgebra::{DMatrix, DVector};

use crate::domain::OutputSelection;
use crate::error::FitError;

/// Number of thermal states (internal node, air node).
pub const N_STATES: usize = 2;
/// Number of inputs (ambient temperature, power).
pub const N_INPUTS: usize = 2;

/// Column of the ambient temperature in `u`.
pub const INPUT_AMBIENT: usize = 0;
/// Column of the applied power in `u`.
pub const INPUT_POWER: usize = 1;

/// A validated experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    y: DMatrix<f64>,
    u: DMatrix<f64>,
    t: DVector<f64>,
    x0: DVector<f64>,
    outputs: OutputSelection,
}

impl Dataset {
    /// Build a dataset, checking that shapes agree and values are usable.
    ///
    /// `outputs` describes the columns of `y`.
    pub fn new(
        y: DMatrix<f64>,
        u: DMatrix<f64>,
        t: DVector<f64>,
        x0: DVector<f64>,
        outputs: OutputSelection,
    ) -> Result<Self, FitError> {
        let n = t.len();
        if n < 2 {
            return Err(FitError::ShapeMismatch(format!(
                "need at least 2 samples, got {n}"
            )));
        }
        if y.nrows() != n || u.nrows() != n {
            return Err(FitError::ShapeMismatch(format!(
                "len(t)={n}, rows(y)={}, rows(u)={} must agree",
                y.nrows(),
                u.nrows()
            )));
        }
        if u.ncols() != N_INPUTS {
            return Err(FitError::ShapeMismatch(format!(
                "u must have {N_INPUTS} columns (ambient, power), got {}",
                u.ncols()
            )));
        }
        if y.ncols() != outputs.count() {
            return Err(FitError::ShapeMismatch(format!(
                "y has {} columns but output selection {:?} expects {}",
                y.ncols(),
                outputs,
                outputs.count()
            )));
        }
        if x0.len() != N_STATES {
            return Err(FitError::ShapeMismatch(format!(
                "x0 must have length {N_STATES}, got {}",
                x0.len()
            )));
        }

        if let Some(i) = t.iter().position(|v| !v.is_finite()) {
            return Err(FitError::InvalidData(format!("non-finite time at sample {i}")));
        }
        if let Some(i) = t.as_slice().windows(2).position(|w| w[1] <= w[0]) {
            return Err(FitError::InvalidData(format!(
                "time vector is not strictly increasing at sample {}",
                i + 1
            )));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(FitError::InvalidData("non-finite measured output".into()));
        }
        if u.iter().any(|v| !v.is_finite()) {
            return Err(FitError::InvalidData("non-finite input".into()));
        }
        if x0.iter().any(|v| !v.is_finite()) {
            return Err(FitError::InvalidData("non-finite initial state".into()));
        }

        Ok(Self {
            y,
            u,
            t,
            x0,
            outputs,
        })
    }

    pub fn y(&self) -> &DMatrix<f64> {
        &self.y
    }

    pub fn u(&self) -> &DMatrix<f64> {
        &self.u
    }

    pub fn t(&self) -> &DVector<f64> {
        &self.t
    }

    pub fn x0(&self) -> &DVector<f64> {
        &self.x0
    }

    pub fn outputs(&self) -> OutputSelection {
        self.outputs
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }


    /// Total duration covered by the samples.
    pub fn duration(&self) -> f64 {
        self.t[self.len() - 1] - self.t[0]
    }
}
