//! Exact discretization of a continuous-time LTI system over one sample interval.
//!
//! Both holds use the matrix exponential of an augmented system, so the result
//! is exact for the assumed input shape between samples:
//!
//! - zero-order hold: `u(t) = u_k` on `[t_k, t_k+1)`
//!
//!   ```text
//!   exp([[A, B], [0, 0]]·h) = [[Φ, Γ], [0, I]]
//!   x_k+1 = Φ x_k + Γ u_k
//!   ```
//!
//! - linear (first-order) hold: `u` interpolated linearly between samples
//!
//!   ```text
//!   exp([[A·h, B·h, 0], [0, 0, I], [0, 0, 0]]) = [[Φ, Γ1, Γ2], …]
//!   x_k+1 = Φ x_k + (Γ1 − Γ2) u_k + Γ2 u_k+1
//!   ```

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// How inputs behave between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputHold {
    /// Piecewise constant.
    Zero,
    /// Piecewise linear.
    #[default]
    Linear,
}

/// Discrete transition for one interval of length `h`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub h: f64,
    pub phi: DMatrix<f64>,
    /// Weight on `u_k`.
    pub gamma0: DMatrix<f64>,
    /// Weight on `u_k+1` (zero for zero-order hold).
    pub gamma1: DMatrix<f64>,
}

impl Transition {
    pub fn step(&self, x: &DVector<f64>, u_k: &DVector<f64>, u_next: &DVector<f64>) -> DVector<f64> {
        &self.phi * x + &self.gamma0 * u_k + &self.gamma1 * u_next
    }
}

/// Discretize `(A, B)` over an interval of length `h`.
pub fn discretize(a: &DMatrix<f64>, b: &DMatrix<f64>, h: f64, hold: InputHold) -> Transition {
    let n = a.nrows();
    let m = b.ncols();

    match hold {
        InputHold::Zero => {
            let mut aug = DMatrix::<f64>::zeros(n + m, n + m);
            aug.view_mut((0, 0), (n, n)).copy_from(&(a * h));
            aug.view_mut((0, n), (n, m)).copy_from(&(b * h));
            let e = aug.exp();
            Transition {
                h,
                phi: e.view((0, 0), (n, n)).into_owned(),
                gamma0: e.view((0, n), (n, m)).into_owned(),
                gamma1: DMatrix::zeros(n, m),
            }
        }
        InputHold::Linear => {
            let size = n + 2 * m;
            let mut aug = DMatrix::<f64>::zeros(size, size);
            aug.view_mut((0, 0), (n, n)).copy_from(&(a * h));
            aug.view_mut((0, n), (n, m)).copy_from(&(b * h));
            aug.view_mut((n, n + m), (m, m)).fill_with_identity();
            let e = aug.exp();
            let g1 = e.view((0, n), (n, m)).into_owned();
            let g2 = e.view((0, n + m), (n, m)).into_owned();
            Transition {
                h,
                phi: e.view((0, 0), (n, n)).into_owned(),
                gamma0: g1 - &g2,
                gamma1: g2,
            }
        }
    }
}

/// Reuses the last transition while the sample spacing stays the same.
#[derive(Debug)]
pub struct TransitionCache<'a> {
    a: &'a DMatrix<f64>,
    b: &'a DMatrix<f64>,
    hold: InputHold,
    last: Option<Transition>,
}

/// Relative tolerance under which two intervals count as equal.
const H_REL_TOL: f64 = 1e-9;

impl<'a> TransitionCache<'a> {
    pub fn new(a: &'a DMatrix<f64>, b: &'a DMatrix<f64>, hold: InputHold) -> Self {
        Self {
            a,
            b,
            hold,
            last: None,
        }
    }

    pub fn get(&mut self, h: f64) -> &Transition {
        let stale = match &self.last {
            Some(tr) => (tr.h - h).abs() > H_REL_TOL * h.abs().max(tr.h.abs()),
            None => true,
        };
        if stale {
            self.last = Some(discretize(self.a, self.b, h, self.hold));
        }
        // Populated just above when missing.
        self.last.get_or_insert_with(|| discretize(self.a, self.b, h, self.hold))
    }
}
