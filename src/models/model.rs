//! Two-node RC thermal network as a continuous-time state-space model.
//!
//! Nodes:
//!
//! - `T_in`  internal node, capacitance `cp`, receives the applied power `P`
//! - `T_air` air-gap node, capacitance `cair`
//! - `T_sf`  surface node, no capacitance; tied to `T_in` via `rin`, to `T_air`
//!   via `rair` and to the ambient `T_amb` via `rout`
//!
//! With conductances `g = 1/r` and `G = g_in + g_air + g_out`, the surface
//! balance is algebraic:
//!
//! ```text
//! T_sf = (g_in·T_in + g_air·T_air + g_out·T_amb) / G
//! ```
//!
//! and the node laws are
//!
//! ```text
//! cp   · dT_in/dt  = P − (T_in − T_sf) / rin
//! cair · dT_air/dt = (T_sf − T_air) / rair
//! ```
//!
//! State `x = [T_in, T_air]`, input `u = [T_amb, P]`, output `[T_sf, T_air]`
//! (or the subset picked by [`OutputSelection`]).

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::domain::{OutputSelection, ThermalParams};
use crate::error::FitError;

/// Continuous-time LTI system `dx/dt = A x + B u`, `y = C x + D u`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpace {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
    pub d: DMatrix<f64>,
}

impl StateSpace {
    pub fn n_states(&self) -> usize {
        self.a.nrows()
    }

    pub fn n_inputs(&self) -> usize {
        self.b.ncols()
    }

    pub fn n_outputs(&self) -> usize {
        self.c.nrows()
    }

    /// Output for a given state and input.
    pub fn output(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        &self.c * x + &self.d * u
    }

    /// Equilibrium state for constant input `u` (`A x + B u = 0`).
    ///
    /// Returns `None` when `A` is singular.
    pub fn steady_state(&self, u: &DVector<f64>) -> Option<DVector<f64>> {
        let rhs = -(&self.b * u);
        self.a.clone().lu().solve(&rhs)
    }

    /// Row-major nested vectors, for JSON reports.
    pub fn to_rows(&self) -> MatrixRows {
        MatrixRows {
            a: rows(&self.a),
            b: rows(&self.b),
            c: rows(&self.c),
            d: rows(&self.d),
        }
    }
}

/// Serializable view of a [`StateSpace`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixRows {
    pub a: Vec<Vec<f64>>,
    pub b: Vec<Vec<f64>>,
    pub c: Vec<Vec<f64>>,
    pub d: Vec<Vec<f64>>,
}

fn rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

/// Build the full two-output model (surface row, then air row).
pub fn build_system(params: &ThermalParams) -> Result<StateSpace, FitError> {
    params.validate()?;

    let ThermalParams {
        cp,
        cair,
        rin,
        rout,
        rair,
    } = *params;
    let g_in = 1.0 / rin;
    let g_air = 1.0 / rair;
    let g_out = 1.0 / rout;
    let g = g_in + g_air + g_out;

    #[rustfmt::skip]
    let a = DMatrix::from_row_slice(2, 2, &[
        -g_in * (g_air + g_out) / (g * cp), g_in * g_air / (g * cp),
        g_in * g_air / (g * cair),          -g_air * (g_in + g_out) / (g * cair),
    ]);
    #[rustfmt::skip]
    let b = DMatrix::from_row_slice(2, 2, &[
        g_in * g_out / (g * cp),    1.0 / cp,
        g_air * g_out / (g * cair), 0.0,
    ]);
    #[rustfmt::skip]
    let c = DMatrix::from_row_slice(2, 2, &[
        g_in / g, g_air / g,
        0.0,      1.0,
    ]);
    #[rustfmt::skip]
    let d = DMatrix::from_row_slice(2, 2, &[
        g_out / g, 0.0,
        0.0,       0.0,
    ]);

    Ok(StateSpace { a, b, c, d })
}

/// Build the model restricted to the selected outputs.
pub fn build_system_for(params: &ThermalParams, outputs: OutputSelection) -> Result<StateSpace, FitError> {
    let full = build_system(params)?;
    if outputs == OutputSelection::Both {
        return Ok(full);
    }
    let keep = outputs.rows();
    Ok(StateSpace {
        c: full.c.select_rows(keep),
        d: full.d.select_rows(keep),
        a: full.a,
        b: full.b,
    })
}
