//! Numerical rank from singular values.

use nalgebra::{DMatrix, DVector};

/// Singular values plus the rank they imply.
#[derive(Debug, Clone, PartialEq)]
pub struct RankInfo {
    pub rank: usize,
    pub tolerance: f64,
    pub singular_values: DVector<f64>,
}

impl RankInfo {
    /// `σ_max / σ_min`; infinite when the matrix is rank deficient.
    pub fn condition_number(&self) -> f64 {
        let max = self.singular_values.max();
        let min = self.singular_values.min();
        if min > 0.0 { max / min } else { f64::INFINITY }
    }
}

/// Rank with the usual default cut-off `σ_max · max(rows, cols) · ε`.
pub fn numerical_rank(m: &DMatrix<f64>) -> RankInfo {
    let singular_values = m.singular_values();
    if singular_values.is_empty() {
        return RankInfo {
            rank: 0,
            tolerance: 0.0,
            singular_values,
        };
    }
    let tolerance = singular_values.max() * m.nrows().max(m.ncols()) as f64 * f64::EPSILON;
    let rank = singular_values.iter().filter(|s| **s > tolerance).count();
    RankInfo {
        rank,
        tolerance,
        singular_values,
    }
}
