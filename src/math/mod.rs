//! Mathematical utilities: exact discretization and numerical rank.

pub mod discretize;
pub mod rank;

pub use discretize::*;
pub use rank::*;
