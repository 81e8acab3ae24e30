//! Fitting orchestration.
//!
//! Responsibilities:
//!
//! - simulate candidate parameter records against a dataset
//! - score them with a pluggable error metric (plus an optional prior)
//! - drive a pluggable minimizer over the free parameters
//! - fan independent runs out over a thread pool

pub mod batch;
pub mod evaluator;
pub mod fitter;
pub mod metric;
pub mod minimizer;
pub mod prior;

pub use batch::*;
pub use evaluator::*;
pub use fitter::*;
pub use metric::*;
pub use minimizer::*;
pub use prior::*;
