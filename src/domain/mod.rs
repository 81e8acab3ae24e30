//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the five-parameter record and parameter names (`ThermalParams`, `ParamName`)
//! - validated measured experiments (`Dataset`)
//! - output regimes and the records exchanged with external engines

pub mod dataset;
pub mod types;

pub use dataset::*;
pub use types::*;
