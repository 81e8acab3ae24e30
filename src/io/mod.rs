//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - dataset and trajectory CSV exports (`export`)
//! - JSON parameter, ground-truth and engine records (`params`)

pub mod export;
pub mod ingest;
pub mod params;

pub use export::*;
pub use ingest::*;
pub use params::*;
