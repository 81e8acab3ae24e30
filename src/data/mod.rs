//! Data sources that are not measurements.

pub mod synthetic;

pub use synthetic::*;
