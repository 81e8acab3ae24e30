//! Thermal model construction.
//!
//! Models are built by small, pure functions so that fitting and validation
//! code can stay generic over the matrices.

pub mod model;

pub use model::*;
