//! Parameter specification and resolution.
//!
//! Each of the five parameters is fixed, derived from data, or free. The
//! split is settled in one pass before optimization and never revisited.

pub mod set;
pub mod spec;

pub use set::*;
pub use spec::*;
