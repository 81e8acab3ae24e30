//! `cell-thermal` library crate.
//!
//! Identifies the five parameters of a two-node RC thermal model of a battery
//! cell from measured temperature and power time series.
//!
//! The binary (`cell-thermal`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitting core can be embedded without the CLI and its exports
//!
//! Typical library use: build a [`domain::Dataset`], describe pinned
//! parameters with a [`params::FixedSpec`], resolve a [`params::ParameterSet`]
//! and hand both to a [`fit::Optimizer`]; check the result with a
//! [`validate::Validator`].

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod params;
pub mod report;
pub mod validate;
