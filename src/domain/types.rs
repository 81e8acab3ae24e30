//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON for other tools (the native engine, the simulation harness)
//! - reloaded later for validation or simulation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// One of the five physical parameters of the thermal model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamName {
    /// Internal thermal capacitance (J/K).
    Cp,
    /// Air-gap thermal capacitance (J/K).
    Cair,
    /// Internal (core to surface) thermal resistance (K/W).
    Rin,
    /// Surface to ambient thermal resistance (K/W).
    Rout,
    /// Surface to air-gap thermal resistance (K/W).
    Rair,
}

impl ParamName {
    /// Canonical order. Free vectors always follow it.
    pub const ALL: [ParamName; 5] = [
        ParamName::Cp,
        ParamName::Cair,
        ParamName::Rin,
        ParamName::Rout,
        ParamName::Rair,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamName::Cp => "cp",
            ParamName::Cair => "cair",
            ParamName::Rin => "rin",
            ParamName::Rout => "rout",
            ParamName::Rair => "rair",
        }
    }

    /// Position in [`ParamName::ALL`].
    pub fn index(self) -> usize {
        match self {
            ParamName::Cp => 0,
            ParamName::Cair => 1,
            ParamName::Rin => 2,
            ParamName::Rout => 3,
            ParamName::Rair => 4,
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamName {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamName::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| FitError::UnknownParameter(s.to_string()))
    }
}

/// The flat five-field parameter record.
///
/// Field names are the interchange contract with the external tools and must
/// not be renamed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalParams {
    pub cp: f64,
    pub cair: f64,
    pub rin: f64,
    pub rout: f64,
    pub rair: f64,
}

impl ThermalParams {
    pub fn new(cp: f64, cair: f64, rin: f64, rout: f64, rair: f64) -> Self {
        Self {
            cp,
            cair,
            rin,
            rout,
            rair,
        }
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        let [cp, cair, rin, rout, rair] = values;
        Self::new(cp, cair, rin, rout, rair)
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.cp, self.cair, self.rin, self.rout, self.rair]
    }

    pub fn get(&self, name: ParamName) -> f64 {
        match name {
            ParamName::Cp => self.cp,
            ParamName::Cair => self.cair,
            ParamName::Rin => self.rin,
            ParamName::Rout => self.rout,
            ParamName::Rair => self.rair,
        }
    }

    pub fn set(&mut self, name: ParamName, value: f64) {
        match name {
            ParamName::Cp => self.cp = value,
            ParamName::Cair => self.cair = value,
            ParamName::Rin => self.rin = value,
            ParamName::Rout => self.rout = value,
            ParamName::Rair => self.rair = value,
        }
    }

    /// Check that every value is strictly positive and finite.
    pub fn validate(&self) -> Result<(), FitError> {
        for name in ParamName::ALL {
            check_domain(name, self.get(name))?;
        }
        Ok(())
    }
}

impl fmt::Display for ThermalParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cp={:.6} cair={:.6} rin={:.6} rout={:.6} rair={:.6}",
            self.cp, self.cair, self.rin, self.rout, self.rair
        )
    }
}

pub(crate) fn check_domain(name: ParamName, value: f64) -> Result<(), FitError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FitError::Domain {
            name: name.to_string(),
            value,
        })
    }
}

/// Which measured temperatures are model outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSelection {
    /// Surface temperature only.
    Surface,
    /// Air-gap temperature only.
    Air,
    /// Surface then air temperature.
    #[default]
    Both,
}

impl OutputSelection {
    pub fn count(self) -> usize {
        match self {
            OutputSelection::Surface | OutputSelection::Air => 1,
            OutputSelection::Both => 2,
        }
    }

    /// Rows of the full two-output model kept by this selection.
    pub fn rows(self) -> &'static [usize] {
        match self {
            OutputSelection::Surface => &[0],
            OutputSelection::Air => &[1],
            OutputSelection::Both => &[0, 1],
        }
    }

    /// Column of the surface temperature in the selected output, if present.
    pub fn surface_column(self) -> Option<usize> {
        match self {
            OutputSelection::Surface | OutputSelection::Both => Some(0),
            OutputSelection::Air => None,
        }
    }

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            OutputSelection::Surface => &["sf_temp"],
            OutputSelection::Air => &["air_temp"],
            OutputSelection::Both => &["sf_temp", "air_temp"],
        }
    }
}

/// Initial conditions consumed by the external engines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    pub initial_in_temp: f64,
    pub initial_soc: f64,
}

/// Constant cell parameters consumed by the external engines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantParams {
    pub internal_resistance: f64,
    pub nominal_capacity: f64,
}

/// Everything the external simulation engines need for a run.
///
/// The core only produces this record; it does not call the engines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub params: ThermalParams,
    pub initial_conditions: InitialConditions,
    pub constants: ConstantParams,
}
