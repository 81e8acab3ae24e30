//! Run reports: the JSON document written after a fit, and its terminal form.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ParamName, ThermalParams};
use crate::error::AppError;
use crate::fit::{Diagnostics, FitOutcome};
use crate::models::MatrixRows;
use crate::params::Mode;
use crate::validate::{Acceptance, ValidationReport};

pub mod format;

pub use format::*;

/// How each parameter got its final value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamProvenance {
    pub mode: Mode,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

/// Everything worth keeping from one fit.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub tool: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub dataset: String,
    pub params: ThermalParams,
    pub provenance: BTreeMap<String, ParamProvenance>,
    pub matrices: MatrixRows,
    pub diagnostics: Diagnostics,
    pub validation: ValidationReport,
    pub acceptance: Acceptance,
    pub accepted: bool,
}

impl RunReport {
    pub fn new(
        dataset: impl Into<String>,
        fit: &FitOutcome,
        validation: ValidationReport,
        acceptance: Acceptance,
    ) -> Self {
        let provenance = ParamName::ALL
            .into_iter()
            .map(|name| {
                (
                    name.as_str().to_string(),
                    ParamProvenance {
                        mode: fit.parameter_set.mode(name),
                        value: fit.params.get(name),
                        rule: fit.parameter_set.derived_label(name).map(str::to_string),
                    },
                )
            })
            .collect();

        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            dataset: dataset.into(),
            params: fit.params,
            provenance,
            matrices: fit.system.to_rows(),
            diagnostics: fit.diagnostics.clone(),
            accepted: validation.accepts(&acceptance),
            validation,
            acceptance,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), AppError> {
        crate::io::write_json(path, self, "run report JSON")
    }
}
