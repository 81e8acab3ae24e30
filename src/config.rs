//! Run configuration file.
//!
//! A run is described by one JSON document. Everything except the initial
//! guess has a default, so the smallest valid file is
//! `{"initial_guess": {"cp": …, "cair": …, "rin": …, "rout": …, "rair": …}}`,
//! which fits all five parameters with L-BFGS on the L2 metric.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{ConstantParams, EngineRequest, InitialConditions, OutputSelection, ThermalParams};
use crate::error::AppError;
use crate::fit::{FitOptions, Metric, MinimizerConfig, PriorSpec, SearchSpace};
use crate::math::InputHold;
use crate::params::{DerivedRule, FixedSpec};
use crate::validate::Acceptance;

/// A pinned parameter: a literal, or `{"derive": {"rule": …}}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixedEntry {
    Value(f64),
    Derive { derive: DerivedRule },
}

/// Cell data the external engines need besides the thermal parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub initial_soc: f64,
    pub internal_resistance: f64,
    pub nominal_capacity: f64,
}

impl EngineSettings {
    pub fn request(&self, params: ThermalParams, initial_in_temp: f64) -> EngineRequest {
        EngineRequest {
            params,
            initial_conditions: InitialConditions {
                initial_in_temp,
                initial_soc: self.initial_soc,
            },
            constants: ConstantParams {
                internal_resistance: self.internal_resistance,
                nominal_capacity: self.nominal_capacity,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub initial_guess: ThermalParams,
    /// A name may appear once; repeated keys are rejected.
    #[serde(default, deserialize_with = "unique_entries")]
    pub fixed: BTreeMap<String, FixedEntry>,
    /// Explicit free list; parameters in neither list stay at their guess.
    #[serde(default)]
    pub free: Option<Vec<String>>,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default)]
    pub minimizer: MinimizerConfig,
    #[serde(default)]
    pub search_space: SearchSpace,
    #[serde(default)]
    pub hold: InputHold,
    /// Inferred from the data columns when absent.
    #[serde(default)]
    pub outputs: Option<OutputSelection>,
    #[serde(default)]
    pub prior: Vec<PriorSpec>,
    #[serde(default)]
    pub acceptance: Acceptance,
    #[serde(default)]
    pub engine: Option<EngineSettings>,
}

fn unique_entries<'de, D>(deserializer: D) -> Result<BTreeMap<String, FixedEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueEntries;

    impl<'de> Visitor<'de> for UniqueEntries {
        type Value = BTreeMap<String, FixedEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map from parameter names to values or derivation rules")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut out = BTreeMap::new();
            while let Some((name, entry)) = map.next_entry::<String, FixedEntry>()? {
                match out.entry(name) {
                    Entry::Occupied(e) => {
                        return Err(de::Error::custom(format!(
                            "parameter '{}' is fixed more than once",
                            e.key()
                        )));
                    }
                    Entry::Vacant(v) => {
                        v.insert(entry);
                    }
                }
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(UniqueEntries)
}

impl RunConfig {
    pub fn new(initial_guess: ThermalParams) -> Self {
        Self {
            initial_guess,
            fixed: BTreeMap::new(),
            free: None,
            metric: Metric::default(),
            minimizer: MinimizerConfig::default(),
            search_space: SearchSpace::default(),
            hold: InputHold::default(),
            outputs: None,
            prior: Vec::new(),
            acceptance: Acceptance::default(),
            engine: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::new(2, format!("Failed to open config '{}': {e}", path.display())))?;
        serde_json::from_reader(file)
            .map_err(|e| AppError::new(2, format!("Invalid config '{}': {e}", path.display())))
    }

    pub fn fixed_spec(&self) -> FixedSpec {
        self.fixed
            .iter()
            .fold(FixedSpec::new(), |spec, (name, entry)| match *entry {
                FixedEntry::Value(v) => spec.value(name.clone(), v),
                FixedEntry::Derive { derive } => spec.derived(name.clone(), derive),
            })
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            metric: self.metric,
            minimizer: self.minimizer.clone(),
            search_space: self.search_space,
            hold: self.hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::Algorithm;
    use crate::params::Pinned;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: RunConfig = serde_json::from_str(
            r#"{"initial_guess":{"cp":1,"cair":10,"rin":1,"rout":5,"rair":2}}"#,
        )
        .unwrap();
        assert!(cfg.fixed.is_empty());
        assert_eq!(cfg.metric, Metric::L2);
        assert_eq!(cfg.search_space, SearchSpace::Log);
        assert_eq!(cfg.hold, InputHold::Linear);
        assert_eq!(cfg.acceptance.max_mse, 1e-3);
        assert_eq!(cfg.fit_options().minimizer.algorithm, Algorithm::Lbfgs);
    }

    #[test]
    fn fixed_entries_accept_values_and_rules() {
        let cfg: RunConfig = serde_json::from_str(
            r#"{
                "initial_guess": {"cp":1,"cair":10,"rin":1,"rout":5,"rair":2},
                "fixed": {
                    "cair": 10,
                    "rout": {"derive": {"rule": "steady_state_rout", "tail": 5}}
                },
                "minimizer": {"algorithm": "nelder-mead", "tol": 1e-6},
                "metric": "mse",
                "outputs": "surface"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.fixed["cair"], FixedEntry::Value(10.0));
        assert_eq!(
            cfg.fixed["rout"],
            FixedEntry::Derive {
                derive: DerivedRule::SteadyStateRout { tail: 5 }
            }
        );
        assert_eq!(cfg.outputs, Some(OutputSelection::Surface));

        let spec = cfg.fixed_spec();
        assert_eq!(spec.entries().len(), 2);
        assert!(spec
            .entries()
            .iter()
            .any(|(n, p)| n == "rout" && matches!(p, Pinned::Derived(r) if r.label().contains("steady_state_rout"))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res = serde_json::from_str::<RunConfig>(
            r#"{"initial_guess":{"cp":1,"cair":10,"rin":1,"rout":5,"rair":2},"tolerance":1}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn parameter_fixed_twice_is_rejected() {
        let json = r#"{
            "initial_guess": {"cp":1,"cair":10,"rin":1,"rout":5,"rair":2},
            "fixed": {"rout": 5, "rout": {"derive": {"rule": "steady_state_rout", "tail": 1}}}
        }"#;
        let err = serde_json::from_str::<RunConfig>(json).unwrap_err();
        assert!(err.to_string().contains("'rout' is fixed more than once"), "{err}");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, json).unwrap();
        let err = RunConfig::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn engine_request_carries_initial_temperature() {
        let settings = EngineSettings {
            initial_soc: 0.9,
            internal_resistance: 0.02,
            nominal_capacity: 2.5,
        };
        let req = settings.request(ThermalParams::new(1.0, 1.0, 1.0, 1.0, 1.0), 24.0);
        assert_eq!(req.initial_conditions.initial_in_temp, 24.0);
        assert_eq!(req.constants.nominal_capacity, 2.5);
    }
}
