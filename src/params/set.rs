//! Resolved parameter set.
//!
//! A [`ParameterSet`] is built once per fitting run. Fixed and derived values
//! are settled at construction; the optimizer only ever sees the free values,
//! in canonical order, and gets full records back through [`ParameterSet::merge`].

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::domain::{check_domain, Dataset, ParamName, ThermalParams};
use crate::error::FitError;
use crate::params::{FixedSpec, Pinned};

/// Resolution mode of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Fixed,
    Derived,
    Free,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    /// Resolved values for pinned parameters, seeds for free ones.
    values: ThermalParams,
    modes: [Mode; 5],
    /// Resolver label for derived parameters (for reports).
    labels: [Option<String>; 5],
}

impl ParameterSet {
    /// Resolve a run's parameters.
    ///
    /// - `initial_guess` seeds every free parameter.
    /// - `fixed` pins parameters to literals or to values derived from `context`.
    /// - `free`, when given, is the explicit list of searched parameters;
    ///   anything in neither list is pinned at its initial guess.
    ///
    /// Derived resolvers run exactly once, here.
    pub fn resolve(
        initial_guess: &ThermalParams,
        fixed: &FixedSpec,
        free: Option<&[String]>,
        context: &Dataset,
    ) -> Result<Self, FitError> {
        let mut pinned: [Option<&Pinned>; 5] = [None; 5];
        for (raw, pin) in fixed.entries() {
            let name: ParamName = raw.parse()?;
            if pinned[name.index()].is_some() {
                return Err(FitError::OverconstrainedParameter {
                    name: name.to_string(),
                    reason: "pinned more than once".into(),
                });
            }
            pinned[name.index()] = Some(pin);
        }

        let explicit_free = match free {
            Some(names) => {
                let mut set = BTreeSet::new();
                for raw in names {
                    let name: ParamName = raw.parse()?;
                    if pinned[name.index()].is_some() {
                        return Err(FitError::OverconstrainedParameter {
                            name: name.to_string(),
                            reason: "listed as both fixed and free".into(),
                        });
                    }
                    if !set.insert(name) {
                        return Err(FitError::OverconstrainedParameter {
                            name: name.to_string(),
                            reason: "listed as free more than once".into(),
                        });
                    }
                }
                Some(set)
            }
            None => None,
        };

        let mut values = *initial_guess;
        let mut modes = [Mode::Free; 5];
        let mut labels: [Option<String>; 5] = Default::default();

        for name in ParamName::ALL {
            let i = name.index();
            match pinned[i] {
                Some(Pinned::Value(v)) => {
                    modes[i] = Mode::Fixed;
                    values.set(name, *v);
                }
                Some(Pinned::Derived(resolver)) => {
                    let v = resolver.resolve(context)?;
                    debug!(param = %name, value = v, rule = resolver.label(), "resolved derived parameter");
                    modes[i] = Mode::Derived;
                    labels[i] = Some(resolver.label().to_string());
                    values.set(name, v);
                }
                None => {
                    let searched = explicit_free.as_ref().is_none_or(|set| set.contains(&name));
                    modes[i] = if searched { Mode::Free } else { Mode::Fixed };
                }
            }
            check_domain(name, values.get(name))?;
        }

        Ok(Self {
            values,
            modes,
            labels,
        })
    }

    pub fn mode(&self, name: ParamName) -> Mode {
        self.modes[name.index()]
    }

    pub fn derived_label(&self, name: ParamName) -> Option<&str> {
        self.labels[name.index()].as_deref()
    }

    /// Free parameter names in canonical order.
    pub fn free_names(&self) -> Vec<ParamName> {
        ParamName::ALL
            .into_iter()
            .filter(|n| self.mode(*n) == Mode::Free)
            .collect()
    }

    /// Seed values of the free parameters, aligned with [`Self::free_names`].
    pub fn free_vector(&self) -> Vec<f64> {
        self.free_names().into_iter().map(|n| self.values.get(n)).collect()
    }

    /// Resolved values with free parameters at their seeds.
    pub fn seeds(&self) -> &ThermalParams {
        &self.values
    }

    /// Rebuild the full record from a proposed free vector.
    ///
    /// Pinned parameters always keep their resolved values.
    pub fn merge(&self, free: &[f64]) -> Result<ThermalParams, FitError> {
        let names = self.free_names();
        if free.len() != names.len() {
            return Err(FitError::ShapeMismatch(format!(
                "free vector has {} entries, expected {} ({})",
                free.len(),
                names.len(),
                names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
            )));
        }
        let mut out = self.values;
        for (name, v) in names.into_iter().zip(free) {
            out.set(name, *v);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputSelection;
    use crate::params::{DerivedRule, Resolver};
    use nalgebra::{DMatrix, DVector};

    fn guess() -> ThermalParams {
        ThermalParams::new(1.0, 10.0, 1.0, 4.0, 2.0)
    }

    fn context() -> Dataset {
        let n = 4;
        let t = DVector::from_fn(n, |i, _| i as f64);
        let y = DMatrix::from_fn(n, 2, |_, j| if j == 0 { 35.0 } else { 30.0 });
        let u = DMatrix::from_fn(n, 2, |_, j| if j == 0 { 25.0 } else { 2.0 });
        let x0 = DVector::from_row_slice(&[25.0, 25.0]);
        Dataset::new(y, u, t, x0, OutputSelection::Both).unwrap()
    }

    #[test]
    fn fixed_and_derived_are_excluded_from_free_vector() {
        let spec = FixedSpec::new()
            .value("cair", 12.0)
            .value("rair", 2.5)
            .derived("rout", DerivedRule::SteadyStateRout { tail: 1 });
        let set = ParameterSet::resolve(&guess(), &spec, None, &context()).unwrap();

        assert_eq!(set.free_names(), vec![ParamName::Cp, ParamName::Rin]);
        assert_eq!(set.free_vector(), vec![1.0, 1.0]);
        assert_eq!(set.mode(ParamName::Rout), Mode::Derived);
        assert_eq!(set.seeds().rout, 5.0);
        assert_eq!(set.derived_label(ParamName::Rout), Some("steady_state_rout(tail=1)"));
    }

    #[test]
    fn merge_keeps_pinned_values() {
        let spec = FixedSpec::new().value("cair", 12.0);
        let set = ParameterSet::resolve(&guess(), &spec, None, &context()).unwrap();
        let merged = set.merge(&[100.0, 3.0, 5.0, 2.0]).unwrap();
        assert_eq!(merged, ThermalParams::new(100.0, 12.0, 3.0, 5.0, 2.0));
    }

    #[test]
    fn merge_rejects_wrong_length() {
        let set = ParameterSet::resolve(&guess(), &FixedSpec::new(), None, &context()).unwrap();
        assert_eq!(set.free_names().len(), 5);
        assert!(matches!(set.merge(&[1.0, 2.0]), Err(FitError::ShapeMismatch(_))));
    }

    #[test]
    fn unknown_fixed_name_fails() {
        let spec = FixedSpec::new().value("rsurf", 1.0);
        let err = ParameterSet::resolve(&guess(), &spec, None, &context()).unwrap_err();
        assert_eq!(err, FitError::UnknownParameter("rsurf".into()));
    }

    #[test]
    fn fixed_and_free_is_overconstrained() {
        let spec = FixedSpec::new().value("cp", 100.0);
        let free = vec!["cp".to_string(), "rin".to_string()];
        let err = ParameterSet::resolve(&guess(), &spec, Some(free.as_slice()), &context()).unwrap_err();
        assert!(matches!(err, FitError::OverconstrainedParameter { name, .. } if name == "cp"));
    }

    #[test]
    fn pinned_twice_is_overconstrained() {
        let spec = FixedSpec::new().value("rin", 1.0).value("rin", 2.0);
        let err = ParameterSet::resolve(&guess(), &spec, None, &context()).unwrap_err();
        assert!(matches!(err, FitError::OverconstrainedParameter { .. }));
    }

    #[test]
    fn explicit_free_list_pins_the_rest_at_guess() {
        let free = vec!["rin".to_string()];
        let set = ParameterSet::resolve(&guess(), &FixedSpec::new(), Some(free.as_slice()), &context()).unwrap();
        assert_eq!(set.free_names(), vec![ParamName::Rin]);
        assert_eq!(set.mode(ParamName::Cp), Mode::Fixed);
        assert_eq!(set.merge(&[7.0]).unwrap().rin, 7.0);
    }

    #[test]
    fn derived_resolver_runs_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let resolver = Resolver::new("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(3.0)
        });
        let spec = FixedSpec::new().derived("rout", resolver);
        let set = ParameterSet::resolve(&guess(), &spec, None, &context()).unwrap();
        for _ in 0..10 {
            set.merge(&set.free_vector()).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_positive_pin_is_a_domain_error() {
        let spec = FixedSpec::new().value("rair", -1.0);
        let err = ParameterSet::resolve(&guess(), &spec, None, &context()).unwrap_err();
        assert!(matches!(err, FitError::Domain { .. }));
    }
}
