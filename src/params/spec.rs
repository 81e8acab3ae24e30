//! Caller-facing description of which parameters are pinned and how.
//!
//! A [`FixedSpec`] maps parameter names (as written by the caller, so they can
//! be wrong) to either a literal value or a data-dependent [`Resolver`].
//! Everything it does not name stays free unless an explicit free list says
//! otherwise (see [`ParameterSet::resolve`](crate::params::ParameterSet::resolve)).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, INPUT_AMBIENT, INPUT_POWER};
use crate::error::FitError;

type ResolverFn = dyn Fn(&Dataset) -> Result<f64, FitError> + Send + Sync;

/// A function of the measured-data context, evaluated once before fitting.
#[derive(Clone)]
pub struct Resolver {
    label: String,
    func: Arc<ResolverFn>,
}

impl Resolver {
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Dataset) -> Result<f64, FitError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn resolve(&self, context: &Dataset) -> Result<f64, FitError> {
        (self.func)(context)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("label", &self.label).finish()
    }
}

/// Serializable derivation rules usable from configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DerivedRule {
    /// `(T_sf − T_amb) / P` averaged over the last `tail` samples.
    ///
    /// At steady state all injected power leaves through `rout`, so this is
    /// the output resistance.
    SteadyStateRout {
        #[serde(default = "default_tail")]
        tail: usize,
    },
}

fn default_tail() -> usize {
    1
}

impl DerivedRule {
    pub fn resolver(self) -> Resolver {
        match self {
            DerivedRule::SteadyStateRout { tail } => Resolver::new(
                format!("steady_state_rout(tail={tail})"),
                move |ds| steady_state_rout(ds, tail),
            ),
        }
    }
}

impl From<DerivedRule> for Resolver {
    fn from(rule: DerivedRule) -> Self {
        rule.resolver()
    }
}

/// Steady-state output resistance from the last `tail` samples of `context`.
pub fn steady_state_rout(context: &Dataset, tail: usize) -> Result<f64, FitError> {
    let Some(sf) = context.outputs().surface_column() else {
        return Err(FitError::InvalidData(
            "steady-state rout needs a surface temperature column".into(),
        ));
    };
    let n = context.len();
    let tail = tail.clamp(1, n);

    let y = context.y();
    let u = context.u();
    let mut sum = 0.0;
    for i in (n - tail)..n {
        let power = u[(i, INPUT_POWER)];
        if power == 0.0 {
            return Err(FitError::InvalidData(format!(
                "steady-state rout is undefined at sample {i}: power is zero"
            )));
        }
        sum += (y[(i, sf)] - u[(i, INPUT_AMBIENT)]) / power;
    }
    Ok(sum / tail as f64)
}

/// How a pinned parameter gets its value.
#[derive(Debug, Clone)]
pub enum Pinned {
    Value(f64),
    Derived(Resolver),
}

/// Named pins supplied by the caller, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct FixedSpec {
    entries: Vec<(String, Pinned)>,
}

impl FixedSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `name` to a literal value.
    pub fn value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.entries.push((name.into(), Pinned::Value(value)));
        self
    }

    /// Pin `name` to a value computed once from the data context.
    pub fn derived(mut self, name: impl Into<String>, resolver: impl Into<Resolver>) -> Self {
        self.entries.push((name.into(), Pinned::Derived(resolver.into())));
        self
    }

    pub fn entries(&self) -> &[(String, Pinned)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputSelection;
    use nalgebra::{DMatrix, DVector};

    fn settled(power: f64) -> Dataset {
        let n = 5;
        let t = DVector::from_fn(n, |i, _| i as f64);
        // Surface settles at 25 + 2 * 5 = 35.
        let y = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 30.0 + i as f64 * 1.25 } else { 28.0 });
        let u = DMatrix::from_fn(n, 2, |_, j| if j == 0 { 25.0 } else { power });
        let x0 = DVector::from_row_slice(&[25.0, 25.0]);
        Dataset::new(y, u, t, x0, OutputSelection::Both).unwrap()
    }

    #[test]
    fn steady_state_rout_uses_last_sample() {
        let ds = settled(2.0);
        let rout = steady_state_rout(&ds, 1).unwrap();
        assert!((rout - 5.0).abs() < 1e-12);
    }

    #[test]
    fn steady_state_rout_averages_tail() {
        let ds = settled(2.0);
        // (33.75 - 25)/2 = 4.375 and (35 - 25)/2 = 5.0
        let rout = steady_state_rout(&ds, 2).unwrap();
        assert!((rout - 4.6875).abs() < 1e-12);
    }

    #[test]
    fn steady_state_rout_rejects_zero_power() {
        let ds = settled(0.0);
        assert!(matches!(steady_state_rout(&ds, 1), Err(FitError::InvalidData(_))));
    }

    #[test]
    fn derived_rule_deserializes_with_default_tail() {
        let rule: DerivedRule = serde_json::from_str(r#"{"rule":"steady_state_rout"}"#).unwrap();
        assert_eq!(rule, DerivedRule::SteadyStateRout { tail: 1 });
        assert_eq!(rule.resolver().label(), "steady_state_rout(tail=1)");
    }
}
