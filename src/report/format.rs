//! Formatted terminal output.
//!
//! Formatting lives here so the fitting code stays free of presentation and
//! output changes stay localized.

use std::fmt::Write as _;

use crate::domain::{ParamName, ThermalParams};
use crate::io::DatasetStats;
use crate::params::Mode;
use crate::report::RunReport;
use crate::validate::ValidationReport;

/// Summary of one fit: data, diagnostics, parameters, validation.
pub fn format_run_summary(report: &RunReport, stats: Option<&DatasetStats>) -> String {
    let mut out = String::new();

    out.push_str("=== cell-thermal - parameter fit ===\n");
    let _ = writeln!(out, "Dataset: {}", report.dataset);
    if let Some(s) = stats {
        let _ = writeln!(
            out,
            "Samples: n={} | duration={:.1}s | power<= {:.3}W | ambient=[{:.2}, {:.2}]C",
            s.n_samples, s.duration, s.power_max, s.ambient_min, s.ambient_max
        );
    }

    let d = &report.diagnostics;
    out.push_str("\nOptimizer:\n");
    let _ = writeln!(
        out,
        "- {} on {} | iterations={} evaluations={} objective={:.6e}",
        d.algorithm, d.metric, d.iterations, d.evaluations, d.objective
    );
    let _ = writeln!(out, "- {}", d.message);

    out.push_str("\nParameters:\n");
    for name in ParamName::ALL {
        let p = &report.provenance[name.as_str()];
        let how = match (p.mode, &p.rule) {
            (Mode::Derived, Some(rule)) => format!("derived: {rule}"),
            (mode, _) => format!("{mode:?}").to_lowercase(),
        };
        let _ = writeln!(out, "  {:<5} = {:>14.6}  ({how})", name.as_str(), p.value);
    }

    out.push_str("\nState-space matrices:\n");
    let m = &report.matrices;
    for (name, rows) in [("A", &m.a), ("B", &m.b), ("C", &m.c), ("D", &m.d)] {
        out.push_str(&format_matrix(name, rows));
    }

    out.push('\n');
    out.push_str(&format_validation(&report.validation));
    let _ = writeln!(
        out,
        "Acceptance (mse <= {:.1e}): {}",
        report.acceptance.max_mse,
        if report.accepted { "PASS" } else { "FAIL" }
    );
    out
}

/// Observability and residual metrics.
pub fn format_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    let o = &report.observability;
    out.push_str("Validation:\n");
    let _ = writeln!(
        out,
        "- observability rank {}/{} ({}) | cond={:.3e}",
        o.rank,
        o.n_states,
        if o.is_observable() { "observable" } else { "NOT observable" },
        o.condition_number
    );
    let r = &report.residuals;
    let _ = writeln!(
        out,
        "- mse={:.6e} l2={:.6e} rmse={:.6e} mae={:.6e} | {}={:.6e}",
        r.mse, r.l2, r.rmse, r.mae, r.metric, r.score
    );
    let _ = writeln!(out, "- per-channel mse: {}", fmt_vec(&r.channel_mse));
    out
}

pub fn format_params(params: &ThermalParams) -> String {
    ParamName::ALL
        .iter()
        .map(|n| format!("{}={:.6}", n.as_str(), params.get(*n)))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_matrix(name: &str, rows: &[Vec<f64>]) -> String {
    let mut out = format!("{name} =\n");
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:>14.6e}")).collect();
        let _ = writeln!(out, "  [{}]", cells.join(" "));
    }
    out
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6e}")).collect();
    format!("[{}]", parts.join(", "))
}
