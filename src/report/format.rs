//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{ParamSet, WarmupReport};
use crate::fit::{FitReport, MultiStartReport};
use crate::models::{Component, HarpPoint, Simulation};
use crate::units::Registry;

/// Registry listing: one block per unit with its parameter schema.
pub fn format_units(registry: &Registry) -> String {
    let mut out = String::new();
    for unit in registry.iter() {
        out.push_str(&format!("{} (prefix `{}`)\n", unit.name(), unit.prefix()));
        out.push_str(&format!(
            "  {:<6} {:>10} {:>10} {:>10}  {}\n",
            "key", "default", "lower", "upper", "label"
        ));
        for p in unit.params() {
            out.push_str(&format!(
                "  {:<6} {:>10} {:>10} {:>10}  {}{}\n",
                p.key,
                fmt_num(p.default),
                fmt_num(p.lower_bound),
                fmt_num(p.upper_bound),
                p.label,
                if p.fixed { " (fixed)" } else { "" }
            ));
        }
    }
    out
}

/// Composition and parameter table.
pub fn format_params(components: &[Component], params: &[ParamSet]) -> String {
    let mut out = String::new();
    for (c, set) in components.iter().zip(params) {
        out.push_str(&format!("{} ({}) fraction={}\n", c.unit.name(), c.unit.prefix(), fmt_num(c.fraction)));
        for d in set.iter() {
            out.push_str(&format!(
                "  {:<6} = {:>12}  [{}, {}]{}\n",
                d.key,
                fmt_num(d.value),
                fmt_num(d.lower_bound),
                fmt_num(d.upper_bound),
                if d.fixed { " fixed" } else { "" }
            ));
        }
    }
    out
}

pub fn format_warmup(warmup: &WarmupReport) -> String {
    let flag = if warmup.is_sufficient() { "" } else { "  [INSUFFICIENT WARMUP]" };
    format!(
        "Warmup: required={:.2}a available={:.2}a steps={} truncated_mass={:.3e}{flag}\n",
        warmup.required_span, warmup.available_span, warmup.warmup_steps, warmup.truncated_mass
    )
}

/// Short summary of a forward simulation.
pub fn format_simulation(simulation: &Simulation) -> String {
    let values = simulation.series.values();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut out = String::new();
    out.push_str(&format!(
        "Simulated: n={} | c=[{}, {}]\n",
        values.len(),
        fmt_num(min),
        fmt_num(max)
    ));
    out.push_str(&format_warmup(&simulation.warmup));
    out
}

/// Fit diagnostics: status, quality, uncertainties and fitted parameters.
pub fn format_fit_summary(components: &[Component], report: &FitReport, multi: Option<&MultiStartReport>) -> String {
    let mut out = String::new();

    out.push_str("=== isosim - calibration ===\n");
    out.push_str(&format!(
        "Status: {} | iterations={} | evaluations={}\n",
        report.status.label(),
        report.iterations,
        report.evaluations
    ));
    out.push_str(&format!(
        "Quality: n_obs={} n_free={} SSE={:.6e} RMSE={:.6} |r|={:.6}\n",
        report.n_obs, report.n_free, report.sse, report.rmse, report.residual_norm
    ));
    if let Some(multi) = multi {
        out.push_str(&format!(
            "Starts: {} completed, best = #{}\n",
            multi.attempts.len(),
            multi.best_start
        ));
    }
    out.push_str(&format_warmup(&report.simulation.warmup));

    out.push_str("\nParameters:\n");
    out.push_str(&format_params(components, &report.params));

    if let Some(uncertainty) = &report.uncertainty {
        out.push_str("\nStandard errors:\n");
        for u in uncertainty {
            out.push_str(&format!("  {}.{:<6} ± {}\n", u.prefix, u.key, fmt_num(u.std_error)));
        }
    }

    out
}

/// Harp curve table.
pub fn format_harp(curve: &[HarpPoint], key: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>12} {:>14} {:>14}\n", key, "first", "second"));
    out.push_str(&format!("{:->12} {:->14} {:->14}\n", "", "", ""));
    for p in curve {
        out.push_str(&format!(
            "{:>12} {:>14} {:>14}\n",
            fmt_num(p.value),
            fmt_num(p.first),
            fmt_num(p.second)
        ));
    }
    out
}

fn fmt_num(v: f64) -> String {
    if v == 0.0 || (1e-3..1e6).contains(&v.abs()) {
        let s = format!("{v:.6}");
        let s = s.trim_end_matches('0').trim_end_matches('.');
        s.to_string()
    } else {
        format!("{v:.4e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_trimmed_or_scientific() {
        assert_eq!(fmt_num(10.0), "10");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(0.0), "0");
        assert_eq!(fmt_num(12.3456789), "12.345679");
        assert_eq!(fmt_num(1e-5), "1.0000e-5");
    }

    #[test]
    fn units_listing_names_every_parameter() {
        let text = format_units(&Registry::builtin());
        assert!(text.contains("EPM (prefix `epm`)"));
        assert!(text.contains("eta"));
        assert!(text.contains("DM (prefix `dm`)"));
        assert!(text.contains("dp"));
    }

    #[test]
    fn warmup_flag_is_visible() {
        let report = WarmupReport {
            required_span: 30.0,
            available_span: 10.0,
            warmup_steps: 30,
            truncated_mass: 0.0,
        };
        assert!(format_warmup(&report).contains("INSUFFICIENT"));
    }
}
