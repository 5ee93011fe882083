//! Tracer–tracer ("harp") curves.
//!
//! Two models share one composition but differ in tracer and input record.
//! Sweeping one parameter (usually a mean transit time) traces a curve in the
//! plane of their simulated concentrations at a single sample time.

use rayon::prelude::*;
use serde::Serialize;

use crate::domain::ParamSet;
use crate::error::{ModelError, ModelResult};
use crate::models::model::Model;

/// Tracer-free admixture fractions drawn as dilution lines by default.
pub const DEFAULT_DILUTIONS: [f64; 3] = [0.25, 0.5, 0.75];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HarpPoint {
    /// Swept parameter value.
    pub value: f64,
    pub first: f64,
    pub second: f64,
}

/// One swept parameter: component index plus parameter key.
#[derive(Debug, Clone, Copy)]
pub struct Sweep<'a> {
    pub unit: usize,
    pub key: &'a str,
}

/// Simulate both tracers at `at` for every swept value.
///
/// Points come back in the order of `values`.
pub fn tracer_tracer(
    first: &Model,
    second: &Model,
    params: &[ParamSet],
    sweep: Sweep<'_>,
    values: &[f64],
    at: f64,
) -> ModelResult<Vec<HarpPoint>> {
    check_shared_composition(first, second)?;
    let components = first.components();
    if params.len() != components.len() {
        return Err(ModelError::Composition(format!(
            "{} parameter sets given for {} units",
            params.len(),
            components.len()
        )));
    }
    let (Some(component), Some(base)) = (components.get(sweep.unit), params.get(sweep.unit)) else {
        return Err(ModelError::Composition(format!(
            "sweep targets unit #{} but only {} units are selected",
            sweep.unit,
            components.len()
        )));
    };
    if base.get(sweep.key).is_none() {
        return Err(ModelError::domain(component.unit.prefix(), sweep.key, "is not a parameter of this unit"));
    }

    let first_idx = first.sample_indices(&[at])?[0];
    let second_idx = second.sample_indices(&[at])?[0];

    values
        .par_iter()
        .map(|&value| {
            let mut swept = params.to_vec();
            swept[sweep.unit].set_value(sweep.key, value);
            let a = first.evaluate(&swept)?;
            let b = second.evaluate(&swept)?;
            Ok(HarpPoint {
                value,
                first: a.series.values()[first_idx],
                second: b.series.values()[second_idx],
            })
        })
        .collect()
}

/// Scale a curve by `1 − f` for each tracer-free fraction `f`.
pub fn dilution_lines(curve: &[HarpPoint], fractions: &[f64]) -> Vec<(f64, Vec<HarpPoint>)> {
    fractions
        .iter()
        .map(|&f| {
            let keep = 1.0 - f;
            let line = curve
                .iter()
                .map(|p| HarpPoint {
                    value: p.value,
                    first: p.first * keep,
                    second: p.second * keep,
                })
                .collect();
            (f, line)
        })
        .collect()
}

fn check_shared_composition(first: &Model, second: &Model) -> ModelResult<()> {
    let prefixes = |m: &Model| {
        m.components()
            .iter()
            .map(|c| (c.unit.prefix(), c.fraction))
            .collect::<Vec<_>>()
    };
    if prefixes(first) != prefixes(second) {
        return Err(ModelError::Composition(
            "tracer-tracer models must share the same units and fractions".to_string(),
        ));
    }
    Ok(())
}
