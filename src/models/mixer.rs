//! Mixing of unit responses into one effective transit-time distribution.
//!
//! Each selected unit contributes its response scaled by its mixing fraction.
//! Continuous densities are summed on the shared axis; pure delays (piston
//! flow) are kept aside so the convolution engine can apply them as exact
//! shifts.

use std::sync::Arc;

use crate::domain::ParamSet;
use crate::error::{ModelError, ModelResult};
use crate::units::{TransitAxis, TransitResponse, UnitModel};

/// Maximum allowed deviation of `Σ fraction` from 1.
pub const FRACTION_TOLERANCE: f64 = 1e-9;

/// One selected unit instance and its mixing fraction.
#[derive(Debug, Clone)]
pub struct Component {
    pub unit: Arc<dyn UnitModel>,
    pub fraction: f64,
}

impl Component {
    pub fn new(unit: Arc<dyn UnitModel>, fraction: f64) -> Self {
        Self { unit, fraction }
    }
}

/// A pure-delay contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayTerm {
    pub prefix: &'static str,
    pub fraction: f64,
    /// Transit time of the delay (years).
    pub lag: f64,
}

/// Fraction-weighted response of a whole composition.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedResponse {
    /// Σ fraction·density over continuous units, per axis bin.
    pub density: Vec<f64>,
    pub delays: Vec<DelayTerm>,
    /// Total fraction carried by continuous units.
    pub density_fraction: f64,
}

/// Check the composition invariants.
///
/// - at least one unit
/// - unique prefixes
/// - every fraction finite and within `[0, 1]`
/// - `|Σ fraction − 1| ≤ FRACTION_TOLERANCE`
pub fn validate_composition(components: &[Component]) -> ModelResult<()> {
    if components.is_empty() {
        return Err(ModelError::Composition("no units selected".to_string()));
    }

    for (i, c) in components.iter().enumerate() {
        let prefix = c.unit.prefix();
        if components[..i].iter().any(|o| o.unit.prefix() == prefix) {
            return Err(ModelError::Composition(format!(
                "unit '{prefix}' is selected more than once"
            )));
        }
        if !(c.fraction.is_finite() && (0.0..=1.0).contains(&c.fraction)) {
            return Err(ModelError::Composition(format!(
                "fraction of '{prefix}' must be within [0, 1], got {}",
                c.fraction
            )));
        }
    }

    let total: f64 = components.iter().map(|c| c.fraction).sum();
    if (total - 1.0).abs() > FRACTION_TOLERANCE {
        let detail = components
            .iter()
            .map(|c| format!("{}={}", c.unit.prefix(), c.fraction))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ModelError::Composition(format!(
            "fractions must sum to 1, got {total} ({detail})"
        )));
    }

    Ok(())
}

/// Combines unit responses for a validated composition.
#[derive(Debug, Clone, Copy)]
pub struct Mixer<'a> {
    components: &'a [Component],
}

impl<'a> Mixer<'a> {
    pub fn new(components: &'a [Component]) -> ModelResult<Self> {
        validate_composition(components)?;
        Ok(Self { components })
    }

    /// Evaluate every unit with its own parameter set and mix the results.
    ///
    /// `params[i]` belongs to the `i`-th component.
    pub fn mix(&self, axis: &TransitAxis, params: &[ParamSet]) -> ModelResult<MixedResponse> {
        if params.len() != self.components.len() {
            return Err(ModelError::Composition(format!(
                "{} parameter sets supplied for {} units",
                params.len(),
                self.components.len()
            )));
        }

        let mut density = vec![0.0; axis.len()];
        let mut delays = Vec::new();
        let mut density_fraction = 0.0;

        for (component, unit_params) in self.components.iter().zip(params) {
            let fraction = component.fraction;
            match component.unit.weights(axis, unit_params)? {
                TransitResponse::Density(w) => {
                    if w.len() != axis.len() {
                        return Err(ModelError::SamplingMismatch(format!(
                            "unit '{}' returned {} weights for an axis of {} bins",
                            component.unit.prefix(),
                            w.len(),
                            axis.len()
                        )));
                    }
                    for (acc, v) in density.iter_mut().zip(&w) {
                        *acc += fraction * v;
                    }
                    density_fraction += fraction;
                }
                TransitResponse::Delay(lag) => delays.push(DelayTerm {
                    prefix: component.unit.prefix(),
                    fraction,
                    lag,
                }),
            }
        }

        Ok(MixedResponse {
            density,
            delays,
            density_fraction,
        })
    }
}
