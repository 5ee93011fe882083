//! Transit-time distribution unit types.
//!
//! A unit is a stateless value describing one lumped-parameter flow path:
//! a parameter schema plus a weighting function over transit time. All units
//! sit behind the [`UnitModel`] trait and are discovered by name through the
//! [`Registry`]; nothing else in the crate names concrete variants.
//!
//! Discretization: axis bin `k` is centred on `τ = k·Δ` (bin 0 covers
//! `[0, Δ/2)`), and a unit reports the exact bin mass divided by `Δ`, so the
//! discrete integral `Σ w_k·Δ` equals the mass captured by the axis.

use std::fmt;

use crate::domain::{ParamSet, ParamSpec};
use crate::error::{ModelError, ModelResult};

pub mod dispersion;
pub mod exponential_piston;
pub mod piston;
pub mod registry;

pub use dispersion::Dispersion;
pub use exponential_piston::ExponentialPiston;
pub use piston::PistonFlow;
pub use registry::Registry;

/// Uniform transit-time axis of `len` bins with spacing `step` (years).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitAxis {
    step: f64,
    len: usize,
}

impl TransitAxis {
    pub fn uniform(step: f64, len: usize) -> ModelResult<Self> {
        if !(step.is_finite() && step > 0.0) {
            return Err(ModelError::SamplingMismatch(format!(
                "transit-time step must be finite and > 0, got {step}"
            )));
        }
        Ok(Self { step, len })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Edges `[lo, hi)` of bin `k`.
    pub fn bin(&self, k: usize) -> (f64, f64) {
        let centre = self.step * k as f64;
        let half = 0.5 * self.step;
        ((centre - half).max(0.0), centre + half)
    }

    /// Transit time representative of bin `k` (its midpoint).
    pub fn midpoint(&self, k: usize) -> f64 {
        let (lo, hi) = self.bin(k);
        0.5 * (lo + hi)
    }
}

/// Response of a unit on a transit-time axis.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitResponse {
    /// Bin-averaged density (mass per year) for each axis bin.
    Density(Vec<f64>),
    /// Pure lag of the given transit time; applied as an exact shift.
    Delay(f64),
}

/// Capability shared by every transit-time distribution.
pub trait UnitModel: fmt::Debug + Send + Sync {
    /// Display name used by the registry (e.g. `"EPM"`).
    fn name(&self) -> &'static str;

    /// Stable key used for fractions and parameters (e.g. `"epm"`).
    fn prefix(&self) -> &'static str;

    /// Ordered parameter schema.
    fn params(&self) -> &'static [ParamSpec];

    /// Evaluate the weighting function on `axis`.
    ///
    /// Fails with [`ModelError::ParameterDomain`] for missing, non-finite or
    /// out-of-domain parameters.
    fn weights(&self, axis: &TransitAxis, params: &ParamSet) -> ModelResult<TransitResponse>;

    /// Parameter set holding the schema defaults.
    fn default_params(&self) -> ParamSet {
        ParamSet::from_schema(self.params())
    }
}

/// Fetch a required finite parameter value.
pub(crate) fn require(unit: &str, params: &ParamSet, key: &str) -> ModelResult<f64> {
    let value = params
        .value(key)
        .ok_or_else(|| ModelError::domain(unit, key, "is missing"))?;
    if !value.is_finite() {
        return Err(ModelError::domain(unit, key, format!("must be finite, got {value}")));
    }
    Ok(value)
}

/// Mean transit time must be strictly positive.
pub(crate) fn require_mtt(unit: &str, params: &ParamSet) -> ModelResult<f64> {
    let mtt = require(unit, params, "mtt")?;
    if mtt <= 0.0 {
        return Err(ModelError::domain(unit, "mtt", format!("must be > 0, got {mtt}")));
    }
    Ok(mtt)
}

/// Convert per-bin masses into a density on the axis.
pub(crate) fn density_from_masses(axis: &TransitAxis, masses: impl Iterator<Item = f64>) -> TransitResponse {
    let step = axis.step();
    TransitResponse::Density(masses.map(|m| m.max(0.0) / step).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_bins_are_centred_on_grid_points() {
        let axis = TransitAxis::uniform(1.0, 4).unwrap();
        assert_eq!(axis.bin(0), (0.0, 0.5));
        assert_eq!(axis.bin(1), (0.5, 1.5));
        assert_eq!(axis.bin(3), (2.5, 3.5));
        assert_eq!(axis.midpoint(0), 0.25);
        assert_eq!(axis.midpoint(2), 2.0);
    }

    #[test]
    fn axis_rejects_non_positive_step() {
        assert!(matches!(
            TransitAxis::uniform(0.0, 3),
            Err(ModelError::SamplingMismatch(_))
        ));
    }

    #[test]
    fn require_reports_missing_and_non_finite() {
        let params = ParamSet::default();
        let err = require("pm", &params, "mtt").unwrap_err();
        assert!(err.to_string().contains("missing"));

        let params = PistonFlow.default_params().with_value("mtt", f64::NAN);
        assert!(require_mtt("pm", &params).is_err());
        let params = PistonFlow.default_params().with_value("mtt", -1.0);
        assert!(require_mtt("pm", &params).is_err());
    }
}
