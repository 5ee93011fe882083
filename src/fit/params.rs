//! Mapping between per-unit parameter sets and the solver's free vector.
//!
//! Only non-fixed descriptors enter the optimization vector. Fixed values are
//! carried through untouched when the vector is scattered back.

use crate::domain::ParamSet;
use crate::error::{ModelError, ModelResult};
use crate::models::Component;

/// Location and bounds of one free parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeSlot {
    /// Index of the owning component.
    pub unit: usize,
    /// Index of the descriptor inside the unit's parameter set.
    pub param: usize,
    pub prefix: &'static str,
    pub key: String,
    pub lower: f64,
    pub upper: f64,
}

impl FreeSlot {
    /// `prefix.key`, used in logs and reports.
    pub fn label(&self) -> String {
        format!("{}.{}", self.prefix, self.key)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeVector {
    slots: Vec<FreeSlot>,
}

impl FreeVector {
    /// Collect the free parameters and their starting values.
    ///
    /// Fails with [`ModelError::InvalidStart`] for inverted or non-finite
    /// bounds, or a starting value outside its bounds.
    pub fn assemble(components: &[Component], params: &[ParamSet]) -> ModelResult<(Self, Vec<f64>)> {
        if components.len() != params.len() {
            return Err(ModelError::InvalidStart(format!(
                "{} parameter sets supplied for {} units",
                params.len(),
                components.len()
            )));
        }

        let mut slots = Vec::new();
        let mut start = Vec::new();
        for (unit, (component, set)) in components.iter().zip(params).enumerate() {
            let prefix = component.unit.prefix();
            for (param, d) in set.iter().enumerate() {
                if !d.value.is_finite() {
                    return Err(ModelError::InvalidStart(format!(
                        "{prefix}.{} has non-finite value {}",
                        d.key, d.value
                    )));
                }
                if d.fixed {
                    continue;
                }
                if !(d.lower_bound.is_finite() && d.upper_bound.is_finite()) {
                    return Err(ModelError::InvalidStart(format!(
                        "{prefix}.{} needs finite bounds, got [{}, {}]",
                        d.key, d.lower_bound, d.upper_bound
                    )));
                }
                if d.lower_bound > d.upper_bound {
                    return Err(ModelError::InvalidStart(format!(
                        "{prefix}.{} has inverted bounds [{}, {}]",
                        d.key, d.lower_bound, d.upper_bound
                    )));
                }
                if !d.within_bounds() {
                    return Err(ModelError::InvalidStart(format!(
                        "{prefix}.{} = {} lies outside [{}, {}]",
                        d.key, d.value, d.lower_bound, d.upper_bound
                    )));
                }
                slots.push(FreeSlot {
                    unit,
                    param,
                    prefix,
                    key: d.key.clone(),
                    lower: d.lower_bound,
                    upper: d.upper_bound,
                });
                start.push(d.value);
            }
        }

        Ok((Self { slots }, start))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[FreeSlot] {
        &self.slots
    }

    /// Project `x` into the box bounds in place.
    pub fn clamp(&self, x: &mut [f64]) {
        for (v, s) in x.iter_mut().zip(&self.slots) {
            *v = v.clamp(s.lower, s.upper);
        }
    }

    /// Copy of `base` with the free values replaced by `x`.
    pub fn scatter(&self, base: &[ParamSet], x: &[f64]) -> Vec<ParamSet> {
        let mut out = base.to_vec();
        for (s, &v) in self.slots.iter().zip(x) {
            out[s.unit].as_mut_slice()[s.param].value = v;
        }
        out
    }
}
