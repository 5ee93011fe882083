//! Catalog of available unit types, keyed by display name and prefix.

use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::units::{Dispersion, ExponentialPiston, PistonFlow, UnitModel};

/// Ordered, read-only-after-construction set of unit types.
///
/// Entries are shared behind `Arc`, so a registry can be cloned into parallel
/// fits cheaply.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<Arc<dyn UnitModel>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry holding the built-in lumped-parameter models.
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                Arc::new(ExponentialPiston),
                Arc::new(PistonFlow),
                Arc::new(Dispersion),
            ],
        }
    }

    /// Add a unit type. Names and prefixes must be unique.
    pub fn register(&mut self, unit: Arc<dyn UnitModel>) -> ModelResult<()> {
        if self.by_name(unit.name()).is_some() || self.by_prefix(unit.prefix()).is_some() {
            return Err(ModelError::Composition(format!(
                "unit '{}' (prefix '{}') is already registered",
                unit.name(),
                unit.prefix()
            )));
        }
        self.entries.push(unit);
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn UnitModel>> {
        self.entries.iter().find(|u| u.name() == name).cloned()
    }

    pub fn by_prefix(&self, prefix: &str) -> Option<Arc<dyn UnitModel>> {
        self.entries.iter().find(|u| u.prefix() == prefix).cloned()
    }

    /// Resolve a display name, failing with a composition error when unknown.
    pub fn resolve(&self, name: &str) -> ModelResult<Arc<dyn UnitModel>> {
        self.by_name(name).ok_or_else(|| {
            ModelError::Composition(format!(
                "unknown unit '{name}' (available: {})",
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|u| u.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn UnitModel>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParamSet, ParamSpec};
    use crate::units::{TransitAxis, TransitResponse};

    #[derive(Debug)]
    struct Uniform;

    const UNIFORM_PARAMS: [ParamSpec; 1] = [ParamSpec {
        key: "width",
        label: "Width [a]",
        default: 4.0,
        lower_bound: 1.0,
        upper_bound: 50.0,
        fixed: false,
    }];

    impl UnitModel for Uniform {
        fn name(&self) -> &'static str {
            "UM"
        }
        fn prefix(&self) -> &'static str {
            "um"
        }
        fn params(&self) -> &'static [ParamSpec] {
            &UNIFORM_PARAMS
        }
        fn weights(&self, axis: &TransitAxis, params: &ParamSet) -> ModelResult<TransitResponse> {
            let width = crate::units::require(self.prefix(), params, "width")?;
            Ok(TransitResponse::Density(
                (0..axis.len())
                    .map(|k| {
                        let (lo, hi) = axis.bin(k);
                        (hi.min(width) - lo).max(0.0) / width / axis.step()
                    })
                    .collect(),
            ))
        }
    }

    #[test]
    fn builtin_units_resolve_by_name_and_prefix() {
        let registry = Registry::builtin();
        assert_eq!(registry.names(), vec!["EPM", "PM", "DM"]);
        assert_eq!(registry.resolve("EPM").unwrap().prefix(), "epm");
        assert_eq!(registry.by_prefix("pm").unwrap().name(), "PM");
        assert!(matches!(
            registry.resolve("GM"),
            Err(ModelError::Composition(_))
        ));
    }

    #[test]
    fn custom_units_can_be_registered_once() {
        let mut registry = Registry::builtin();
        registry.register(Arc::new(Uniform)).unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.resolve("UM").unwrap().default_params().value("width"), Some(4.0));
        assert!(registry.register(Arc::new(Uniform)).is_err());
    }
}
