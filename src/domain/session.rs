//! Session state exchanged with the caller.
//!
//! The session is the only place where unit names, fractions and parameter
//! entries live as loose maps. `build` turns it into a validated [`Model`]
//! plus ordered parameter sets; `apply_params` and `record_simulation` write
//! results back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Decay, ParamDescriptor, ParamSet, Sampling, TimeSeries, Tracer, WarmupSpec};
use crate::error::{ModelError, ModelResult};
use crate::models::{Component, ConvolutionEngine, Model, Simulation};
use crate::units::Registry;

/// One parameter as stored in the session: value, bounds and fixed flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub val: f64,
    pub lb: f64,
    pub ub: f64,
    #[serde(default)]
    pub fixed: bool,
}

impl From<&ParamDescriptor> for ParamEntry {
    fn from(d: &ParamDescriptor) -> Self {
        Self {
            val: d.value,
            lb: d.lower_bound,
            ub: d.upper_bound,
            fixed: d.fixed,
        }
    }
}

fn default_monthly() -> bool {
    true
}

fn default_half_lives() -> f64 {
    WarmupSpec::default().half_lives
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default = "default_monthly")]
    pub is_monthly: bool,
    pub tracer: Tracer,
    /// Overrides the tracer's tabulated half-life (years).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub half_life: Option<f64>,
    #[serde(default)]
    pub input_series: Option<TimeSeries>,
    #[serde(default)]
    pub target_series: Option<TimeSeries>,
    /// Registry display names, in composition order.
    #[serde(default)]
    pub selected_units: Vec<String>,
    /// Mixing fraction per unit prefix.
    #[serde(default)]
    pub unit_fractions: BTreeMap<String, f64>,
    /// `params[prefix][key]`.
    #[serde(default)]
    pub params: BTreeMap<String, BTreeMap<String, ParamEntry>>,
    #[serde(default)]
    pub steady_state_input: f64,
    #[serde(default = "default_half_lives")]
    pub n_warmup_half_lives: f64,
    #[serde(default)]
    pub min_warmup_span: f64,
    #[serde(default)]
    pub last_simulation: Option<Vec<f64>>,
    #[serde(default)]
    pub last_times: Option<Vec<f64>>,
}

/// A validated model plus parameter sets in composition order.
#[derive(Debug, Clone)]
pub struct ModelSetup {
    pub model: Model,
    pub params: Vec<ParamSet>,
}

impl Session {
    pub fn new(tracer: Tracer, is_monthly: bool) -> Self {
        Self {
            is_monthly,
            tracer,
            half_life: None,
            input_series: None,
            target_series: None,
            selected_units: Vec::new(),
            unit_fractions: BTreeMap::new(),
            params: BTreeMap::new(),
            steady_state_input: 0.0,
            n_warmup_half_lives: default_half_lives(),
            min_warmup_span: 0.0,
            last_simulation: None,
            last_times: None,
        }
    }

    /// Select `units` with equal fractions and registry-default parameters.
    pub fn template(registry: &Registry, tracer: Tracer, is_monthly: bool, units: &[String]) -> ModelResult<Self> {
        let mut session = Self::new(tracer, is_monthly);
        if units.is_empty() {
            return Err(ModelError::Composition("no units selected".to_string()));
        }
        let fraction = 1.0 / units.len() as f64;
        for name in units {
            let unit = registry.resolve(name)?;
            session.selected_units.push(unit.name().to_string());
            session.unit_fractions.insert(unit.prefix().to_string(), fraction);
        }
        session.seed_defaults(registry)?;
        Ok(session)
    }

    pub fn sampling(&self) -> Sampling {
        Sampling::from_monthly(self.is_monthly)
    }

    pub fn decay(&self) -> Decay {
        match (self.tracer, self.half_life) {
            (_, Some(h)) => Decay::with_half_life(h),
            (tracer, None) => tracer.decay(),
        }
    }

    pub fn warmup(&self) -> WarmupSpec {
        WarmupSpec {
            half_lives: self.n_warmup_half_lives,
            min_span: self.min_warmup_span,
        }
    }

    pub fn engine(&self) -> ConvolutionEngine {
        ConvolutionEngine {
            sampling: self.sampling(),
            decay: self.decay(),
            steady_state_input: self.steady_state_input,
            warmup: self.warmup(),
        }
    }

    /// Fill in registry defaults for every missing parameter entry.
    ///
    /// Existing entries are kept as they are.
    pub fn seed_defaults(&mut self, registry: &Registry) -> ModelResult<()> {
        for name in &self.selected_units {
            let unit = registry.resolve(name)?;
            let entries = self.params.entry(unit.prefix().to_string()).or_default();
            for spec in unit.params() {
                entries
                    .entry(spec.key.to_string())
                    .or_insert_with(|| ParamEntry::from(&spec.descriptor()));
            }
        }
        Ok(())
    }

    /// Resolve the selected units and their fractions.
    pub fn components(&self, registry: &Registry) -> ModelResult<Vec<Component>> {
        self.selected_units
            .iter()
            .map(|name| {
                let unit = registry.resolve(name)?;
                let fraction = self.unit_fractions.get(unit.prefix()).copied().ok_or_else(|| {
                    ModelError::Composition(format!("no fraction given for unit '{}'", unit.prefix()))
                })?;
                Ok(Component::new(unit, fraction))
            })
            .collect()
    }

    /// Parameter sets for `components`, in schema order.
    ///
    /// Missing entries are a domain error; unknown keys are rejected.
    pub fn param_sets(&self, components: &[Component]) -> ModelResult<Vec<ParamSet>> {
        components
            .iter()
            .map(|c| {
                let prefix = c.unit.prefix();
                let schema = c.unit.params();
                let empty = BTreeMap::new();
                let entries = self.params.get(prefix).unwrap_or(&empty);

                if let Some(key) = entries.keys().find(|k| !schema.iter().any(|s| s.key == k.as_str())) {
                    return Err(ModelError::domain(prefix, key, "is not a parameter of this unit"));
                }

                let descriptors = schema
                    .iter()
                    .map(|spec| {
                        let entry = entries
                            .get(spec.key)
                            .ok_or_else(|| ModelError::domain(prefix, spec.key, "is missing"))?;
                        Ok(ParamDescriptor {
                            key: spec.key.to_string(),
                            label: spec.label.to_string(),
                            value: entry.val,
                            lower_bound: entry.lb,
                            upper_bound: entry.ub,
                            fixed: entry.fixed,
                        })
                    })
                    .collect::<ModelResult<Vec<_>>>()?;
                Ok(ParamSet::new(descriptors))
            })
            .collect()
    }

    pub fn input(&self) -> ModelResult<&TimeSeries> {
        self.input_series
            .as_ref()
            .ok_or_else(|| ModelError::InvalidSeries("session has no input series".to_string()))
    }

    pub fn target(&self) -> ModelResult<&TimeSeries> {
        self.target_series
            .as_ref()
            .ok_or_else(|| ModelError::InvalidSeries("session has no target series".to_string()))
    }

    /// Build the model and parameter sets described by this session.
    pub fn build(&self, registry: &Registry) -> ModelResult<ModelSetup> {
        let components = self.components(registry)?;
        let params = self.param_sets(&components)?;
        let model = Model::new(components, self.input()?.clone(), self.engine())?;
        Ok(ModelSetup { model, params })
    }

    /// Write fitted values back; bounds and fixed flags stay untouched.
    pub fn apply_params(&mut self, components: &[Component], params: &[ParamSet]) {
        for (c, set) in components.iter().zip(params) {
            let entries = self.params.entry(c.unit.prefix().to_string()).or_default();
            for d in set.iter() {
                entries
                    .entry(d.key.clone())
                    .and_modify(|e| e.val = d.value)
                    .or_insert_with(|| ParamEntry::from(d));
            }
        }
    }

    pub fn record_simulation(&mut self, simulation: &Simulation) {
        self.last_times = Some(simulation.series.times().to_vec());
        self.last_simulation = Some(simulation.series.values().to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let registry = Registry::builtin();
        let mut s = Session::template(&registry, Tracer::Tritium, true, &["EPM".to_string(), "PM".to_string()]).unwrap();
        s.input_series = Some(TimeSeries::regular(1960.0, 1.0 / 12.0, vec![10.0; 12 * 40]).unwrap());
        s.steady_state_input = 10.0;
        s
    }

    #[test]
    fn template_seeds_equal_fractions_and_defaults() {
        let s = session();
        assert_eq!(s.unit_fractions.get("epm"), Some(&0.5));
        assert_eq!(s.unit_fractions.get("pm"), Some(&0.5));
        assert_eq!(s.params["epm"]["eta"].val, 0.5);
        assert_eq!(s.params["pm"]["mtt"].ub, 500.0);
    }

    #[test]
    fn build_orders_params_by_composition_and_schema() {
        let setup = session().build(&Registry::builtin()).unwrap();
        assert_eq!(setup.params.len(), 2);
        let keys: Vec<_> = setup.params[0].iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["mtt", "eta"]);
        assert_eq!(setup.model.components()[1].unit.prefix(), "pm");
        assert!(setup.model.evaluate(&setup.params).is_ok());
    }

    #[test]
    fn missing_entries_are_errors_until_seeded() {
        let mut s = session();
        s.params.get_mut("epm").unwrap().remove("eta");
        let err = s.build(&Registry::builtin()).unwrap_err();
        assert!(matches!(err, ModelError::ParameterDomain { ref key, .. } if key == "eta"));

        s.seed_defaults(&Registry::builtin()).unwrap();
        assert!(s.build(&Registry::builtin()).is_ok());
    }

    #[test]
    fn missing_fraction_and_unknown_unit_are_composition_errors() {
        let mut s = session();
        s.unit_fractions.remove("pm");
        assert!(matches!(s.build(&Registry::builtin()), Err(ModelError::Composition(_))));

        let mut s = session();
        s.selected_units.push("GM".to_string());
        assert!(matches!(s.build(&Registry::builtin()), Err(ModelError::Composition(_))));
    }

    #[test]
    fn apply_params_keeps_bounds() {
        let mut s = session();
        let setup = s.build(&Registry::builtin()).unwrap();
        let mut params = setup.params.clone();
        params[0].set_value("mtt", 33.0);
        s.apply_params(setup.model.components(), &params);
        assert_eq!(s.params["epm"]["mtt"].val, 33.0);
        assert_eq!(s.params["epm"]["mtt"].lb, 0.1);

        let sim = setup.model.evaluate(&params).unwrap();
        s.record_simulation(&sim);
        assert_eq!(s.last_times.as_ref().map(Vec::len), Some(12 * 40));
    }

    #[test]
    fn json_uses_contract_field_names() {
        let s = session();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["params"]["pm"]["mtt"]["lb"], 0.1);
        assert_eq!(json["tracer"], "tritium");
        assert_eq!(json["unit_fractions"]["epm"], 0.5);

        let minimal = r#"{
            "tracer": "Tritium",
            "selected_units": ["PM"],
            "unit_fractions": {"pm": 1.0},
            "params": {"pm": {"mtt": {"val": 5.0, "lb": 1.0, "ub": 50.0}}}
        }"#;
        let parsed: Session = serde_json::from_str(minimal).unwrap();
        assert!(parsed.is_monthly);
        assert_eq!(parsed.n_warmup_half_lives, 2.0);
        assert!(!parsed.params["pm"]["mtt"].fixed);
    }

    #[test]
    fn half_life_override_wins() {
        let mut s = session();
        s.half_life = Some(100.0);
        assert_eq!(s.decay().half_life, Some(100.0));
    }
}
