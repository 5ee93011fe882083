//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during simulation and calibration
//! - exchanged with the caller through the session contract
//! - exported to JSON/CSV

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Static parameter schema entry published by a unit type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub default: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub fixed: bool,
}

impl ParamSpec {
    /// Materialize the schema entry as an editable descriptor holding the default value.
    pub fn descriptor(&self) -> ParamDescriptor {
        ParamDescriptor {
            key: self.key.to_string(),
            label: self.label.to_string(),
            value: self.default,
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            fixed: self.fixed,
        }
    }
}

/// A single model parameter with bounds.
///
/// Invariant expected by the solver: `lower_bound <= value <= upper_bound`.
/// A `fixed` parameter is used in forward evaluation but never optimized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub key: String,
    pub label: String,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub fixed: bool,
}

impl ParamDescriptor {
    pub fn within_bounds(&self) -> bool {
        self.lower_bound <= self.value && self.value <= self.upper_bound
    }
}

/// Ordered parameter set owned by one unit instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamSet {
    descriptors: Vec<ParamDescriptor>,
}

impl ParamSet {
    pub fn new(descriptors: Vec<ParamDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Build a set holding the schema defaults.
    pub fn from_schema(schema: &[ParamSpec]) -> Self {
        Self::new(schema.iter().map(ParamSpec::descriptor).collect())
    }

    pub fn get(&self, key: &str) -> Option<&ParamDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ParamDescriptor> {
        self.descriptors.iter_mut().find(|d| d.key == key)
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.get(key).map(|d| d.value)
    }

    /// Set a value; returns `false` if the key is unknown.
    pub fn set_value(&mut self, key: &str, value: f64) -> bool {
        match self.get_mut(key) {
            Some(d) => {
                d.value = value;
                true
            }
            None => false,
        }
    }

    /// Builder-style value override (unknown keys are ignored).
    pub fn with_value(mut self, key: &str, value: f64) -> Self {
        self.set_value(key, value);
        self
    }

    /// Builder-style fixed flag override (unknown keys are ignored).
    pub fn with_fixed(mut self, key: &str, fixed: bool) -> Self {
        if let Some(d) = self.get_mut(key) {
            d.fixed = fixed;
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.descriptors.iter()
    }

    pub fn as_slice(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    pub fn as_mut_slice(&mut self) -> &mut [ParamDescriptor] {
        &mut self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Sampling interval of the input series (and of the transit-time axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    Monthly,
    Yearly,
    /// Any other fixed interval, in years.
    Interval(f64),
}

impl Sampling {
    pub fn from_monthly(is_monthly: bool) -> Self {
        if is_monthly { Sampling::Monthly } else { Sampling::Yearly }
    }

    /// Step length in years.
    pub fn step(self) -> f64 {
        match self {
            Sampling::Monthly => 1.0 / 12.0,
            Sampling::Yearly => 1.0,
            Sampling::Interval(dt) => dt,
        }
    }

    /// Absolute tolerance used when matching timestamps to the grid.
    pub fn tolerance(self) -> f64 {
        1e-6 * self.step()
    }

    pub fn validate(self) -> ModelResult<()> {
        let dt = self.step();
        if dt.is_finite() && dt > 0.0 {
            Ok(())
        } else {
            Err(ModelError::SamplingMismatch(format!(
                "sampling interval must be finite and > 0, got {dt}"
            )))
        }
    }

    pub fn label(self) -> String {
        match self {
            Sampling::Monthly => "monthly".to_string(),
            Sampling::Yearly => "yearly".to_string(),
            Sampling::Interval(dt) => format!("every {dt} a"),
        }
    }
}

/// Environmental tracers with known decay behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Tracer {
    #[serde(alias = "Tritium")]
    Tritium,
    #[serde(alias = "Krypton85", alias = "Kr-85")]
    Krypton85,
    #[serde(alias = "Argon39", alias = "Ar-39")]
    Argon39,
    #[serde(alias = "Carbon14", alias = "C-14")]
    Carbon14,
    /// Stable tracer (e.g. δ18O, CFCs treated as conservative): no decay.
    #[serde(alias = "Stable")]
    Stable,
}

impl Tracer {
    pub fn display_name(self) -> &'static str {
        match self {
            Tracer::Tritium => "Tritium",
            Tracer::Krypton85 => "Kr-85",
            Tracer::Argon39 => "Ar-39",
            Tracer::Carbon14 => "C-14",
            Tracer::Stable => "Stable",
        }
    }

    /// Half-life in years (`None` for stable tracers).
    pub fn half_life(self) -> Option<f64> {
        match self {
            Tracer::Tritium => Some(12.32),
            Tracer::Krypton85 => Some(10.739),
            Tracer::Argon39 => Some(269.0),
            Tracer::Carbon14 => Some(5730.0),
            Tracer::Stable => None,
        }
    }

    pub fn decay(self) -> Decay {
        Decay {
            half_life: self.half_life(),
        }
    }
}

/// Radioactive decay context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decay {
    /// Half-life in years; `None` means the tracer is stable.
    pub half_life: Option<f64>,
}

impl Decay {
    pub fn stable() -> Self {
        Self { half_life: None }
    }

    pub fn with_half_life(half_life: f64) -> Self {
        Self {
            half_life: Some(half_life),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        match self.half_life {
            Some(h) if !(h.is_finite() && h > 0.0) => Err(ModelError::domain(
                "tracer",
                "half_life",
                format!("must be finite and > 0, got {h}"),
            )),
            _ => Ok(()),
        }
    }

    /// Decay constant `ln(2) / half_life` (0 for stable tracers).
    pub fn lambda(&self) -> f64 {
        match self.half_life {
            Some(h) => std::f64::consts::LN_2 / h,
            None => 0.0,
        }
    }

    /// Fraction of the tracer remaining after `age` years.
    pub fn factor(&self, age: f64) -> f64 {
        match self.half_life {
            Some(_) => (-self.lambda() * age).exp(),
            None => 1.0,
        }
    }
}

/// How far back in transit time the convolution must reach before the first output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarmupSpec {
    /// Multiple of the tracer half-life.
    pub half_lives: f64,
    /// Minimum span in years (the only criterion for stable tracers).
    pub min_span: f64,
}

impl Default for WarmupSpec {
    fn default() -> Self {
        Self {
            half_lives: 2.0,
            min_span: 0.0,
        }
    }
}

impl WarmupSpec {
    /// Required warmup span in years for the given decay context.
    pub fn required_span(&self, decay: &Decay) -> ModelResult<f64> {
        if !(self.half_lives.is_finite() && self.half_lives >= 0.0) {
            return Err(ModelError::domain(
                "warmup",
                "half_lives",
                format!("must be finite and >= 0, got {}", self.half_lives),
            ));
        }
        if !(self.min_span.is_finite() && self.min_span >= 0.0) {
            return Err(ModelError::domain(
                "warmup",
                "min_span",
                format!("must be finite and >= 0, got {}", self.min_span),
            ));
        }
        Ok(match decay.half_life {
            Some(h) => (self.half_lives * h).max(self.min_span),
            None => self.min_span,
        })
    }
}

/// Soft diagnostic produced by every convolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarmupReport {
    /// Warmup span demanded by the warmup specification (years).
    pub required_span: f64,
    /// Span covered by the recorded input series (years).
    pub available_span: f64,
    /// Number of backfilled steps prepended to the input.
    pub warmup_steps: usize,
    /// Mixed transit-time mass older than the axis of the first output sample.
    pub truncated_mass: f64,
}

impl WarmupReport {
    /// `false` means the result may be biased and the caller should surface it.
    pub fn is_sufficient(&self) -> bool {
        self.required_span <= self.available_span
    }
}

/// Ascending `(time, value)` series. Times are decimal years.
///
/// Values may be `NaN` to mark missing observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries")]
pub struct TimeSeries {
    times: Vec<f64>,
    #[serde(serialize_with = "missing_as_null")]
    values: Vec<f64>,
}

/// JSON has no NaN; missing values travel as `null`.
#[derive(Deserialize)]
struct RawSeries {
    times: Vec<f64>,
    values: Vec<Option<f64>>,
}

impl TryFrom<RawSeries> for TimeSeries {
    type Error = ModelError;

    fn try_from(raw: RawSeries) -> Result<Self, Self::Error> {
        let values = raw.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        TimeSeries::new(raw.times, values)
    }
}

fn missing_as_null<S: serde::Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|v| v.is_finite().then_some(*v)))
}

impl TimeSeries {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> ModelResult<Self> {
        if times.len() != values.len() {
            return Err(ModelError::InvalidSeries(format!(
                "{} timestamps but {} values",
                times.len(),
                values.len()
            )));
        }
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(ModelError::InvalidSeries(format!("non-finite timestamp {t}")));
        }
        for pair in times.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ModelError::InvalidSeries(format!(
                    "timestamps must be strictly ascending ({} then {})",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { times, values })
    }

    /// Regular series starting at `start` with the given step.
    pub fn regular(start: f64, step: f64, values: Vec<f64>) -> ModelResult<Self> {
        let times = (0..values.len()).map(|i| start + step * i as f64).collect();
        Self::new(times, values)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Points with a finite value (missing observations skipped).
    pub fn observed(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.iter().filter(|(_, v)| v.is_finite())
    }

    /// Ensure consecutive timestamps are spaced by the sampling step.
    pub fn check_uniform(&self, sampling: Sampling) -> ModelResult<()> {
        let dt = sampling.step();
        let tol = sampling.tolerance();
        for (i, pair) in self.times.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            if (gap - dt).abs() > tol {
                return Err(ModelError::SamplingMismatch(format!(
                    "input spacing {gap} at index {i} does not match the {} step {dt}",
                    sampling.label()
                )));
            }
        }
        Ok(())
    }

    /// Ensure every value is finite (required for input signals).
    pub fn check_finite(&self) -> ModelResult<()> {
        match self.iter().find(|(_, v)| !v.is_finite()) {
            Some((t, v)) => Err(ModelError::InvalidSeries(format!(
                "value {v} at time {t} is not finite"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_rejects_unordered_and_duplicate_times() {
        assert!(TimeSeries::new(vec![1.0, 1.0], vec![0.0, 0.0]).is_err());
        assert!(TimeSeries::new(vec![2.0, 1.0], vec![0.0, 0.0]).is_err());
        assert!(TimeSeries::new(vec![1.0], vec![0.0, 0.0]).is_err());
        assert!(TimeSeries::new(vec![1.0, 2.0], vec![0.0, f64::NAN]).is_ok());
    }

    #[test]
    fn series_deserialization_is_validated() {
        let ok: TimeSeries = serde_json::from_str(r#"{"times":[1.0,2.0],"values":[3.0,4.0]}"#).unwrap();
        assert_eq!(ok.len(), 2);
        let bad = serde_json::from_str::<TimeSeries>(r#"{"times":[2.0,1.0],"values":[3.0,4.0]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn missing_values_serialize_as_null() {
        let series = TimeSeries::new(vec![1.0, 2.0], vec![3.0, f64::NAN]).unwrap();
        let json = serde_json::to_string(&series).unwrap();
        assert_eq!(json, r#"{"times":[1.0,2.0],"values":[3.0,null]}"#);
        let back: TimeSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back.values()[0], 3.0);
        assert!(back.values()[1].is_nan());
        assert_eq!(back.observed().count(), 1);
    }

    #[test]
    fn monthly_series_uniformity_check() {
        let series = TimeSeries::regular(1950.0, 1.0 / 12.0, vec![1.0; 36]).unwrap();
        assert!(series.check_uniform(Sampling::Monthly).is_ok());
        assert!(matches!(
            series.check_uniform(Sampling::Yearly),
            Err(ModelError::SamplingMismatch(_))
        ));
    }

    #[test]
    fn decay_factor_halves_after_one_half_life() {
        let decay = Tracer::Tritium.decay();
        assert!((decay.factor(12.32) - 0.5).abs() < 1e-12);
        assert_eq!(Decay::stable().factor(1000.0), 1.0);
        assert!(Decay::with_half_life(-1.0).validate().is_err());
    }

    #[test]
    fn warmup_span_uses_half_lives_or_minimum() {
        let spec = WarmupSpec {
            half_lives: 2.0,
            min_span: 30.0,
        };
        assert_eq!(spec.required_span(&Tracer::Tritium.decay()).unwrap(), 30.0);
        assert!((spec.required_span(&Tracer::Krypton85.decay()).unwrap() - 30.0).abs() < 1e-12);
        assert_eq!(spec.required_span(&Tracer::Carbon14.decay()).unwrap(), 11460.0);
        assert_eq!(spec.required_span(&Decay::stable()).unwrap(), 30.0);
    }

    #[test]
    fn tracer_names_accept_session_spelling() {
        let t: Tracer = serde_json::from_str("\"Tritium\"").unwrap();
        assert_eq!(t, Tracer::Tritium);
        let t: Tracer = serde_json::from_str("\"krypton85\"").unwrap();
        assert_eq!(t, Tracer::Krypton85);
    }

    #[test]
    fn param_set_lookup_and_update() {
        let schema = [ParamSpec {
            key: "mtt",
            label: "Mean transit time",
            default: 10.0,
            lower_bound: 0.1,
            upper_bound: 100.0,
            fixed: false,
        }];
        let mut set = ParamSet::from_schema(&schema);
        assert_eq!(set.value("mtt"), Some(10.0));
        assert!(set.set_value("mtt", 12.0));
        assert!(!set.set_value("eta", 0.5));
        assert!(set.get("mtt").unwrap().within_bounds());
    }
}
