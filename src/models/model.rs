//! Forward model: composition + input series + convolution settings.
//!
//! `Model::evaluate` is a pure function of the parameter sets, so the solver
//! can call it repeatedly with perturbed parameters.

use tracing::debug;

use crate::domain::{ParamSet, TimeSeries};
use crate::error::{ModelError, ModelResult};
use crate::models::convolution::{ConvolutionEngine, Simulation};
use crate::models::mixer::{Component, Mixer, validate_composition};
use crate::units::TransitAxis;

#[derive(Debug, Clone)]
pub struct Model {
    components: Vec<Component>,
    input: TimeSeries,
    engine: ConvolutionEngine,
    axis: TransitAxis,
}

impl Model {
    /// Build a model, validating the composition and the input sampling up front.
    pub fn new(
        components: Vec<Component>,
        input: TimeSeries,
        engine: ConvolutionEngine,
    ) -> ModelResult<Self> {
        validate_composition(&components)?;
        if input.is_empty() {
            return Err(ModelError::InvalidSeries("input series is empty".to_string()));
        }
        input.check_uniform(engine.sampling)?;
        input.check_finite()?;
        let axis = engine.axis_for(&input)?;

        debug!(
            units = components.len(),
            samples = input.len(),
            axis_bins = axis.len(),
            "model built"
        );

        Ok(Self {
            components,
            input,
            engine,
            axis,
        })
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn input(&self) -> &TimeSeries {
        &self.input
    }

    pub fn engine(&self) -> &ConvolutionEngine {
        &self.engine
    }

    pub fn axis(&self) -> &TransitAxis {
        &self.axis
    }

    /// Registry defaults for every component, in composition order.
    pub fn default_params(&self) -> Vec<ParamSet> {
        self.components.iter().map(|c| c.unit.default_params()).collect()
    }

    /// Simulate the output series at every input timestamp.
    pub fn evaluate(&self, params: &[ParamSet]) -> ModelResult<Simulation> {
        let mixer = Mixer::new(&self.components)?;
        let mixed = mixer.mix(&self.axis, params)?;
        self.engine.convolve(&mixed, &self.axis, &self.input)
    }

    /// Map sample times onto indices of the input grid.
    pub fn sample_indices(&self, times: &[f64]) -> ModelResult<Vec<usize>> {
        let grid = self.input.times();
        let t0 = grid[0];
        let dt = self.engine.sampling.step();
        let tol = self.engine.sampling.tolerance();

        times
            .iter()
            .map(|&t| {
                let pos = ((t - t0) / dt).round();
                if !pos.is_finite() || pos < 0.0 || pos as usize >= grid.len() {
                    return Err(ModelError::SamplingMismatch(format!(
                        "sample time {t} lies outside the input record [{t0}, {}]",
                        grid[grid.len() - 1]
                    )));
                }
                let idx = pos as usize;
                if (grid[idx] - t).abs() > tol {
                    return Err(ModelError::SamplingMismatch(format!(
                        "sample time {t} is not on the {} input grid",
                        self.engine.sampling.label()
                    )));
                }
                Ok(idx)
            })
            .collect()
    }

    /// Simulated values at the given sample times.
    pub fn sample(&self, simulation: &Simulation, times: &[f64]) -> ModelResult<Vec<f64>> {
        let values = simulation.series.values();
        Ok(self
            .sample_indices(times)?
            .into_iter()
            .map(|i| values[i])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{Decay, Sampling, Tracer, WarmupSpec};
    use crate::units::{Dispersion, ExponentialPiston, PistonFlow, UnitModel};

    fn engine(sampling: Sampling, decay: Decay, steady: f64, warmup: WarmupSpec) -> ConvolutionEngine {
        ConvolutionEngine {
            sampling,
            decay,
            steady_state_input: steady,
            warmup,
        }
    }

    fn monthly_series(start: f64, values: Vec<f64>) -> TimeSeries {
        TimeSeries::regular(start, 1.0 / 12.0, values).unwrap()
    }

    /// Seasonal signal with a slow trend: positive and smooth.
    fn seasonal_input(months: usize) -> TimeSeries {
        let values = (0..months)
            .map(|i| {
                let t = i as f64 / 12.0;
                20.0 + 0.3 * t + 5.0 * (2.0 * std::f64::consts::PI * t).sin()
            })
            .collect();
        monthly_series(1960.0, values)
    }

    fn single(unit: Arc<dyn UnitModel>) -> Vec<Component> {
        vec![Component::new(unit, 1.0)]
    }

    #[test]
    fn piston_reproduces_constant_input_for_stable_tracer() {
        let warmup = WarmupSpec {
            half_lives: 0.0,
            min_span: 20.0,
        };
        let model = Model::new(
            single(Arc::new(PistonFlow)),
            monthly_series(1970.0, vec![100.0; 252]),
            engine(Sampling::Monthly, Decay::stable(), 100.0, warmup),
        )
        .unwrap();
        let params = vec![PistonFlow.default_params().with_value("mtt", 10.0)];
        let sim = model.evaluate(&params).unwrap();
        assert!(sim.series.values().iter().all(|v| (v - 100.0).abs() < 1e-9));
        assert!(sim.warmup.is_sufficient());
    }

    #[test]
    fn piston_applies_decay_over_the_transit_time() {
        let warmup = WarmupSpec {
            half_lives: 10.0,
            min_span: 0.0,
        };
        let model = Model::new(
            single(Arc::new(PistonFlow)),
            monthly_series(1900.0, vec![100.0; 12 * 150]),
            engine(Sampling::Monthly, Tracer::Tritium.decay(), 100.0, warmup),
        )
        .unwrap();
        let params = vec![PistonFlow.default_params().with_value("mtt", 10.0)];
        let sim = model.evaluate(&params).unwrap();
        let expected = 100.0 * Tracer::Tritium.decay().factor(10.0);
        assert!(sim.series.values().iter().all(|v| (v - expected).abs() < 1e-9));
    }

    #[test]
    fn epm_converges_to_piston_as_eta_approaches_one() {
        let input = seasonal_input(12 * 60);
        let decay = Tracer::Tritium.decay();
        let warmup = WarmupSpec::default();
        let pm = Model::new(
            single(Arc::new(PistonFlow)),
            input.clone(),
            engine(Sampling::Monthly, decay, 20.0, warmup),
        )
        .unwrap();
        let epm = Model::new(single(Arc::new(ExponentialPiston)), input, *pm.engine()).unwrap();

        let pm_out = pm
            .evaluate(&[PistonFlow.default_params().with_value("mtt", 10.0)])
            .unwrap();

        let mut previous = f64::INFINITY;
        for eta in [0.9, 0.99, 0.999, 0.99999] {
            let params = ExponentialPiston
                .default_params()
                .with_value("mtt", 10.0)
                .with_value("eta", eta);
            let out = epm.evaluate(&[params]).unwrap();
            let max_diff = out
                .series
                .values()
                .iter()
                .zip(pm_out.series.values())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            assert!(max_diff < previous, "eta {eta}: {max_diff} !< {previous}");
            previous = max_diff;
        }
        assert!(previous < 1e-6, "final difference {previous}");
    }

    #[test]
    fn shorter_half_life_lowers_the_output() {
        let input = seasonal_input(12 * 40);
        let warmup = WarmupSpec {
            half_lives: 0.0,
            min_span: 100.0,
        };
        let components = vec![
            Component::new(Arc::new(ExponentialPiston), 0.6),
            Component::new(Arc::new(PistonFlow), 0.4),
        ];
        let params = vec![
            ExponentialPiston.default_params(),
            PistonFlow.default_params().with_value("mtt", 3.0),
        ];

        let mut previous: Option<Vec<f64>> = None;
        for half_life in [100.0, 30.0, 12.32, 5.0] {
            let model = Model::new(
                components.clone(),
                input.clone(),
                engine(Sampling::Monthly, Decay::with_half_life(half_life), 20.0, warmup),
            )
            .unwrap();
            let out = model.evaluate(&params).unwrap().series.values().to_vec();
            if let Some(prev) = &previous {
                assert!(out.iter().zip(prev).all(|(a, b)| a < b), "half-life {half_life}");
            }
            previous = Some(out);
        }
    }

    #[test]
    fn mixture_with_dispersion_unit_evaluates() {
        let components = vec![
            Component::new(Arc::new(Dispersion), 0.5),
            Component::new(Arc::new(ExponentialPiston), 0.5),
        ];
        let model = Model::new(
            components,
            seasonal_input(12 * 30),
            engine(Sampling::Monthly, Tracer::Tritium.decay(), 20.0, WarmupSpec::default()),
        )
        .unwrap();
        let sim = model.evaluate(&model.default_params()).unwrap();
        assert!(sim.series.values().iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn bad_composition_fails_at_build_time() {
        let components = vec![Component::new(Arc::new(PistonFlow), 0.5)];
        let err = Model::new(
            components,
            seasonal_input(24),
            engine(Sampling::Monthly, Decay::stable(), 0.0, WarmupSpec::default()),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::Composition(_)));
    }

    #[test]
    fn out_of_domain_parameters_surface_unit_context() {
        let model = Model::new(
            single(Arc::new(ExponentialPiston)),
            seasonal_input(24),
            engine(Sampling::Monthly, Decay::stable(), 0.0, WarmupSpec::default()),
        )
        .unwrap();
        let params = vec![ExponentialPiston.default_params().with_value("eta", 1.0)];
        match model.evaluate(&params) {
            Err(ModelError::ParameterDomain { unit, key, .. }) => {
                assert_eq!(unit, "epm");
                assert_eq!(key, "eta");
            }
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    #[test]
    fn sample_times_must_lie_on_the_grid() {
        let model = Model::new(
            single(Arc::new(PistonFlow)),
            monthly_series(2000.0, vec![1.0; 24]),
            engine(Sampling::Monthly, Decay::stable(), 1.0, WarmupSpec::default()),
        )
        .unwrap();
        assert_eq!(
            model.sample_indices(&[2000.0, 2000.0 + 5.0 / 12.0, 2001.0]).unwrap(),
            vec![0, 5, 12]
        );
        assert!(matches!(
            model.sample_indices(&[2000.04]),
            Err(ModelError::SamplingMismatch(_))
        ));
        assert!(model.sample_indices(&[2003.0]).is_err());
        assert!(model.sample_indices(&[1999.0]).is_err());

        let sim = model.evaluate(&model.default_params()).unwrap();
        let sampled = model.sample(&sim, &[2000.5, 2001.0]).unwrap();
        assert_eq!(sampled, vec![sim.series.values()[6], sim.series.values()[12]]);
    }

    #[test]
    fn yearly_input_with_monthly_sampling_is_a_mismatch() {
        let err = Model::new(
            single(Arc::new(PistonFlow)),
            TimeSeries::regular(2000.0, 1.0, vec![1.0; 10]).unwrap(),
            engine(Sampling::Monthly, Decay::stable(), 0.0, WarmupSpec::default()),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::SamplingMismatch(_)));
    }
}
