//! Synthetic tracer records for demos and tests.
//!
//! - a stylized bomb-pulse tritium input (background, 1963 peak, decline)
//! - noisy observations sampled from a model's forward simulation

use std::f64::consts::PI;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{ParamSet, Sampling, TimeSeries};
use crate::error::AppError;
use crate::models::Model;

/// Pre-bomb tritium level in precipitation (TU).
const BACKGROUND_TU: f64 = 5.0;
/// Height of the 1963 peak above background (TU).
const PEAK_TU: f64 = 1200.0;
const PEAK_YEAR: f64 = 1963.5;
/// Rise width before the peak and e-folding decline after it (years).
const RISE_WIDTH: f64 = 2.5;
const DECLINE_TIME: f64 = 4.0;
/// Post-bomb residual above background (TU).
const TAIL_TU: f64 = 5.0;
/// Relative amplitude of the seasonal cycle in monthly records.
const SEASONAL_AMPLITUDE: f64 = 0.3;

/// Stylized tritium level in precipitation at decimal year `t`.
pub fn bomb_pulse_level(t: f64) -> f64 {
    let pulse = if t <= PEAK_YEAR {
        PEAK_TU * (-((t - PEAK_YEAR) / RISE_WIDTH).powi(2)).exp()
    } else {
        PEAK_TU * (-(t - PEAK_YEAR) / DECLINE_TIME).exp()
    };
    // Residual bomb tritium switches on smoothly around 1953.
    let tail = TAIL_TU / (1.0 + (-(t - 1953.0)).exp());
    BACKGROUND_TU + pulse + tail
}

/// Bomb-pulse input series on the sampling grid from `start` to `end` (inclusive).
///
/// Monthly series carry a spring/summer maximum.
pub fn bomb_pulse_input(start: f64, end: f64, sampling: Sampling) -> Result<TimeSeries, AppError> {
    sampling.validate()?;
    if !(start.is_finite() && end.is_finite() && end >= start) {
        return Err(AppError::new(2, format!("Invalid synthetic input range [{start}, {end}].")));
    }
    let dt = sampling.step();
    let n = ((end - start) / dt + 1e-9).floor() as usize + 1;
    let seasonal = matches!(sampling, Sampling::Monthly);

    let values = (0..n)
        .map(|i| {
            let t = start + dt * i as f64;
            let level = bomb_pulse_level(t);
            if seasonal {
                level * (1.0 + SEASONAL_AMPLITUDE * (2.0 * PI * (t - 0.25)).sin())
            } else {
                level
            }
        })
        .collect();
    Ok(TimeSeries::regular(start, dt, values)?)
}

/// How to draw observations from a forward simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticOptions {
    /// Keep every `every`-th simulated sample.
    pub every: usize,
    /// Skip simulated samples before this time.
    pub from: Option<f64>,
    /// Standard deviation of additive Gaussian noise (0 = noise-free).
    pub noise_sd: f64,
    pub seed: u64,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            every: 12,
            from: None,
            noise_sd: 0.0,
            seed: 42,
        }
    }
}

/// Sample the model output and optionally perturb it with Gaussian noise.
pub fn synthetic_observations(model: &Model, params: &[ParamSet], opts: SyntheticOptions) -> Result<TimeSeries, AppError> {
    if opts.every == 0 {
        return Err(AppError::new(2, "Sampling stride must be > 0."));
    }
    if !(opts.noise_sd.is_finite() && opts.noise_sd >= 0.0) {
        return Err(AppError::new(
            2,
            format!("Noise standard deviation must be finite and >= 0, got {}.", opts.noise_sd),
        ));
    }
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let normal = Normal::new(0.0, opts.noise_sd)
        .map_err(|e| AppError::new(2, format!("Noise distribution error: {e}")))?;

    let simulation = model.evaluate(params)?;
    let from = opts.from.unwrap_or(f64::NEG_INFINITY);

    let (times, values): (Vec<f64>, Vec<f64>) = simulation
        .series
        .iter()
        .filter(|(t, _)| *t >= from)
        .step_by(opts.every)
        .map(|(t, v)| {
            let noise = if opts.noise_sd > 0.0 { normal.sample(&mut rng) } else { 0.0 };
            (t, v + noise)
        })
        .unzip();

    if times.is_empty() {
        return Err(AppError::new(2, "No simulated samples fall in the requested window."));
    }
    Ok(TimeSeries::new(times, values)?)
}
