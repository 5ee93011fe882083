//! Convolution of a mixed transit-time response with a tracer input series.
//!
//! For output sample `i` (time `t_i`):
//!
//! ```text
//! c_out(t_i) = Σ_k  Δ·w_k · c_in(t_i − k·Δ) · decay(τ_k)
//!            + Σ_d  f_d · c_in(t_i − T_d) · decay(T_d)
//! ```
//!
//! - `c_in` before the first recorded sample is the steady-state input.
//! - The axis for sample `i` reaches back `i + n_warmup` steps; older mass is
//!   truncated (the result is then biased low).
//! - Delay terms are shifted copies of the input, linearly interpolated when
//!   `T_d` is not a multiple of `Δ`.

use tracing::debug;

use crate::domain::{Decay, Sampling, TimeSeries, WarmupReport, WarmupSpec};
use crate::error::{ModelError, ModelResult};
use crate::models::mixer::MixedResponse;
use crate::units::TransitAxis;

/// Shifts within this many steps of an integer are treated as exact.
const SHIFT_SNAP: f64 = 1e-9;

/// Predicted output series plus the warmup diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub series: TimeSeries,
    pub warmup: WarmupReport,
}

/// Stateless convolution settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvolutionEngine {
    pub sampling: Sampling,
    pub decay: Decay,
    /// Concentration assumed before the first recorded input sample.
    pub steady_state_input: f64,
    pub warmup: WarmupSpec,
}

impl ConvolutionEngine {
    fn validate(&self) -> ModelResult<()> {
        self.sampling.validate()?;
        self.decay.validate()?;
        if !self.steady_state_input.is_finite() {
            return Err(ModelError::domain(
                "input",
                "steady_state_input",
                format!("must be finite, got {}", self.steady_state_input),
            ));
        }
        Ok(())
    }

    /// Warmup span (years) and the equivalent number of sampling steps.
    pub fn warmup_steps(&self) -> ModelResult<(f64, usize)> {
        self.validate()?;
        let span = self.warmup.required_span(&self.decay)?;
        let steps = (span / self.sampling.step() - SHIFT_SNAP).ceil().max(0.0) as usize;
        Ok((span, steps))
    }

    /// Transit-time axis covering the warmup plus the whole input record.
    pub fn axis_for(&self, input: &TimeSeries) -> ModelResult<TransitAxis> {
        let (_, steps) = self.warmup_steps()?;
        TransitAxis::uniform(self.sampling.step(), steps + input.len())
    }

    /// Convolve `mixed` (evaluated on `axis`) with `input`.
    pub fn convolve(
        &self,
        mixed: &MixedResponse,
        axis: &TransitAxis,
        input: &TimeSeries,
    ) -> ModelResult<Simulation> {
        let (required_span, warmup_steps) = self.warmup_steps()?;
        let dt = self.sampling.step();

        if input.is_empty() {
            return Err(ModelError::InvalidSeries("input series is empty".to_string()));
        }
        input.check_uniform(self.sampling)?;
        input.check_finite()?;
        if (axis.step() - dt).abs() > self.sampling.tolerance() {
            return Err(ModelError::SamplingMismatch(format!(
                "transit-time step {} does not match the {} input step {dt}",
                axis.step(),
                self.sampling.label()
            )));
        }
        if mixed.density.len() != axis.len() {
            return Err(ModelError::SamplingMismatch(format!(
                "weighting function has {} bins but the axis has {}",
                mixed.density.len(),
                axis.len()
            )));
        }

        let values = input.values();
        let n = values.len();
        let steady = self.steady_state_input;

        // Decay-weighted bin masses and their running sums (for the steady tail).
        let kernel: Vec<f64> = mixed
            .density
            .iter()
            .enumerate()
            .map(|(k, w)| w * dt * self.decay.factor(axis.midpoint(k)))
            .collect();
        let mut cumulative = Vec::with_capacity(kernel.len() + 1);
        cumulative.push(0.0);
        for k in &kernel {
            let last = cumulative[cumulative.len() - 1];
            cumulative.push(last + k);
        }

        let at = |j: isize| -> f64 {
            if j < 0 { steady } else { values[j as usize] }
        };

        let delays: Vec<(f64, f64, f64)> = mixed
            .delays
            .iter()
            .map(|d| (snap(d.lag / dt), d.fraction, self.decay.factor(d.lag)))
            .collect();

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let reach = (i + warmup_steps).min(kernel.len().saturating_sub(1));
            let mut c = 0.0;

            if !kernel.is_empty() {
                // Recorded part: k = 0..=min(i, reach).
                let recorded = i.min(reach);
                for k in 0..=recorded {
                    c += kernel[k] * values[i - k];
                }
                // Backfilled part: k = i+1..=reach.
                if reach > i {
                    c += steady * (cumulative[reach + 1] - cumulative[i + 1]);
                }
            }

            for &(shift, fraction, factor) in &delays {
                if shift > (i + warmup_steps) as f64 {
                    continue;
                }
                let x = i as f64 - shift;
                let j0 = x.floor();
                let frac = x - j0;
                let j0 = j0 as isize;
                let value = if frac == 0.0 {
                    at(j0)
                } else {
                    (1.0 - frac) * at(j0) + frac * at(j0 + 1)
                };
                c += fraction * value * factor;
            }

            out.push(c);
        }

        let captured_first = cumulative_mass(mixed, axis, warmup_steps, dt);
        let warmup = WarmupReport {
            required_span,
            available_span: n as f64 * dt,
            warmup_steps,
            truncated_mass: (1.0 - captured_first).max(0.0),
        };
        if !warmup.is_sufficient() {
            debug!(
                required_span,
                available_span = warmup.available_span,
                "warmup span exceeds the recorded input"
            );
        }

        Ok(Simulation {
            series: TimeSeries::new(input.times().to_vec(), out)?,
            warmup,
        })
    }
}

/// Round near-integer shifts so exact multiples of the step stay exact.
fn snap(shift: f64) -> f64 {
    let rounded = shift.round();
    if (shift - rounded).abs() < SHIFT_SNAP { rounded } else { shift }
}

/// Undecayed mass reachable from the first output sample.
fn cumulative_mass(mixed: &MixedResponse, axis: &TransitAxis, warmup_steps: usize, dt: f64) -> f64 {
    let bins = (warmup_steps + 1).min(axis.len());
    let density: f64 = mixed.density[..bins].iter().sum::<f64>() * dt;
    let delays: f64 = mixed
        .delays
        .iter()
        .filter(|d| snap(d.lag / dt) <= warmup_steps as f64)
        .map(|d| d.fraction)
        .sum();
    density + delays
}
