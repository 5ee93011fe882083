//! Dispersion model (DM).
//!
//! Advective–dispersive flow with mean transit time `T` and dispersion
//! parameter `D_P` (inverse of the Péclet number):
//!
//! ```text
//! g(τ) = (4π·D_P·τ/T)^(-1/2) · τ⁻¹ · exp(-(1 - τ/T)² / (4·D_P·τ/T))
//! ```
//!
//! This is an inverse Gaussian with mean `T`. There is no cancellation-free
//! closed-form CDF for small `D_P`, so bin masses are integrated with
//! composite Simpson quadrature. The number of sub-intervals per bin follows
//! the width of the distribution's peak.

use std::f64::consts::PI;

use crate::domain::{ParamSet, ParamSpec};
use crate::error::{ModelError, ModelResult};
use crate::math::simpson;
use crate::units::{TransitAxis, TransitResponse, UnitModel, density_from_masses, require, require_mtt};

const PARAMS: [ParamSpec; 2] = [
    ParamSpec {
        key: "mtt",
        label: "Mean transit time [a]",
        default: 10.0,
        lower_bound: 0.1,
        upper_bound: 500.0,
        fixed: false,
    },
    ParamSpec {
        key: "dp",
        label: "Dispersion parameter D_P [-]",
        default: 0.1,
        lower_bound: 0.001,
        upper_bound: 5.0,
        fixed: false,
    },
];

/// Sub-intervals per peak width.
const SAMPLES_PER_WIDTH: f64 = 8.0;
const MIN_SUBINTERVALS: usize = 16;
const MAX_SUBINTERVALS: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct Dispersion;

impl Dispersion {
    fn density(tau: f64, mtt: f64, dp: f64) -> f64 {
        if tau <= 0.0 {
            return 0.0;
        }
        let x = tau / mtt;
        let spread = 4.0 * dp * x;
        let exponent = -(1.0 - x).powi(2) / spread;
        exponent.exp() / (tau * (PI * spread).sqrt())
    }

    /// Narrowest feature of the distribution: min(standard deviation, mode).
    fn peak_width(mtt: f64, dp: f64) -> f64 {
        let sd = mtt * (2.0 * dp).sqrt();
        let mode = mtt / ((1.0 + 9.0 * dp * dp).sqrt() + 3.0 * dp);
        sd.min(mode)
    }
}

impl UnitModel for Dispersion {
    fn name(&self) -> &'static str {
        "DM"
    }

    fn prefix(&self) -> &'static str {
        "dm"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &PARAMS
    }

    fn weights(&self, axis: &TransitAxis, params: &ParamSet) -> ModelResult<TransitResponse> {
        let unit = self.prefix();
        let mtt = require_mtt(unit, params)?;
        let dp = require(unit, params, "dp")?;
        if dp <= 0.0 {
            return Err(ModelError::domain(unit, "dp", format!("must be > 0, got {dp}")));
        }

        let per_bin = (SAMPLES_PER_WIDTH * axis.step() / Self::peak_width(mtt, dp)).ceil();
        let intervals = if per_bin.is_finite() {
            (per_bin as usize).clamp(MIN_SUBINTERVALS, MAX_SUBINTERVALS)
        } else {
            MAX_SUBINTERVALS
        };

        Ok(density_from_masses(
            axis,
            (0..axis.len()).map(|k| {
                let (lo, hi) = axis.bin(k);
                simpson(|tau| Self::density(tau, mtt, dp), lo, hi, intervals)
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn density(axis: &TransitAxis, mtt: f64, dp: f64) -> Vec<f64> {
        let params = Dispersion
            .default_params()
            .with_value("mtt", mtt)
            .with_value("dp", dp);
        match Dispersion.weights(axis, &params).unwrap() {
            TransitResponse::Density(w) => w,
            TransitResponse::Delay(_) => panic!("DM must return a density"),
        }
    }

    #[test]
    fn mean_matches_the_mean_transit_time() {
        let axis = TransitAxis::uniform(1.0 / 12.0, 12 * 300).unwrap();
        let w = density(&axis, 15.0, 0.2);
        let mean: f64 = (0..axis.len()).map(|k| w[k] * axis.midpoint(k)).sum::<f64>() * axis.step();
        assert!((mean - 15.0).abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn small_dispersion_peaks_near_the_mean() {
        let axis = TransitAxis::uniform(1.0 / 12.0, 12 * 40).unwrap();
        let w = density(&axis, 10.0, 0.005);
        let (argmax, _) = w
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (k, &v)| if v > acc.1 { (k, v) } else { acc });
        let peak = axis.midpoint(argmax);
        assert!((peak - 10.0).abs() < 0.5, "peak at {peak}");
    }

    #[test]
    fn non_positive_dispersion_is_rejected() {
        let axis = TransitAxis::uniform(1.0, 10).unwrap();
        let params = Dispersion.default_params().with_value("dp", 0.0);
        let err = Dispersion.weights(&axis, &params).unwrap_err();
        assert!(matches!(err, ModelError::ParameterDomain { ref key, .. } if key == "dp"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn discrete_weights_integrate_to_one(mtt in 0.5f64..50.0, dp in 0.01f64..2.0) {
            let axis = TransitAxis::uniform(1.0 / 12.0, 12 * 3000).unwrap();
            let w = density(&axis, mtt, dp);
            prop_assert!(w.iter().all(|&v| v >= 0.0));
            let total: f64 = w.iter().sum::<f64>() * axis.step();
            prop_assert!((total - 1.0).abs() < 1e-3, "total {}", total);
        }
    }
}
