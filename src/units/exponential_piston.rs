//! Exponential-piston-flow model (EPM).
//!
//! Water first travels as a piston for `T·η`, then mixes exponentially with
//! mean residence `T·(1−η)`:
//!
//! ```text
//! F(τ) = 0                               τ < T·η
//! F(τ) = 1 - exp(-(τ - T·η) / (T·(1-η)))  τ ≥ T·η
//! ```
//!
//! `η = 0` is the pure exponential model; `η → 1` approaches piston flow.
//! Bin masses are taken from the analytic CDF, so the discretization is exact
//! for any grid.

use crate::domain::{ParamSet, ParamSpec};
use crate::error::{ModelError, ModelResult};
use crate::math::one_minus_exp_neg;
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
        key: "eta",
        label: "Piston fraction η [-]",
        default: 0.5,
        lower_bound: 0.0,
        upper_bound: 0.99,
        fixed: false,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialPiston;

impl ExponentialPiston {
    /// Mass of `[lo, hi)` for piston delay `delay` and exponential mean `mean`.
    fn bin_mass(lo: f64, hi: f64, delay: f64, mean: f64) -> f64 {
        if hi <= delay {
            return 0.0;
        }
        let start = lo.max(delay);
        (-(start - delay) / mean).exp() * one_minus_exp_neg((hi - start) / mean)
    }
}

impl UnitModel for ExponentialPiston {
    fn name(&self) -> &'static str {
        "EPM"
    }

    fn prefix(&self) -> &'static str {
        "epm"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &PARAMS
    }

    fn weights(&self, axis: &TransitAxis, params: &ParamSet) -> ModelResult<TransitResponse> {
        let unit = self.prefix();
        let mtt = require_mtt(unit, params)?;
        let eta = require(unit, params, "eta")?;
        if !(0.0..1.0).contains(&eta) {
            return Err(ModelError::domain(
                unit,
                "eta",
                format!("must be in [0, 1), got {eta}"),
            ));
        }

        let delay = mtt * eta;
        let mean = mtt * (1.0 - eta);
        Ok(density_from_masses(
            axis,
            (0..axis.len()).map(|k| {
                let (lo, hi) = axis.bin(k);
                Self::bin_mass(lo, hi, delay, mean)
            }),
        ))
    }
}
