//! Piston-flow model (PM): every parcel has the same transit time.

use crate::domain::{ParamSet, ParamSpec};
use crate::error::ModelResult;
use crate::units::{TransitAxis, TransitResponse, UnitModel, require_mtt};

const PARAMS: [ParamSpec; 1] = [ParamSpec {
    key: "mtt",
    label: "Mean transit time [a]",
    default: 10.0,
    lower_bound: 0.1,
    upper_bound: 500.0,
    fixed: false,
}];

/// Pure lag. The convolution engine applies it as an exact time shift rather
/// than a discretized Dirac mass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PistonFlow;

impl UnitModel for PistonFlow {
    fn name(&self) -> &'static str {
        "PM"
    }

    fn prefix(&self) -> &'static str {
        "pm"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &PARAMS
    }

    fn weights(&self, _axis: &TransitAxis, params: &ParamSet) -> ModelResult<TransitResponse> {
        let mtt = require_mtt(self.prefix(), params)?;
        Ok(TransitResponse::Delay(mtt))
    }
}
