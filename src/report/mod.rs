//! Reporting utilities: simulated vs observed rows and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::TimeSeries;
use crate::error::AppError;
use crate::io::SimulationRow;
use crate::models::{Model, Simulation};

/// Pair every simulated sample with the observation at the same time (if any).
pub fn simulation_rows(
    model: &Model,
    simulation: &Simulation,
    target: Option<&TimeSeries>,
) -> Result<Vec<SimulationRow>, AppError> {
    let mut rows: Vec<SimulationRow> = simulation
        .series
        .iter()
        .map(|(time, simulated)| SimulationRow {
            time,
            simulated,
            observed: None,
        })
        .collect();

    if let Some(target) = target {
        let (times, values): (Vec<f64>, Vec<f64>) = target.observed().unzip();
        for (idx, obs) in model.sample_indices(&times)?.into_iter().zip(values) {
            rows[idx].observed = Some(obs);
        }
    }

    if rows.iter().any(|r| !r.simulated.is_finite()) {
        return Err(AppError::new(4, "Non-finite model prediction in simulated series."));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{Decay, Sampling, WarmupSpec};
    use crate::models::{Component, ConvolutionEngine};
    use crate::units::{PistonFlow, UnitModel};

    #[test]
    fn observations_land_on_matching_rows() {
        let engine = ConvolutionEngine {
            sampling: Sampling::Yearly,
            decay: Decay::stable(),
            steady_state_input: 2.0,
            warmup: WarmupSpec::default(),
        };
        let input = TimeSeries::regular(2000.0, 1.0, vec![2.0; 5]).unwrap();
        let model = Model::new(vec![Component::new(Arc::new(PistonFlow), 1.0)], input, engine).unwrap();
        let params = vec![PistonFlow.default_params().with_value("mtt", 1.0)];
        let sim = model.evaluate(&params).unwrap();
        let target = TimeSeries::new(vec![2001.0, 2003.0, 2004.0], vec![1.5, f64::NAN, 2.5]).unwrap();

        let rows = simulation_rows(&model, &sim, Some(&target)).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[1].observed, Some(1.5));
        assert_eq!(rows[1].residual(), Some(0.5));
        assert_eq!(rows[3].observed, None);
        assert_eq!(rows[4].residual(), Some(-0.5));

        let off_grid = TimeSeries::new(vec![2001.5], vec![1.0]).unwrap();
        assert_eq!(simulation_rows(&model, &sim, Some(&off_grid)).unwrap_err().exit_code(), 2);
    }
}
