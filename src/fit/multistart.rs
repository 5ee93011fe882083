//! Multi-start calibration.
//!
//! Start 0 is the caller's parameter vector. Further starts draw every free
//! parameter uniformly inside its bounds from a seeded `StdRng`, so runs are
//! reproducible. Starts are fitted in parallel and the lowest residual norm
//! wins (ties go to the lower start index).

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::{ParamSet, TimeSeries};
use crate::error::{ModelError, ModelResult};
use crate::fit::params::FreeVector;
use crate::fit::solver::{FitReport, Solver};
use crate::models::Model;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiStartOptions {
    /// Total number of starts, including the caller's own vector.
    pub starts: usize,
    pub seed: u64,
}

impl Default for MultiStartOptions {
    fn default() -> Self {
        Self { starts: 1, seed: 42 }
    }
}

#[derive(Debug, Clone)]
pub struct MultiStartReport {
    pub best: FitReport,
    /// Index of the winning start (0 = caller's vector).
    pub best_start: usize,
    /// `(start index, residual norm)` for every start that produced a report.
    pub attempts: Vec<(usize, f64)>,
}

/// Starting parameter sets: the caller's first, then random draws.
pub fn start_points(free: &FreeVector, params: &[ParamSet], x0: &[f64], opts: MultiStartOptions) -> Vec<Vec<ParamSet>> {
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut starts = Vec::with_capacity(opts.starts.max(1));
    starts.push(free.scatter(params, x0));
    for _ in 1..opts.starts {
        let x: Vec<f64> = free
            .slots()
            .iter()
            .map(|s| {
                if s.width() > 0.0 {
                    rng.gen_range(s.lower..=s.upper)
                } else {
                    s.lower
                }
            })
            .collect();
        starts.push(free.scatter(params, &x));
    }
    starts
}

/// Run `solver` from several starts and keep the best report.
///
/// Errors from the caller's own start propagate; a failing random start is
/// skipped.
pub fn fit_multistart(
    solver: &Solver,
    model: &Model,
    params: &[ParamSet],
    target: &TimeSeries,
    opts: MultiStartOptions,
) -> ModelResult<MultiStartReport> {
    let (free, x0) = FreeVector::assemble(model.components(), params)?;
    let starts = if free.is_empty() {
        vec![params.to_vec()]
    } else {
        start_points(&free, params, &x0, opts)
    };

    let results: Vec<(usize, ModelResult<FitReport>)> = starts
        .par_iter()
        .enumerate()
        .map(|(i, start)| (i, solver.fit(model, start, target)))
        .collect();

    let mut best: Option<(usize, FitReport)> = None;
    let mut attempts = Vec::with_capacity(results.len());
    for (i, result) in results {
        let report = match result {
            Ok(report) => report,
            Err(err) if i == 0 => return Err(err),
            Err(err) => {
                debug!(start = i, error = %err, "random start skipped");
                continue;
            }
        };
        attempts.push((i, report.residual_norm));
        let better = match &best {
            None => true,
            Some((_, b)) => report.residual_norm < b.residual_norm,
        };
        if better {
            best = Some((i, report));
        }
    }

    // Start 0 either returned a report or its error propagated above.
    let Some((best_start, best)) = best else {
        return Err(ModelError::InvalidStart(
            "no start produced a fit".to_string(),
        ));
    };

    info!(
        starts = attempts.len(),
        best_start,
        residual_norm = best.residual_norm,
        "multi-start calibration finished"
    );

    Ok(MultiStartReport {
        best,
        best_start,
        attempts,
    })
}
