//! Bounded Levenberg–Marquardt calibration.
//!
//! The solver adjusts every non-fixed parameter within its bounds to minimize
//! `Σ (predicted − observed)²` over the usable observations:
//!
//! - Marquardt scaling: the damping term uses `D = diag(JᵀJ)^½`, floored and
//!   never allowed to shrink between iterations.
//! - Projection: every trial point is clamped into the box, so the model is
//!   never evaluated outside the bounds.
//! - Jacobian: forward differences, switching to backward differences when the
//!   forward probe would leave the box.
//!
//! Non-convergence is not an error: the best point found is returned with
//! `FitStatus::Failed(..)`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{ParamSet, TimeSeries};
use crate::error::{ModelError, ModelResult};
use crate::fit::params::FreeVector;
use crate::math::{damped_step, normal_pseudo_inverse};
use crate::models::{Model, Simulation};

/// Tuning knobs for the Levenberg–Marquardt loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub max_iterations: usize,
    /// Stop when an accepted step lowers the cost by less than this fraction.
    pub ftol: f64,
    /// Stop when the projected step is this small relative to the parameters.
    pub xtol: f64,
    /// Stop when the projected gradient is this orthogonal to the residuals.
    pub gtol: f64,
    pub initial_lambda: f64,
    /// Damping beyond this means no descent direction can be found.
    pub max_lambda: f64,
    /// Relative finite-difference step for the Jacobian.
    pub diff_step: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-12,
            xtol: 1e-10,
            gtol: 1e-12,
            initial_lambda: 1e-3,
            max_lambda: 1e16,
            diff_step: 1.5e-8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    IterationLimit,
    Cancelled,
    /// Damping exhausted without finding a lower cost.
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    Failed(FailureKind),
}

impl FitStatus {
    pub fn is_converged(self) -> bool {
        matches!(self, FitStatus::Converged)
    }

    pub fn label(self) -> &'static str {
        match self {
            FitStatus::Converged => "converged",
            FitStatus::Failed(FailureKind::IterationLimit) => "iteration limit reached",
            FitStatus::Failed(FailureKind::Cancelled) => "cancelled",
            FitStatus::Failed(FailureKind::Stalled) => "stalled",
        }
    }
}

/// Observable solver state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverState {
    Running { iteration: usize, residual_norm: f64 },
    Done(FitStatus),
}

/// Progress hook polled once per iteration.
pub trait FitMonitor: Send + Sync {
    fn should_cancel(&self) -> bool {
        false
    }

    fn on_state(&self, _state: &SolverState) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoMonitor;

impl FitMonitor for NoMonitor {}

/// Cancellation token shared with another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(pub Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl FitMonitor for CancelFlag {
    fn should_cancel(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamUncertainty {
    pub prefix: String,
    pub key: String,
    pub std_error: f64,
}

/// Outcome of one calibration run.
#[derive(Debug, Clone)]
pub struct FitReport {
    /// Full parameter sets (fixed descriptors unchanged).
    pub params: Vec<ParamSet>,
    pub simulation: Simulation,
    pub status: FitStatus,
    pub iterations: usize,
    pub evaluations: usize,
    pub residual_norm: f64,
    pub sse: f64,
    pub rmse: f64,
    pub n_obs: usize,
    pub n_free: usize,
    /// Standard errors from `s²·(JᵀJ)⁺`; only when `n_obs > n_free`.
    pub uncertainty: Option<Vec<ParamUncertainty>>,
}

impl FitReport {
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }
}

/// Residual evaluation against one target series.
struct Problem<'a> {
    model: &'a Model,
    base: &'a [ParamSet],
    free: &'a FreeVector,
    indices: Vec<usize>,
    observed: Vec<f64>,
    evaluations: usize,
}

impl Problem<'_> {
    fn residuals(&mut self, x: &[f64]) -> ModelResult<(DVector<f64>, Simulation)> {
        self.evaluations += 1;
        let params = self.free.scatter(self.base, x);
        let simulation = self.model.evaluate(&params)?;
        let predicted = simulation.series.values();
        let r = DVector::from_iterator(
            self.indices.len(),
            self.indices
                .iter()
                .zip(&self.observed)
                .map(|(&i, &obs)| predicted[i] - obs),
        );
        Ok((r, simulation))
    }

    /// Finite-difference Jacobian at `x` (with residuals `r`).
    fn jacobian(&mut self, x: &[f64], r: &DVector<f64>, rel_step: f64) -> ModelResult<DMatrix<f64>> {
        let mut jac = DMatrix::<f64>::zeros(r.len(), x.len());

        let free = self.free;
        for (j, slot) in free.slots().iter().enumerate() {
            let h = rel_step * x[j].abs().max(1.0);
            let forward = x[j] + h <= slot.upper;
            let candidates = if forward { [h, -h] } else { [-h, h] };

            for step in candidates {
                let probe = x[j] + step;
                if probe < slot.lower || probe > slot.upper {
                    continue;
                }
                let mut xp = x.to_vec();
                xp[j] = probe;
                match self.residuals(&xp) {
                    Ok((rp, _)) => {
                        let col = (rp - r) / step;
                        jac.set_column(j, &col);
                        break;
                    }
                    Err(ModelError::ParameterDomain { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(jac)
    }
}

/// Bounded least-squares calibration of a [`Model`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Solver {
    pub options: SolverOptions,
}

impl Solver {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Fit without progress reporting.
    pub fn fit(&self, model: &Model, params: &[ParamSet], target: &TimeSeries) -> ModelResult<FitReport> {
        self.fit_with_monitor(model, params, target, &NoMonitor)
    }

    pub fn fit_with_monitor(
        &self,
        model: &Model,
        params: &[ParamSet],
        target: &TimeSeries,
        monitor: &dyn FitMonitor,
    ) -> ModelResult<FitReport> {
        let opts = self.options;
        let (free, x0) = FreeVector::assemble(model.components(), params)?;

        let (times, observed): (Vec<f64>, Vec<f64>) = target.observed().unzip();
        if observed.is_empty() {
            return Err(ModelError::InvalidStart(
                "target series has no usable observations".to_string(),
            ));
        }
        let indices = model.sample_indices(&times).map_err(start_error)?;

        let mut problem = Problem {
            model,
            base: params,
            free: &free,
            indices,
            observed,
            evaluations: 0,
        };

        let mut x = x0;
        let (mut r, mut simulation) = problem.residuals(&x).map_err(start_error)?;
        let mut cost = r.norm_squared();
        let n_obs = r.len();

        if !simulation.warmup.is_sufficient() {
            warn!(
                required = simulation.warmup.required_span,
                available = simulation.warmup.available_span,
                "warmup span exceeds the input record; fit may be biased"
            );
        }

        if free.is_empty() {
            debug!("all parameters fixed; returning the forward simulation");
            monitor.on_state(&SolverState::Done(FitStatus::Converged));
            return Ok(finish(
                params.to_vec(),
                simulation,
                FitStatus::Converged,
                0,
                problem.evaluations,
                cost,
                n_obs,
                &free,
                None,
            ));
        }

        let p = free.len();
        let mut jac = problem.jacobian(&x, &r, opts.diff_step)?;
        let mut scale = vec![0.0_f64; p];
        let mut lambda = opts.initial_lambda;
        let mut iterations = 0;

        let status = 'outer: loop {
            if monitor.should_cancel() {
                break FitStatus::Failed(FailureKind::Cancelled);
            }
            if cost == 0.0 {
                break FitStatus::Converged;
            }
            if iterations >= opts.max_iterations {
                break FitStatus::Failed(FailureKind::IterationLimit);
            }
            iterations += 1;

            let residual_norm = cost.sqrt();
            monitor.on_state(&SolverState::Running {
                iteration: iterations,
                residual_norm,
            });
            debug!(iteration = iterations, residual_norm, lambda, x = ?x, "lm iteration");

            if projected_gradient_cosine(&jac, &r, &x, &free) <= opts.gtol {
                break FitStatus::Converged;
            }

            for (j, s) in scale.iter_mut().enumerate() {
                let col = jac.column(j).norm();
                *s = s.max(col).max(f64::EPSILON);
            }

            loop {
                let Some(step) = damped_step(&jac, &r, lambda, &scale) else {
                    lambda *= 10.0;
                    if lambda > opts.max_lambda {
                        break 'outer FitStatus::Failed(FailureKind::Stalled);
                    }
                    continue;
                };

                let mut trial: Vec<f64> = x.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
                free.clamp(&mut trial);

                let moved = trial
                    .iter()
                    .zip(&x)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                let size = x.iter().map(|v| v * v).sum::<f64>().sqrt();
                if moved <= opts.xtol * (size + opts.xtol) {
                    break 'outer FitStatus::Converged;
                }

                match problem.residuals(&trial) {
                    Ok((r_trial, sim_trial)) if r_trial.norm_squared() < cost => {
                        let new_cost = r_trial.norm_squared();
                        let reduction = (cost - new_cost) / cost;
                        x = trial;
                        r = r_trial;
                        simulation = sim_trial;
                        cost = new_cost;
                        lambda = (lambda * 0.1).max(1e-12);
                        jac = problem.jacobian(&x, &r, opts.diff_step)?;
                        if reduction <= opts.ftol {
                            break 'outer FitStatus::Converged;
                        }
                        break;
                    }
                    Ok(_) | Err(ModelError::ParameterDomain { .. }) => {
                        lambda *= 10.0;
                        if lambda > opts.max_lambda {
                            break 'outer FitStatus::Failed(FailureKind::Stalled);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        monitor.on_state(&SolverState::Done(status));

        let uncertainty = if n_obs > p {
            let s2 = cost / (n_obs - p) as f64;
            normal_pseudo_inverse(&jac).map(|cov| {
                free.slots()
                    .iter()
                    .enumerate()
                    .map(|(j, slot)| ParamUncertainty {
                        prefix: slot.prefix.to_string(),
                        key: slot.key.clone(),
                        std_error: (s2 * cov[(j, j)]).max(0.0).sqrt(),
                    })
                    .collect()
            })
        } else {
            None
        };

        let fitted = free.scatter(params, &x);
        let evaluations = problem.evaluations;
        Ok(finish(
            fitted,
            simulation,
            status,
            iterations,
            evaluations,
            cost,
            n_obs,
            &free,
            uncertainty,
        ))
    }
}

fn start_error(err: ModelError) -> ModelError {
    match err {
        ModelError::InvalidStart(_) => err,
        other => ModelError::InvalidStart(format!("initial evaluation failed: {other}")),
    }
}

/// Largest |cos| between a feasible gradient component and the residuals.
///
/// Components pinned at a bound with the descent direction pointing out of
/// the box do not count.
fn projected_gradient_cosine(jac: &DMatrix<f64>, r: &DVector<f64>, x: &[f64], free: &FreeVector) -> f64 {
    let r_norm = r.norm();
    if r_norm == 0.0 {
        return 0.0;
    }
    let g = jac.transpose() * r;
    free.slots()
        .iter()
        .enumerate()
        .filter(|(j, slot)| {
            let at_lower = x[*j] <= slot.lower && g[*j] > 0.0;
            let at_upper = x[*j] >= slot.upper && g[*j] < 0.0;
            !(at_lower || at_upper)
        })
        .map(|(j, _)| {
            let col = jac.column(j).norm();
            if col == 0.0 { 0.0 } else { g[j].abs() / (col * r_norm) }
        })
        .fold(0.0, f64::max)
}

#[allow(clippy::too_many_arguments)]
fn finish(
    params: Vec<ParamSet>,
    simulation: Simulation,
    status: FitStatus,
    iterations: usize,
    evaluations: usize,
    sse: f64,
    n_obs: usize,
    free: &FreeVector,
    uncertainty: Option<Vec<ParamUncertainty>>,
) -> FitReport {
    let residual_norm = sse.sqrt();
    let rmse = (sse / n_obs as f64).sqrt();

    if status.is_converged() {
        info!(iterations, evaluations, residual_norm, rmse, "fit converged");
    } else {
        warn!(
            iterations,
            evaluations,
            residual_norm,
            status = status.label(),
            "fit did not converge; returning best parameters"
        );
    }

    FitReport {
        params,
        simulation,
        status,
        iterations,
        evaluations,
        residual_norm,
        sse,
        rmse,
        n_obs,
        n_free: free.len(),
        uncertainty,
    }
}
