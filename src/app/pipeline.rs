//! Shared session workflow used by the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core flow:
//! session JSON -> model setup -> simulate / calibrate -> export rows
//!
//! The command handlers can then focus on presentation and persistence.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::{ModelSetup, Session, WarmupReport};
use crate::error::AppError;
use crate::fit::{MultiStartOptions, MultiStartReport, Solver, SolverOptions, fit_multistart};
use crate::io::{SimulationRow, read_session_json};
use crate::models::Simulation;
use crate::units::Registry;

/// Session loaded from disk together with the model it describes.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub session: Session,
    pub setup: ModelSetup,
}

/// Outputs of a forward run.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub simulation: Simulation,
    pub rows: Vec<SimulationRow>,
}

/// Outputs of a calibration run.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub report: MultiStartReport,
    pub rows: Vec<SimulationRow>,
}

/// Read a session file and build its model.
pub fn load_session(path: &Path, registry: &Registry) -> Result<LoadedSession, AppError> {
    let session = read_session_json(path)?;
    let setup = session.build(registry)?;
    info!(
        path = %path.display(),
        units = ?session.selected_units,
        tracer = session.tracer.display_name(),
        sampling = %session.sampling().label(),
        "session loaded"
    );
    Ok(LoadedSession { session, setup })
}

/// Forward simulation with the session's current parameters.
pub fn run_simulation(loaded: &LoadedSession) -> Result<SimulationOutput, AppError> {
    let model = &loaded.setup.model;
    let simulation = model.evaluate(&loaded.setup.params)?;
    warn_on_short_warmup(&simulation.warmup);
    let rows = crate::report::simulation_rows(model, &simulation, loaded.session.target_series.as_ref())?;
    Ok(SimulationOutput { simulation, rows })
}

/// Calibrate the free parameters against the session's target series.
pub fn run_fit(
    loaded: &LoadedSession,
    solver_options: SolverOptions,
    starts: MultiStartOptions,
) -> Result<FitOutput, AppError> {
    let model = &loaded.setup.model;
    let target = loaded.session.target()?;
    let solver = Solver::new(solver_options);

    let report = fit_multistart(&solver, model, &loaded.setup.params, target, starts)?;
    warn_on_short_warmup(&report.best.simulation.warmup);
    let rows = crate::report::simulation_rows(model, &report.best.simulation, Some(target))?;
    Ok(FitOutput { report, rows })
}

fn warn_on_short_warmup(warmup: &WarmupReport) {
    if !warmup.is_sufficient() {
        warn!(
            required_span = warmup.required_span,
            available_span = warmup.available_span,
            truncated_mass = warmup.truncated_mass,
            "input record is shorter than the warmup span; early outputs are biased low"
        );
    }
}
