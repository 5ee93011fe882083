//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads sessions and series
//! - runs simulations, calibrations and harp sweeps
//! - prints reports
//! - writes optional exports and session updates

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, FitArgs, HarpArgs, InitArgs, SimulateArgs, SynthArgs};
use crate::data::{SyntheticOptions, bomb_pulse_input, synthetic_observations};
use crate::domain::Session;
use crate::error::AppError;
use crate::fit::{MultiStartOptions, SolverOptions};
use crate::io::{load_series_csv, write_harp_csv, write_series_csv, write_session_json, write_simulation_csv};
use crate::models::{DEFAULT_DILUTIONS, Model, Sweep, dilution_lines, tracer_tracer};
use crate::units::Registry;

pub mod pipeline;

/// Entry point for the `isosim` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let registry = Registry::builtin();
    match cli.command {
        Command::Units => {
            print!("{}", crate::report::format_units(&registry));
            Ok(())
        }
        Command::Init(args) => handle_init(&registry, args),
        Command::Simulate(args) => handle_simulate(&registry, args),
        Command::Fit(args) => handle_fit(&registry, args),
        Command::Synth(args) => handle_synth(&registry, args),
        Command::Harp(args) => handle_harp(&registry, args),
    }
}

/// Log to stderr; `RUST_LOG` wins over the `-v` count.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_init(registry: &Registry, args: InitArgs) -> Result<(), AppError> {
    let mut session = Session::template(registry, args.tracer, !args.yearly, &args.units)?;
    session.half_life = args.half_life;
    session.steady_state_input = args.steady_state;
    session.n_warmup_half_lives = args.warmup_half_lives;
    session.min_warmup_span = args.min_warmup_span;
    session.decay().validate()?;
    session.warmup().required_span(&session.decay())?;

    let sampling = session.sampling();
    if let Some(path) = &args.input {
        session.input_series = Some(load_series_csv(path, sampling)?.series);
    } else if let Some(range) = &args.bomb_pulse {
        let (start, end) = match range.as_slice() {
            [start, end] => (*start, *end),
            _ => return Err(AppError::new(2, "--bomb-pulse takes START and END.")),
        };
        session.input_series = Some(bomb_pulse_input(start, end, sampling)?);
    }
    if let Some(path) = &args.target {
        session.target_series = Some(load_series_csv(path, sampling)?.series);
    }

    // Validate what we can now rather than at the first simulation.
    if let Some(input) = &session.input_series {
        input.check_uniform(sampling)?;
        input.check_finite()?;
    }

    write_session_json(&args.output, &session)?;
    info!(path = %args.output.display(), units = ?session.selected_units, "session written");
    println!(
        "Wrote {} ({} | {} | units: {})",
        args.output.display(),
        session.tracer.display_name(),
        sampling.label(),
        session.selected_units.join(", ")
    );
    Ok(())
}

fn handle_simulate(registry: &Registry, args: SimulateArgs) -> Result<(), AppError> {
    let mut loaded = pipeline::load_session(&args.session.session, registry)?;
    let out = pipeline::run_simulation(&loaded)?;

    let setup = &loaded.setup;
    println!("{}", crate::report::format_params(setup.model.components(), &setup.params));
    println!("{}", crate::report::format_simulation(&out.simulation));

    if let Some(path) = &args.session.export {
        write_simulation_csv(path, &out.rows)?;
    }
    if args.session.save {
        loaded.session.record_simulation(&out.simulation);
        write_session_json(&args.session.session, &loaded.session)?;
    }
    Ok(())
}

fn handle_fit(registry: &Registry, args: FitArgs) -> Result<(), AppError> {
    if args.starts == 0 {
        return Err(AppError::new(2, "--starts must be >= 1."));
    }
    let mut loaded = pipeline::load_session(&args.session.session, registry)?;
    let solver_options = SolverOptions {
        max_iterations: args.max_iter,
        ..SolverOptions::default()
    };
    let starts = MultiStartOptions {
        starts: args.starts,
        seed: args.seed,
    };
    let out = pipeline::run_fit(&loaded, solver_options, starts)?;

    let best = &out.report.best;
    let multi = (args.starts > 1).then_some(&out.report);
    println!(
        "{}",
        crate::report::format_fit_summary(loaded.setup.model.components(), best, multi)
    );

    if let Some(path) = &args.session.export {
        write_simulation_csv(path, &out.rows)?;
    }
    if args.session.save {
        loaded.session.apply_params(loaded.setup.model.components(), &best.params);
        loaded.session.record_simulation(&best.simulation);
        write_session_json(&args.session.session, &loaded.session)?;
    }
    Ok(())
}

fn handle_synth(registry: &Registry, args: SynthArgs) -> Result<(), AppError> {
    let mut loaded = pipeline::load_session(&args.session, registry)?;
    let opts = SyntheticOptions {
        every: args.every,
        from: args.from,
        noise_sd: args.noise,
        seed: args.seed,
    };
    let observations = synthetic_observations(&loaded.setup.model, &loaded.setup.params, opts)?;
    println!("Generated {} synthetic observations.", observations.len());

    match &args.output {
        Some(path) => write_series_csv(path, &observations)?,
        None if !args.save => {
            for (t, v) in observations.iter() {
                println!("{t},{v}");
            }
        }
        None => {}
    }
    if args.save {
        loaded.session.target_series = Some(observations);
        write_session_json(&args.session, &loaded.session)?;
    }
    Ok(())
}

fn handle_harp(registry: &Registry, args: HarpArgs) -> Result<(), AppError> {
    let first = pipeline::load_session(&args.first, registry)?;
    let second = pipeline::load_session(&args.second, registry)?;

    let values = crate::math::log_space(args.min, args.max, args.steps)?;
    let at = match args.at {
        Some(at) => at,
        None => last_common_time(&first.setup.model, &second.setup.model)?,
    };
    let sweep = Sweep {
        unit: args.unit,
        key: &args.key,
    };

    let curve = tracer_tracer(
        &first.setup.model,
        &second.setup.model,
        &first.setup.params,
        sweep,
        &values,
        at,
    )?;
    let dilutions = dilution_lines(&curve, &DEFAULT_DILUTIONS);

    println!(
        "Harp at t={at}: {} vs {}",
        first.session.tracer.display_name(),
        second.session.tracer.display_name()
    );
    println!("{}", crate::report::format_harp(&curve, &args.key));

    if let Some(path) = &args.export {
        write_harp_csv(path, &curve, &dilutions)?;
    }
    Ok(())
}

fn last_common_time(first: &Model, second: &Model) -> Result<f64, AppError> {
    let last = |m: &Model| m.input().times().last().copied();
    match (last(first), last(second)) {
        (Some(a), Some(b)) => Ok(a.min(b)),
        _ => Err(AppError::new(2, "Harp sessions need non-empty input series.")),
    }
}
