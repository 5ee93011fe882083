//! Command-line parsing for the tracer transit-time modeler.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::Tracer;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "isosim", version, about = "Lumped-parameter groundwater transit-time modeling")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the registered unit types and their parameter schemas.
    Units,
    /// Write a session template for the selected units with registry defaults.
    Init(InitArgs),
    /// Run the forward model with the session's current parameters.
    Simulate(SimulateArgs),
    /// Calibrate the free parameters against the session's target series.
    Fit(FitArgs),
    /// Generate synthetic observations from the session's current parameters.
    Synth(SynthArgs),
    /// Tracer–tracer (harp) curve from two sessions sharing one composition.
    Harp(HarpArgs),
}

#[derive(Debug, Args, Clone)]
pub struct InitArgs {
    /// Output session JSON.
    #[arg(short, long, value_name = "JSON")]
    pub output: PathBuf,

    /// Unit types to select (registry names), in composition order.
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub units: Vec<String>,

    #[arg(short, long, value_enum, default_value_t = Tracer::Tritium)]
    pub tracer: Tracer,

    /// Override the tracer half-life (years).
    #[arg(long)]
    pub half_life: Option<f64>,

    /// Yearly instead of monthly sampling.
    #[arg(long)]
    pub yearly: bool,

    /// Input (recharge) concentration CSV.
    #[arg(long, value_name = "CSV")]
    pub input: Option<PathBuf>,

    /// Use the built-in bomb-pulse tritium record from START to END instead of `--input`.
    #[arg(long, num_args = 2, value_names = ["START", "END"], conflicts_with = "input")]
    pub bomb_pulse: Option<Vec<f64>>,

    /// Observed (target) concentration CSV.
    #[arg(long, value_name = "CSV")]
    pub target: Option<PathBuf>,

    /// Concentration assumed before the first input sample.
    #[arg(long, default_value_t = 0.0)]
    pub steady_state: f64,

    /// Warmup length as a multiple of the tracer half-life.
    #[arg(long, default_value_t = 2.0)]
    pub warmup_half_lives: f64,

    /// Minimum warmup span in years (the only criterion for stable tracers).
    #[arg(long, default_value_t = 0.0)]
    pub min_warmup_span: f64,
}

/// Session file shared by the model-running commands.
#[derive(Debug, Args, Clone)]
pub struct SessionArgs {
    /// Session JSON.
    #[arg(short, long, value_name = "JSON")]
    pub session: PathBuf,

    /// Write results (parameters, simulation) back into the session file.
    #[arg(long)]
    pub save: bool,

    /// Export `time,simulated,observed,residual` CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Number of starts (1 = the session's parameters only).
    #[arg(long, default_value_t = 1)]
    pub starts: usize,

    /// Seed for the random starts.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Iteration limit per start.
    #[arg(long, default_value_t = 200)]
    pub max_iter: usize,
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Session JSON.
    #[arg(short, long, value_name = "JSON")]
    pub session: PathBuf,

    /// Output CSV for the synthetic observations.
    #[arg(short, long, value_name = "CSV")]
    pub output: Option<PathBuf>,

    /// Store the observations as the session's target series.
    #[arg(long)]
    pub save: bool,

    /// Keep every N-th simulated sample.
    #[arg(long, default_value_t = 12)]
    pub every: usize,

    /// First sample time (decimal years).
    #[arg(long)]
    pub from: Option<f64>,

    /// Standard deviation of additive Gaussian noise.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Args, Clone)]
pub struct HarpArgs {
    /// Session for the first tracer (its parameters are swept).
    #[arg(long, value_name = "JSON")]
    pub first: PathBuf,

    /// Session for the second tracer (same units and fractions).
    #[arg(long, value_name = "JSON")]
    pub second: PathBuf,

    /// Sample time (decimal years); defaults to the last common input time.
    #[arg(long)]
    pub at: Option<f64>,

    /// Index of the unit whose parameter is swept.
    #[arg(long, default_value_t = 0)]
    pub unit: usize,

    /// Parameter key to sweep.
    #[arg(long, default_value = "mtt")]
    pub key: String,

    /// Smallest swept value.
    #[arg(long, default_value_t = 1.0)]
    pub min: f64,

    /// Largest swept value.
    #[arg(long, default_value_t = 500.0)]
    pub max: f64,

    /// Number of log-spaced values.
    #[arg(long, default_value_t = 25)]
    pub steps: usize,

    /// Export `dilution,value,first,second` CSV (with 25/50/75 % dilution lines).
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}
