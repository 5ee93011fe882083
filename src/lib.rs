//! `isosim` library crate.
//!
//! Lumped-parameter transit-time modeling of environmental tracers in
//! groundwater. The binary (`isosim`) is a thin wrapper around this library so
//! that:
//!
//! - core logic is testable without spawning processes
//! - the modeling kernel (`units`, `models`, `fit`) has no I/O dependencies
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod units;
