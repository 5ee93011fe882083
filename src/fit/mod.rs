//! Calibration of model parameters against observed tracer concentrations.
//!
//! Responsibilities:
//!
//! - map per-unit parameter sets to a bounded free vector
//! - run bounded Levenberg–Marquardt from one start
//! - run several starts in parallel and keep the best

pub mod multistart;
pub mod params;
pub mod solver;

pub use multistart::*;
pub use params::*;
pub use solver::*;
