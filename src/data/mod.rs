//! Built-in tracer records and synthetic observations.

pub mod synthetic;

pub use synthetic::*;
