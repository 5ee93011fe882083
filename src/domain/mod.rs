//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parameter schema and descriptors (`ParamSpec`, `ParamDescriptor`, `ParamSet`)
//! - sampling, tracer decay and warmup settings
//! - time series (`TimeSeries`) and the warmup diagnostic
//! - the caller-facing session contract (`Session`)

pub mod session;
pub mod types;

pub use session::*;
pub use types::*;
