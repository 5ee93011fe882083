//! Forward modeling: mixing, convolution and the composed model.

pub mod convolution;
pub mod harp;
pub mod mixer;
pub mod model;

pub use convolution::{ConvolutionEngine, Simulation};
pub use harp::{DEFAULT_DILUTIONS, HarpPoint, Sweep, dilution_lines, tracer_tracer};
pub use mixer::{Component, DelayTerm, FRACTION_TOLERANCE, Mixer, MixedResponse, validate_composition};
pub use model::Model;
