//! Numerical utilities: least squares, quadrature and grids.

pub mod grid;
pub mod ols;
pub mod quadrature;

pub use grid::*;
pub use ols::*;
pub use quadrature::*;
