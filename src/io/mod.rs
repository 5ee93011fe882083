//! Input/output helpers.
//!
//! - series CSV ingest + validation (`ingest`)
//! - simulation, series and harp CSV exports (`export`)
//! - session JSON read/write (`session`)

pub mod export;
pub mod ingest;
pub mod session;

pub use export::*;
pub use ingest::*;
pub use session::*;
