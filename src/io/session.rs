//! Read/write session JSON files.
//!
//! The session file is the portable run state: tracer, series, selected units,
//! fractions, parameter entries and the last simulation. The schema is
//! defined by `domain::Session`.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::domain::Session;
use crate::error::AppError;

/// Write a session JSON file (pretty-printed).
pub fn write_session_json(path: &Path, session: &Session) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create session JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(BufWriter::new(file), session)
        .map_err(|e| AppError::new(2, format!("Failed to write session JSON: {e}")))?;

    Ok(())
}

/// Read a session JSON file.
pub fn read_session_json(path: &Path) -> Result<Session, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open session JSON '{}': {e}", path.display())))?;
    let session: Session = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid session JSON '{}': {e}", path.display())))?;
    Ok(session)
}
