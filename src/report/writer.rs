//! Report persistence.

use std::path::Path;
use thiserror::Error;

use super::models::Report;
use crate::history::write_atomic;

/// Report error types.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write the report as pretty-printed JSON, replacing any previous one.
pub fn write_report(path: &Path, report: &Report) -> Result<(), ReportError> {
    let data = serde_json::to_vec_pretty(report)?;
    write_atomic(path, &data)?;
    Ok(())
}
