//! Error types for the wc-rfm-export library.
//!
//! This module provides custom error types using `thiserror` so every pipeline
//! stage reports a specific, matchable error kind instead of a stringly-typed
//! failure.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the wc-rfm-export application.
#[derive(Error, Debug)]
pub enum RfmError {
    /// Staging store (SQLite) errors
    #[error("Staging store error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A dump file or output artifact does not exist
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// Malformed dump statement or unrecognized dump structure
    #[error("Parse error: {0}")]
    Parse(String),

    /// A specific dump statement failed to execute (non-fatal, aggregated)
    #[error("Import error on {table}: {message}")]
    Import {
        /// Target table of the failed statement
        table: String,
        /// Underlying failure description
        message: String,
    },

    /// Threshold or segment-rule table missing required sheets or columns
    #[error("Config error: {0}")]
    Config(String),

    /// An output folder lacks required files or columns for re-use
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O failure during chunked export
    #[error("Export error: {0}")]
    Export(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid date input (Shamsi cutoff)
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Workbook read/write errors
    #[error("Workbook error: {0}")]
    Xlsx(String),
}

/// Convenience type alias for Result with `RfmError`
pub type Result<T> = std::result::Result<T, RfmError>;

impl From<rust_xlsxwriter::XlsxError> for RfmError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        RfmError::Xlsx(err.to_string())
    }
}

impl From<calamine::XlsxError> for RfmError {
    fn from(err: calamine::XlsxError) -> Self {
        RfmError::Xlsx(err.to_string())
    }
}
