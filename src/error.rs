use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool reads, reconciles, or emits tooling data.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors reported by the SQLite storage layer.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Raised when a workbook is missing a required sheet or is otherwise
    /// not shaped like an exported tooling workbook.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the hidden verification sheet is absent or carries the
    /// wrong key.
    #[error("workbook verification failed: {0}")]
    VerificationFailed(String),

    /// Raised when the data sheet header row does not match the template.
    #[error("header mismatch in sheet '{sheet}':\n{details}")]
    HeaderMismatch { sheet: String, details: String },

    /// Raised when a workbook exported for one supplier is imported for another.
    #[error("workbook belongs to supplier '{found}', not '{expected}'")]
    SupplierMismatch { expected: String, found: String },

    /// Raised when a record is missing a required field.
    #[error("invalid tooling record: {0}")]
    InvalidRecord(String),

    /// Raised when a tooling record cannot be found.
    #[error("tooling {0} not found")]
    NotFound(u64),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the settings file cannot be interpreted.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl ToolError {
    /// Returns true for errors that abort an import before any row is touched.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidWorkbook(_)
                | ToolError::VerificationFailed(_)
                | ToolError::HeaderMismatch { .. }
                | ToolError::SupplierMismatch { .. }
        )
    }
}
