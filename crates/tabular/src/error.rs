//! Tabular decoding error types.

use thiserror::Error;

/// Tabular decoding error type.
#[derive(Debug, Error)]
pub enum TabularError {
    /// Malformed delimited text (ragged rows, invalid UTF-8, bad quoting).
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tabular operations.
pub type Result<T> = std::result::Result<T, TabularError>;
