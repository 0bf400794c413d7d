//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to a SQL backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An I/O error occurred while opening a database file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A row did not contain the requested column.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// A column held a value of an unexpected type.
    #[error("column {column} has unexpected type: expected {expected}")]
    Conversion {
        /// The column name.
        column: String,
        /// The expected SQL type.
        expected: &'static str,
    },

    /// The statement could not be executed as written.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl StorageError {
    /// Creates a conversion error for the given column.
    pub fn conversion(column: impl Into<String>, expected: &'static str) -> Self {
        Self::Conversion {
            column: column.into(),
            expected,
        }
    }
}
