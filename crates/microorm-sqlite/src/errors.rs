//! Error handling for microorm-sqlite
//!
//! Driver failures become `ExError` values with kind `Persistence`; the core
//! carries them through `OrmError::Persistence` unchanged.

use microorm_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create an error for a cell the mapper cannot represent
pub fn unreadable_column(column: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Conversion)
        .with_op("sqlite_read")
        .with_message(format!("Cannot read column {}: {}", column, reason))
}

/// Create an error for a dialect the configuration does not name
pub fn wrong_dialect(dialect: &str) -> ExError {
    ExError::new(ExErrorKind::Configuration)
        .with_op("session_factory")
        .with_message(format!("Configuration names dialect '{}', expected 'sqlite'", dialect))
}
