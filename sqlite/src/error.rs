//! Error types for the SQLite backend.

use schema_ledger_engine::LedgerError;
use thiserror::Error;

/// Errors raised by the SQLite client.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A value could not be mapped between SQLite and the engine.
    #[error("conversion error: {0}")]
    ConversionError(String),
}

impl From<SqliteError> for LedgerError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::ConversionError(msg) => LedgerError::ConversionError(msg),
            other => LedgerError::client(other),
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
