//! Error types for schema reconciliation.
//!
//! One error type covers configuration, precondition, execution and
//! tracking-integrity failures. The builder decides which of them abort a
//! run: only [`LedgerError::IntegrityError`] escapes
//! [`SchemaBuilder::build`](crate::SchemaBuilder::build).

use schema_ledger_core::ModelError;
use thiserror::Error;

/// Errors that can occur while reconciling a database schema.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Invalid or incomplete build configuration.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// No dialect is registered for the configured provider.
    #[error("no dialect registered for provider '{0}'")]
    UnknownProvider(String),

    /// Two tables with the same name were registered for one build.
    #[error("table registered twice: {0}")]
    DuplicateTable(String),

    /// The database is not in a state the build can start from.
    #[error("precondition failed: {0}")]
    PreconditionError(String),

    /// Data left by a table update breaks a constraint.
    #[error("constraint check failed: {0}")]
    ConstraintError(String),

    /// A value read back from the database has an unexpected shape.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// The tracking tables contradict themselves or a write just made.
    #[error("tracking integrity error: {0}")]
    IntegrityError(String),

    /// Failure reported by the database client.
    #[error("database error: {0}")]
    ClientError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Schema file could not be loaded.
    #[error("schema file error: {0}")]
    ModelError(#[from] ModelError),
}

impl LedgerError {
    /// Wraps a client-specific error.
    pub fn client(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        LedgerError::ClientError(Box::new(err))
    }

    /// Returns `true` for errors that mean the tracking tables can no longer be trusted.
    pub fn is_integrity(&self) -> bool {
        matches!(self, LedgerError::IntegrityError(_))
    }
}

/// Convenience alias for results with [`LedgerError`].
pub type Result<T> = std::result::Result<T, LedgerError>;
