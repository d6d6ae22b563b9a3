//! SQLite backend for the schema-ledger engine.
//!
//! This crate provides the [`SqliteDialect`] and a [`SqliteClient`] over a
//! `rusqlite` connection, plus [`open_builder`] to go straight from a
//! [`BuildConfig`] to a ready [`SchemaBuilder`].
//!
//! # Quick start
//!
//! ```no_run
//! use schema_ledger_core::{Column, ColumnType, Table};
//! use schema_ledger_engine::BuildConfig;
//!
//! let config = BuildConfig::new("sqlite", "app.db");
//! let catalog = schema_ledger_sqlite::catalog();
//! let mut builder = schema_ledger_sqlite::open_builder(&config, &catalog).unwrap();
//!
//! let mut orders = Table::new("orders");
//! orders
//!     .add_pk_column(Column::new("id", ColumnType::Int64).auto_increment())
//!     .add_column(Column::new("status", ColumnType::String).with_size(10).indexed());
//! builder.register(orders).unwrap();
//!
//! if !builder.build().unwrap() {
//!     eprintln!("build failed: {}", builder.last_error().unwrap_or_default());
//! }
//! ```
//!
//! # Connection strings
//!
//! The configured connection is a file path, or `:memory:` for a private
//! in-memory database.

mod client;
mod convert;
mod dialect;
mod error;

pub use client::SqliteClient;
pub use dialect::{REBUILD_SUFFIX, SqliteDialect};
pub use error::{Result, SqliteError};

use schema_ledger_engine::{BuildConfig, DialectCatalog, SchemaBuilder};

/// Provider id of [`SqliteDialect`].
pub const PROVIDER: &str = "sqlite";

/// Adds [`SqliteDialect`] to `catalog` under [`PROVIDER`].
pub fn register(catalog: &mut DialectCatalog) {
    catalog.register(PROVIDER, SqliteDialect::new());
}

/// The built-in dialects plus SQLite.
pub fn catalog() -> DialectCatalog {
    let mut catalog = DialectCatalog::with_builtins();
    register(&mut catalog);
    catalog
}

/// Opens the configured database and returns a builder over it.
///
/// The provider is resolved before the database is opened, so an unknown
/// provider never creates a file.
///
/// # Errors
///
/// Returns [`ConfigError`](schema_ledger_engine::LedgerError::ConfigError)
/// or [`UnknownProvider`](schema_ledger_engine::LedgerError::UnknownProvider)
/// for a bad configuration, and a client error if the database cannot be
/// opened.
pub fn open_builder(
    config: &BuildConfig,
    catalog: &DialectCatalog,
) -> schema_ledger_engine::Result<SchemaBuilder<SqliteClient>> {
    config.validate()?;
    catalog.require(&config.provider)?;
    let client = if config.connection.trim() == ":memory:" {
        SqliteClient::open_in_memory()?
    } else {
        SqliteClient::open(config.connection.trim())?
    };
    SchemaBuilder::from_config(client, config, catalog)
}
