//! Declarative schema model for schema-ledger.
//!
//! This crate defines the pure data side of the engine; nothing here
//! performs I/O against a database:
//!
//! - [`Table`] and [`Column`] — the desired shape of a table, built in code
//!   or loaded from a [`SchemaFile`].
//! - [`ColumnType`] — portable column types translated by each dialect.
//! - Structural hashes ([`Column::hash`], [`Table::hash`]) used as cheap
//!   equality fingerprints.
//! - [`naming`] — generated index/constraint names bounded to
//!   [`naming::MAX_IDENTIFIER_LEN`].
//! - [`TrackedTable`], [`TrackedColumn`], [`RenameRecord`] — the rows the
//!   engine persists about previously applied schema state.
//!
//! Validation ([`validate_table`]) reports duplicate names, duplicate
//! internal ids and dangling index columns without rejecting anything.
//!
//! # Example
//!
//! ```
//! use schema_ledger_core::*;
//!
//! let mut orders = Table::new("orders").with_category("sales");
//! orders
//!     .add_pk_column(Column::new("id", ColumnType::Int64).auto_increment())
//!     .add_column(Column::new("status", ColumnType::String).with_size(10))
//!     .add_audit_columns();
//!
//! assert_eq!(orders.columns.len(), 6);
//! assert!(validate_table(&orders).is_empty());
//! ```

mod column;
mod file;
pub mod hash;
pub mod naming;
mod table;
mod tracking;
mod types;
mod validate;

pub use column::Column;
pub use file::{ModelError, SchemaFile};
pub use table::{AUDIT_COLUMNS, Table};
pub use tracking::{OBJECT_TYPE_TABLE, RenameRecord, TrackedColumn, TrackedTable};
pub use types::ColumnType;
pub use validate::{ValidationError, validate_table};
