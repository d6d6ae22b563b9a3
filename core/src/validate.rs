//! Advisory table validation.
//!
//! The builder never rejects a declaration: problems surface as SQL errors
//! when the DDL runs. These checks report the invariants a declaration is
//! expected to hold so callers can log them before that happens.
//!
//! # Examples
//!
//! ```
//! use schema_ledger_core::*;
//!
//! let mut table = Table::new("orders");
//! table.add_pk_column(Column::new("id", ColumnType::Int64));
//! assert!(validate_table(&table).is_empty());
//!
//! table.add_column(Column::new("ID", ColumnType::Int32));
//! assert!(!validate_table(&table).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::Table;

/// Table validation findings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Table name is empty or whitespace-only.
    #[error("table name cannot be empty")]
    EmptyTableName,
    /// A column name is empty or whitespace-only.
    #[error("column name cannot be empty in table {0}")]
    EmptyColumnName(String),
    /// The table declares no columns.
    #[error("table {0} declares no columns")]
    NoColumns(String),
    /// Two columns share a name (compared case-insensitively).
    #[error("duplicate column {1} in table {0}")]
    DuplicateColumn(String, String),
    /// Two columns share an internal id.
    #[error("duplicate internal id {1} in table {0}")]
    DuplicateInternalId(String, i32),
    /// An index refers to a column the table does not declare.
    #[error("index {1} of table {0} refers to unknown column {2}")]
    UnknownIndexColumn(String, String, String),
    /// Auto-increment on a non-integer column.
    #[error("column {1} of table {0} cannot auto-increment")]
    InvalidAutoIncrement(String, String),
}

/// Checks a table declaration.
///
/// Reports empty names, duplicate column names, duplicate internal ids,
/// indexes over unknown columns and auto-increment on non-integer types.
pub fn validate_table(table: &Table) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if table.name.trim().is_empty() {
        errors.push(ValidationError::EmptyTableName);
        return errors;
    }
    if table.columns.is_empty() {
        errors.push(ValidationError::NoColumns(table.name.clone()));
    }

    let mut names: HashSet<String> = HashSet::new();
    let mut ids: HashSet<i32> = HashSet::new();
    for column in &table.columns {
        if column.name.trim().is_empty() {
            errors.push(ValidationError::EmptyColumnName(table.name.clone()));
            continue;
        }
        if !names.insert(column.name.to_ascii_lowercase()) {
            errors.push(ValidationError::DuplicateColumn(
                table.name.clone(),
                column.name.clone(),
            ));
        }
        if column.internal_id != 0 && !ids.insert(column.internal_id) {
            errors.push(ValidationError::DuplicateInternalId(
                table.name.clone(),
                column.internal_id,
            ));
        }
        if column.auto_increment && !column.column_type.is_integer() {
            errors.push(ValidationError::InvalidAutoIncrement(
                table.name.clone(),
                column.name.clone(),
            ));
        }
    }

    for (index, columns) in &table.indexes {
        for name in columns {
            if table.column(name).is_none() {
                errors.push(ValidationError::UnknownIndexColumn(
                    table.name.clone(),
                    index.clone(),
                    name.clone(),
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Column, ColumnType};

    #[test]
    fn test_empty_table_name() {
        let errors = validate_table(&Table::new("  "));
        assert_eq!(errors, vec![ValidationError::EmptyTableName]);
    }

    #[test]
    fn test_no_columns() {
        let errors = validate_table(&Table::new("t"));
        assert!(errors.contains(&ValidationError::NoColumns("t".into())));
    }

    #[test]
    fn test_duplicate_internal_id() {
        let mut t = Table::new("t");
        t.add_column(Column::new("a", ColumnType::Int32).with_internal_id(1))
            .add_column(Column::new("b", ColumnType::Int32).with_internal_id(1));
        let errors = validate_table(&t);
        assert!(errors.contains(&ValidationError::DuplicateInternalId("t".into(), 1)));
    }

    #[test]
    fn test_unknown_index_column() {
        let mut t = Table::new("t");
        t.add_column(Column::new("a", ColumnType::Int32))
            .add_index("idx_t_b", &["b"]);
        let errors = validate_table(&t);
        assert_eq!(
            errors,
            vec![ValidationError::UnknownIndexColumn(
                "t".into(),
                "idx_t_b".into(),
                "b".into()
            )]
        );
    }

    #[test]
    fn test_auto_increment_requires_integer() {
        let mut t = Table::new("t");
        t.add_column(Column::new("code", ColumnType::String).auto_increment());
        let errors = validate_table(&t);
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::InvalidAutoIncrement(_, _)]
        ));
    }
}
