//! Declarative schema files.
//!
//! A schema file lists tables in YAML or JSON, using the same field names
//! as [`Table`] and [`Column`](crate::Column).
//!
//! # Example YAML
//!
//! ```yaml
//! audit:
//!   - orders
//! tables:
//!   - name: orders
//!     category: sales
//!     columns:
//!       - name: id
//!         type: Int64
//!         primary_key: true
//!         nullable: false
//!         auto_increment: true
//!       - name: status
//!         type: String
//!         size: 10
//!         indexed: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Table;

/// Errors reading or writing schema files.
#[derive(Debug, Error)]
pub enum ModelError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Contents of a schema file.
///
/// # Examples
///
/// ```
/// use schema_ledger_core::SchemaFile;
///
/// let file: SchemaFile = serde_yaml::from_str(
///     "audit: [orders]\n\
///      tables:\n  - name: orders\n    columns:\n      - {name: id, type: Int64}\n",
/// ).unwrap();
/// let tables = file.into_tables();
/// assert_eq!(tables[0].columns.len(), 5);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    /// Names of tables that receive the standard audit columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audit: Vec<String>,
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl SchemaFile {
    /// Loads a schema file; `.json` files are read as JSON, anything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::IoError`] if the file cannot be read, or a
    /// parse error for malformed content.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let reader = BufReader::new(std::fs::File::open(path)?);
        if is_json(path) {
            Ok(serde_json::from_reader(reader)?)
        } else {
            Ok(serde_yaml::from_reader(reader)?)
        }
    }

    /// Writes the schema file in the format implied by the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let writer = BufWriter::new(std::fs::File::create(path)?);
        if is_json(path) {
            serde_json::to_writer_pretty(writer, self)?;
        } else {
            serde_yaml::to_writer(writer, self)?;
        }
        Ok(())
    }

    /// Produces builder-ready tables: ids assigned, column indexes
    /// registered, audit columns appended where requested.
    pub fn into_tables(self) -> Vec<Table> {
        let audit = self.audit;
        self.tables
            .into_iter()
            .map(|table| {
                let mut table = table.normalized();
                if audit.iter().any(|n| n.eq_ignore_ascii_case(&table.name)) {
                    table.add_audit_columns();
                }
                table
            })
            .collect()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Column, ColumnType};

    fn sample() -> SchemaFile {
        let mut orders = Table::new("orders").with_category("sales");
        orders
            .add_pk_column(Column::new("id", ColumnType::Int64).auto_increment())
            .add_column(
                Column::new("status", ColumnType::String)
                    .with_size(10)
                    .with_old_name(2, "state"),
            )
            .add_old_table_name(1, "order_headers");
        SchemaFile {
            audit: Vec::new(),
            tables: vec![orders],
        }
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        sample().save(&path).unwrap();
        let loaded = SchemaFile::load(&path).unwrap();
        assert_eq!(loaded.tables, sample().tables);
    }

    #[test]
    fn test_json_file_keeps_version_keyed_maps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        sample().save(&path).unwrap();
        let loaded = SchemaFile::load(&path).unwrap();
        assert_eq!(loaded.tables[0].old_names[&1], "order_headers");
        assert_eq!(loaded.tables[0].columns[1].old_names[&2], "state");
    }

    #[test]
    fn test_missing_file() {
        let err = SchemaFile::load("/nonexistent/schema.yaml").unwrap_err();
        assert!(matches!(err, ModelError::IoError(_)));
    }

    #[test]
    fn test_audit_only_for_listed_tables() {
        let file: SchemaFile = serde_yaml::from_str(
            r#"
audit: [ORDERS]
tables:
  - name: orders
    columns: [{name: id, type: Int64}]
  - name: notes
    columns: [{name: id, type: Int64}]
"#,
        )
        .unwrap();
        let tables = file.into_tables();
        assert_eq!(tables[0].columns.len(), 5);
        assert_eq!(tables[1].columns.len(), 1);
        assert_eq!(tables[0].columns[4].internal_id, 5);
    }
}
