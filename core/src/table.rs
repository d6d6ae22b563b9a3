//! Table declarations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::hash::Fingerprint;
use crate::naming::index_name;
use crate::types::ColumnType;

/// Names of the columns appended by [`Table::add_audit_columns`].
pub const AUDIT_COLUMNS: [&str; 4] = ["created_by", "created_on", "updated_by", "updated_on"];

/// Declarative description of a desired table.
///
/// A table owns its ordered columns, a map of index name to indexed column
/// names, and a history of prior table names keyed by the version that
/// used them. Builder methods only append; nothing is validated until
/// the generated SQL reaches the database (see
/// [`validate_table`](crate::validate_table) for an advisory check).
///
/// # Examples
///
/// ```
/// use schema_ledger_core::{Column, ColumnType, Table};
///
/// let mut orders = Table::new("orders");
/// orders
///     .add_pk_column(Column::new("id", ColumnType::Int64).auto_increment())
///     .add_column(Column::new("status", ColumnType::String).with_size(10).indexed());
///
/// assert_eq!(orders.columns.len(), 2);
/// assert_eq!(orders.columns[1].internal_id, 2);
/// assert_eq!(orders.indexes["idx_orders_status"], vec!["status".to_string()]);
/// assert_eq!(orders.primary_key_columns(), vec!["id"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    pub name: String,
    /// Namespace; empty selects the dialect's default.
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Bumped manually when the table's shape or name changes.
    pub version: i32,
    pub columns: Vec<Column>,
    pub indexes: BTreeMap<String, Vec<String>>,
    /// Prior table names keyed by the version that used them.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub old_names: BTreeMap<i32, String>,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            name: String::new(),
            schema: String::new(),
            comment: None,
            category: None,
            version: 1,
            columns: Vec::new(),
            indexes: BTreeMap::new(),
            old_names: BTreeMap::new(),
        }
    }
}

impl Table {
    /// Creates an empty table at version 1 in the default schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Appends a column marked as primary key.
    pub fn add_pk_column(&mut self, column: Column) -> &mut Self {
        self.add_column(column.primary_key())
    }

    /// Appends a column.
    ///
    /// An unassigned internal id (0) becomes the 1-based declaration
    /// position. An indexed column registers `idx_{table}_{column}`.
    /// Primary key columns are made NOT NULL.
    pub fn add_column(&mut self, mut column: Column) -> &mut Self {
        if column.primary_key {
            column.nullable = false;
        }
        if column.internal_id == 0 {
            column.internal_id = self.columns.len() as i32 + 1;
        }
        if column.indexed {
            self.indexes
                .entry(index_name(&self.name, &column.name))
                .or_insert_with(|| vec![column.name.clone()]);
        }
        self.columns.push(column);
        self
    }

    /// Registers an index over `columns`; an existing index of the same name is replaced.
    pub fn add_index(&mut self, name: impl Into<String>, columns: &[&str]) -> &mut Self {
        self.indexes
            .insert(name.into(), columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Appends `created_by`, `created_on`, `updated_by`, `updated_on` with one index each.
    pub fn add_audit_columns(&mut self) -> &mut Self {
        for name in AUDIT_COLUMNS {
            let column = if name.ends_with("_by") {
                Column::new(name, ColumnType::String).with_size(50)
            } else {
                Column::new(name, ColumnType::DateTime)
            };
            self.add_column(column.indexed());
        }
        self
    }

    /// Records that the table was called `name` at `version`.
    pub fn add_old_table_name(&mut self, version: i32, name: impl Into<String>) -> &mut Self {
        self.old_names.insert(version, name.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Schema-qualified display name (`schema.name`, or just `name`).
    pub fn full_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }

    /// Re-runs the append logic over deserialized columns.
    ///
    /// Tables read from schema files bypass [`add_column`](Self::add_column);
    /// this assigns missing internal ids and registers indexes for columns
    /// flagged `indexed`, keeping explicitly declared indexes.
    pub fn normalized(mut self) -> Self {
        let columns = std::mem::take(&mut self.columns);
        for column in columns {
            self.add_column(column);
        }
        self
    }

    /// Structural hash over schema, name, version and the column hashes in order.
    pub fn hash(&self) -> i64 {
        let mut fp = Fingerprint::new();
        fp.text(&self.schema)
            .text(&self.name)
            .number(i64::from(self.version));
        for column in &self.columns {
            fp.number(column.hash());
        }
        fp.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Table {
        let mut t = Table::new("orders");
        t.add_pk_column(Column::new("id", ColumnType::Int64))
            .add_column(Column::new("status", ColumnType::String).with_size(10));
        t
    }

    #[test]
    fn test_internal_ids_follow_declaration_order() {
        let t = orders();
        assert_eq!(t.columns[0].internal_id, 1);
        assert_eq!(t.columns[1].internal_id, 2);
    }

    #[test]
    fn test_explicit_internal_id_kept() {
        let mut t = Table::new("orders");
        t.add_column(Column::new("status", ColumnType::String).with_internal_id(7));
        assert_eq!(t.columns[0].internal_id, 7);
    }

    #[test]
    fn test_audit_columns_and_indexes() {
        let mut t = orders();
        t.add_audit_columns();
        assert_eq!(t.columns.len(), 6);
        for name in AUDIT_COLUMNS {
            assert!(t.column(name).is_some(), "missing {name}");
            assert!(t.indexes.contains_key(&index_name("orders", name)));
        }
        assert_eq!(t.column("created_by").unwrap().size, 50);
        assert_eq!(
            t.column("updated_on").unwrap().column_type,
            ColumnType::DateTime
        );
    }

    #[test]
    fn test_add_index_and_old_names() {
        let mut t = orders();
        t.add_index("idx_orders_multi", &["status", "id"])
            .add_old_table_name(1, "order_headers");
        assert_eq!(t.indexes["idx_orders_multi"], vec!["status", "id"]);
        assert_eq!(t.old_names[&1], "order_headers");
    }

    #[test]
    fn test_table_hash_tracks_columns() {
        let a = orders();
        let mut b = orders();
        assert_eq!(a.hash(), b.hash());
        b.columns[1].size = 20;
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), orders().with_version(2).hash());
    }

    #[test]
    fn test_normalized_assigns_ids_and_indexes() {
        let t: Table = serde_yaml::from_str(
            r#"
name: customers
columns:
  - name: id
    type: Int64
    primary_key: true
    nullable: false
  - name: email
    type: String
    size: 120
    indexed: true
"#,
        )
        .unwrap();
        assert_eq!(t.columns[1].internal_id, 0);
        let t = t.normalized();
        assert_eq!(t.columns[0].internal_id, 1);
        assert_eq!(t.columns[1].internal_id, 2);
        assert!(t.indexes.contains_key("idx_customers_email"));
    }

    #[test]
    fn test_full_name() {
        assert_eq!(orders().full_name(), "orders");
        assert_eq!(orders().with_schema("sales").full_name(), "sales.orders");
    }
}
