//! Tracking record value types.
//!
//! These mirror the rows of the tracking tables the engine keeps inside the
//! target database. They are plain data; reading and writing them is the
//! engine's job.

use chrono::{DateTime, Utc};

/// Object type recorded for tables.
pub const OBJECT_TYPE_TABLE: &str = "table";

/// A tracked table row together with its owned column rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackedTable {
    pub id: i64,
    pub schema: String,
    pub object_type: String,
    pub name: String,
    pub hash: i64,
    pub version: i32,
    pub category: Option<String>,
    pub comments: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
    pub updated_on: Option<DateTime<Utc>>,
    pub columns: Vec<TrackedColumn>,
}

impl TrackedTable {
    /// Finds a tracked column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&TrackedColumn> {
        self.columns.iter().find(|c| c.matches_name(name))
    }

    pub fn column_by_id(&self, id: i64) -> Option<&TrackedColumn> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Returns `true` if this row tracks `schema`.`name`.
    pub fn matches(&self, schema: &str, name: &str) -> bool {
        self.schema.eq_ignore_ascii_case(schema) && self.name.eq_ignore_ascii_case(name)
    }
}

/// A tracked column row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackedColumn {
    pub id: i64,
    pub table_id: i64,
    pub internal_id: i32,
    pub name: String,
    pub comments: Option<String>,
    /// Native type text as rendered by the dialect, e.g. `VARCHAR(10)`.
    pub column_type: String,
    pub size: u32,
    pub scale: u32,
    pub default_value: Option<String>,
    pub allow_null: bool,
    pub reference: Option<String>,
    pub is_unique: bool,
    pub is_pk: bool,
    pub check: Option<String>,
    pub auto_increment: bool,
    pub is_index: bool,
    pub version: i32,
    pub hash: i64,
    pub created_on: Option<DateTime<Utc>>,
    pub updated_on: Option<DateTime<Utc>>,
}

impl TrackedColumn {
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A superseded table name in the append-only rename ledger.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenameRecord {
    pub id: i64,
    pub schema: String,
    pub object_type: String,
    /// Id of the tracked table the name belonged to.
    pub object_id: i64,
    pub name: String,
    pub hash: i64,
    pub version: i32,
    pub created_on: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked_column(id: i64, name: &str) -> TrackedColumn {
        TrackedColumn {
            id,
            table_id: 1,
            internal_id: id as i32,
            name: name.into(),
            comments: None,
            column_type: "BIGINT".into(),
            size: 0,
            scale: 0,
            default_value: None,
            allow_null: false,
            reference: None,
            is_unique: false,
            is_pk: false,
            check: None,
            auto_increment: false,
            is_index: false,
            version: 1,
            hash: 0,
            created_on: None,
            updated_on: None,
        }
    }

    #[test]
    fn test_lookups_ignore_case() {
        let table = TrackedTable {
            id: 1,
            schema: String::new(),
            object_type: OBJECT_TYPE_TABLE.into(),
            name: "Orders".into(),
            hash: 0,
            version: 1,
            category: None,
            comments: None,
            created_on: None,
            updated_on: None,
            columns: vec![tracked_column(10, "Status")],
        };
        assert!(table.matches("", "orders"));
        assert!(!table.matches("sales", "orders"));
        assert_eq!(table.column("STATUS").map(|c| c.id), Some(10));
        assert!(table.column_by_id(11).is_none());
    }
}
