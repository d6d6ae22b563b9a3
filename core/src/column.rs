//! Column declarations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::Fingerprint;
use crate::types::ColumnType;

/// A declared column of a [`Table`](crate::Table).
///
/// Columns are plain data built with chained `with_*` methods. The
/// [`internal_id`](Self::internal_id) is the column's stable identity: it
/// defaults to declaration order when the column is added to a table, but
/// must be assigned explicitly once columns are removed or reordered so the
/// tracked identity never shifts.
///
/// # Examples
///
/// ```
/// use schema_ledger_core::{Column, ColumnType};
///
/// let status = Column::new("status", ColumnType::String)
///     .with_size(10)
///     .not_null()
///     .with_default("'new'");
/// assert_eq!(status.size, 10);
/// assert!(!status.nullable);
///
/// // The structural hash is a pure function of the attributes.
/// assert_eq!(status.hash(), status.clone().hash());
/// assert_ne!(status.hash(), status.clone().with_size(20).hash());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Length for text/binary types, precision for `Decimal`; 0 means unset.
    pub size: u32,
    pub scale: u32,
    pub nullable: bool,
    /// Raw SQL default expression, e.g. `'new'`, `0` or `CURRENT_TIMESTAMP`.
    pub default: Option<String>,
    pub unique: bool,
    pub primary_key: bool,
    /// Check constraint body without the `CHECK` keyword.
    pub check: Option<String>,
    /// Foreign key target such as `customers(id)`.
    pub reference: Option<String>,
    pub auto_increment: bool,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Bumped manually whenever the column's shape changes.
    pub version: i32,
    /// Stable identity token; 0 until assigned.
    pub internal_id: i32,
    /// Prior names of this column keyed by the version that used them.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub old_names: BTreeMap<i32, String>,
}

impl Default for Column {
    fn default() -> Self {
        Self {
            name: String::new(),
            column_type: ColumnType::default(),
            size: 0,
            scale: 0,
            nullable: true,
            default: None,
            unique: false,
            primary_key: false,
            check: None,
            reference: None,
            auto_increment: false,
            indexed: false,
            comment: None,
            version: 1,
            internal_id: 0,
            old_names: BTreeMap::new(),
        }
    }
}

impl Column {
    /// Creates a nullable column of the given type at version 1.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            ..Self::default()
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Sets precision and scale (for `Decimal`).
    pub fn with_precision(mut self, size: u32, scale: u32) -> Self {
        self.size = size;
        self.scale = scale;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the column as (part of) the primary key; primary keys are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.reference = Some(target.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Requests a single-column index, registered when the column is added to a table.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn with_internal_id(mut self, internal_id: i32) -> Self {
        self.internal_id = internal_id;
        self
    }

    /// Records that this column was called `name` at `version`.
    pub fn with_old_name(mut self, version: i32, name: impl Into<String>) -> Self {
        self.old_names.insert(version, name.into());
        self
    }

    /// Prior names, most recent first.
    pub fn previous_names(&self) -> impl Iterator<Item = &str> {
        self.old_names.values().rev().map(String::as_str)
    }

    /// Structural hash over every attribute that affects the column's shape
    /// or identity.
    ///
    /// The comment is excluded: it never produces DDL.
    pub fn hash(&self) -> i64 {
        let mut fp = Fingerprint::new();
        fp.text(&self.name)
            .text(self.column_type.as_str())
            .number(i64::from(self.size))
            .number(i64::from(self.scale))
            .optional(self.default.as_deref())
            .flag(self.nullable)
            .optional(self.reference.as_deref())
            .flag(self.unique)
            .flag(self.primary_key)
            .optional(self.check.as_deref())
            .flag(self.auto_increment)
            .flag(self.indexed)
            .number(i64::from(self.version))
            .number(i64::from(self.internal_id));
        fp.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Column {
        Column::new("amount", ColumnType::Decimal)
            .with_precision(18, 2)
            .not_null()
            .with_default("0")
            .with_internal_id(3)
    }

    #[test]
    fn test_identical_columns_hash_equal() {
        assert_eq!(base().hash(), base().hash());
    }

    #[test]
    fn test_each_attribute_changes_hash() {
        let original = base().hash();
        let variants = vec![
            Column { name: "total".into(), ..base() },
            Column { column_type: ColumnType::Double, ..base() },
            base().with_precision(20, 2),
            base().with_precision(18, 4),
            Column { default: None, ..base() },
            Column { nullable: true, ..base() },
            base().references("currencies(id)"),
            base().unique(),
            Column { primary_key: true, ..base() },
            base().with_check("amount >= 0"),
            base().auto_increment(),
            base().indexed(),
            base().with_version(2),
            base().with_internal_id(4),
        ];
        for variant in variants {
            assert_ne!(variant.hash(), original, "variant {variant:?} kept the hash");
        }
    }

    #[test]
    fn test_comment_does_not_change_hash() {
        assert_eq!(base().with_comment("money").hash(), base().hash());
    }

    #[test]
    fn test_primary_key_implies_not_null() {
        let id = Column::new("id", ColumnType::Int64).primary_key();
        assert!(id.primary_key);
        assert!(!id.nullable);
    }

    #[test]
    fn test_previous_names_most_recent_first() {
        let col = Column::new("email_address", ColumnType::String)
            .with_old_name(2, "mail")
            .with_old_name(3, "email");
        let names: Vec<&str> = col.previous_names().collect();
        assert_eq!(names, vec!["email", "mail"]);
    }

    #[test]
    fn test_deserialize_defaults() {
        let col: Column = serde_json::from_str(r#"{"name": "note", "type": "Text"}"#).unwrap();
        assert_eq!(col.column_type, ColumnType::Text);
        assert!(col.nullable);
        assert_eq!(col.version, 1);
        assert_eq!(col.internal_id, 0);
    }
}
