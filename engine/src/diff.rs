//! Declared-versus-tracked column diffing.
//!
//! Analysis never mutates the declaration. It produces a [`TableDiff`]
//! value that the dialect renders into ALTER statements and the tracking
//! store uses to decide which column rows to insert or rewrite.

use schema_ledger_core::{Column, Table, TrackedColumn, TrackedTable};

use crate::dialect::Dialect;

/// How a declared column relates to the tracking record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnStatus {
    /// No tracked column matches by name or by rename history.
    Added,
    /// Matched a tracked column of the same name.
    Matched,
    /// Matched a tracked column through the column's rename history.
    Renamed { from: String },
}

/// Per-attribute change flags for a matched column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnChanges {
    pub native_type: bool,
    pub size: bool,
    pub scale: bool,
    pub nullability: bool,
    pub default: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub index: bool,
    pub auto_increment: bool,
    pub check: bool,
    pub reference: bool,
}

impl ColumnChanges {
    pub fn any(&self) -> bool {
        self.type_changed()
            || self.nullability
            || self.default
            || self.unique
            || self.primary_key
            || self.index
            || self.auto_increment
            || self.check
            || self.reference
    }

    /// Native type, size or scale differ.
    pub fn type_changed(&self) -> bool {
        self.native_type || self.size || self.scale
    }
}

/// Analysis result for one declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDiff {
    /// Declared column name.
    pub name: String,
    /// Index of the column in the declaration.
    pub position: usize,
    pub status: ColumnStatus,
    pub changes: ColumnChanges,
    /// Id of the matched tracking row.
    pub tracked_id: Option<i64>,
    /// Identity to persist: the tracked internal id for matches, the declared one otherwise.
    pub internal_id: i32,
    /// Declared version is newer than the tracked one.
    pub version_bumped: bool,
}

impl ColumnDiff {
    /// The column needs DDL.
    pub fn is_dirty(&self) -> bool {
        match self.status {
            ColumnStatus::Added | ColumnStatus::Renamed { .. } => true,
            ColumnStatus::Matched => self.changes.any(),
        }
    }

    /// An existing tracking row must be rewritten.
    pub fn needs_tracking_update(&self) -> bool {
        match self.status {
            ColumnStatus::Added => false,
            ColumnStatus::Renamed { .. } => true,
            ColumnStatus::Matched => self.changes.any() || self.version_bumped,
        }
    }

    /// Name the column currently has in the live table.
    pub fn live_name(&self) -> &str {
        match &self.status {
            ColumnStatus::Renamed { from } => from,
            _ => &self.name,
        }
    }
}

/// Analysis result for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    pub table: String,
    pub tracked_table_id: i64,
    /// One entry per declared column, in declaration order.
    pub columns: Vec<ColumnDiff>,
    /// Tracked columns no declared column claimed. They are never dropped.
    pub orphaned: Vec<TrackedColumn>,
    /// Tracked table name when the declaration renames the table.
    pub previous_name: Option<String>,
}

impl TableDiff {
    /// Logical OR of the per-column dirty flags.
    pub fn has_changes(&self) -> bool {
        self.columns.iter().any(ColumnDiff::is_dirty)
    }

    /// Any tracking row must be inserted or rewritten.
    pub fn needs_tracking_update(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.status == ColumnStatus::Added || c.needs_tracking_update())
    }

    pub fn added(&self) -> impl Iterator<Item = &ColumnDiff> {
        self.columns.iter().filter(|c| c.status == ColumnStatus::Added)
    }

    pub fn renamed(&self) -> impl Iterator<Item = &ColumnDiff> {
        self.columns
            .iter()
            .filter(|c| matches!(c.status, ColumnStatus::Renamed { .. }))
    }

    /// Matched or renamed columns with attribute changes.
    pub fn modified(&self) -> impl Iterator<Item = &ColumnDiff> {
        self.columns
            .iter()
            .filter(|c| c.status != ColumnStatus::Added && c.changes.any())
    }
}

/// Diffs `table` against its tracking record.
///
/// Each declared column is matched by name, then through its rename
/// history; a tracked column is claimed at most once.
pub fn analyse<D: Dialect + ?Sized>(
    dialect: &D,
    table: &Table,
    tracked: &TrackedTable,
) -> TableDiff {
    let mut claimed: Vec<i64> = Vec::new();
    let mut columns = Vec::with_capacity(table.columns.len());

    for (position, column) in table.columns.iter().enumerate() {
        let (status, found) = match find_unclaimed(tracked, &claimed, &column.name) {
            Some(t) => (ColumnStatus::Matched, Some(t)),
            None => column
                .previous_names()
                .find_map(|old| find_unclaimed(tracked, &claimed, old))
                .map(|t| {
                    (
                        ColumnStatus::Renamed {
                            from: t.name.clone(),
                        },
                        Some(t),
                    )
                })
                .unwrap_or((ColumnStatus::Added, None)),
        };

        let diff = match found {
            Some(t) => {
                claimed.push(t.id);
                ColumnDiff {
                    name: column.name.clone(),
                    position,
                    status,
                    changes: compare(dialect, column, t),
                    tracked_id: Some(t.id),
                    internal_id: t.internal_id,
                    version_bumped: column.version > t.version,
                }
            }
            None => ColumnDiff {
                name: column.name.clone(),
                position,
                status,
                changes: ColumnChanges::default(),
                tracked_id: None,
                internal_id: column.internal_id,
                version_bumped: false,
            },
        };
        columns.push(diff);
    }

    let orphaned = tracked
        .columns
        .iter()
        .filter(|t| !claimed.contains(&t.id))
        .cloned()
        .collect();

    TableDiff {
        table: table.name.clone(),
        tracked_table_id: tracked.id,
        columns,
        orphaned,
        previous_name: (!tracked.name.eq_ignore_ascii_case(&table.name))
            .then(|| tracked.name.clone()),
    }
}

fn find_unclaimed<'a>(
    tracked: &'a TrackedTable,
    claimed: &[i64],
    name: &str,
) -> Option<&'a TrackedColumn> {
    tracked
        .columns
        .iter()
        .find(|t| t.matches_name(name) && !claimed.contains(&t.id))
}

fn compare<D: Dialect + ?Sized>(
    dialect: &D,
    column: &Column,
    tracked: &TrackedColumn,
) -> ColumnChanges {
    ColumnChanges {
        native_type: !dialect
            .to_native_type(column)
            .eq_ignore_ascii_case(&tracked.column_type),
        size: column.size != tracked.size,
        scale: column.scale != tracked.scale,
        nullability: column.nullable != tracked.allow_null,
        default: normalized(column.default.as_deref())
            != normalized(tracked.default_value.as_deref()),
        unique: column.unique != tracked.is_unique,
        primary_key: column.primary_key != tracked.is_pk,
        index: column.indexed != tracked.is_index,
        auto_increment: column.auto_increment != tracked.auto_increment,
        check: normalized(column.check.as_deref()) != normalized(tracked.check.as_deref()),
        reference: normalized(column.reference.as_deref())
            != normalized(tracked.reference.as_deref()),
    }
}

/// Blank text counts as absent.
fn normalized(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use schema_ledger_core::ColumnType;

    use super::*;
    use crate::postgres::PostgresDialect;

    fn tracked_column(id: i64, internal_id: i32, name: &str, native: &str) -> TrackedColumn {
        TrackedColumn {
            id,
            table_id: 7,
            internal_id,
            name: name.into(),
            column_type: native.into(),
            allow_null: true,
            version: 1,
            ..TrackedColumn::default()
        }
    }

    fn tracked(name: &str, columns: Vec<TrackedColumn>) -> TrackedTable {
        TrackedTable {
            id: 7,
            name: name.into(),
            version: 1,
            columns,
            ..TrackedTable::default()
        }
    }

    #[test]
    fn test_rename_keeps_tracked_identity() {
        let mut mail = tracked_column(11, 4, "mail", "VARCHAR(80)");
        mail.size = 80;
        let record = tracked("customers", vec![mail]);
        let mut table = Table::new("customers");
        table.add_column(
            Column::new("email", ColumnType::String)
                .with_size(80)
                .with_internal_id(9)
                .with_old_name(1, "mail")
                .with_version(2),
        );

        let diff = analyse(&PostgresDialect, &table, &record);
        let email = &diff.columns[0];
        assert_eq!(
            email.status,
            ColumnStatus::Renamed {
                from: "mail".into()
            }
        );
        assert_eq!(email.internal_id, 4);
        assert_eq!(email.tracked_id, Some(11));
        assert_eq!(email.live_name(), "mail");
        assert!(email.version_bumped);
        assert!(!email.changes.any());
        assert!(diff.has_changes());
        assert_eq!(diff.renamed().count(), 1);
    }

    #[test]
    fn test_tracked_column_is_claimed_once() {
        let record = tracked("customers", vec![tracked_column(11, 1, "name", "VARCHAR(40)")]);
        let mut table = Table::new("customers");
        table
            .add_column(Column::new("name", ColumnType::String).with_size(40))
            .add_column(
                Column::new("display_name", ColumnType::String)
                    .with_size(40)
                    .with_old_name(1, "name"),
            );

        let diff = analyse(&PostgresDialect, &table, &record);
        assert_eq!(diff.columns[0].status, ColumnStatus::Matched);
        assert_eq!(diff.columns[1].status, ColumnStatus::Added);
        assert_eq!(diff.columns[1].tracked_id, None);
        assert_eq!(diff.columns[1].internal_id, 2);
        assert!(diff.orphaned.is_empty());
    }

    #[test]
    fn test_blank_text_attributes_match_absent_ones() {
        let mut column = tracked_column(11, 1, "note", "TEXT");
        column.default_value = Some("  ".into());
        column.check = Some(String::new());
        let record = tracked("notes", vec![column]);

        let mut table = Table::new("notes");
        table.add_column(Column::new("note", ColumnType::Text));

        let diff = analyse(&PostgresDialect, &table, &record);
        assert!(!diff.has_changes());
        assert!(!diff.needs_tracking_update());
        assert_eq!(diff.previous_name, None);
    }

    #[test]
    fn test_attribute_changes_and_orphans() {
        let record = tracked(
            "orders",
            vec![
                tracked_column(11, 1, "status", "VARCHAR(10)"),
                tracked_column(12, 2, "legacy", "INTEGER"),
            ],
        );
        let mut table = Table::new("sales_orders");
        table.add_column(
            Column::new("status", ColumnType::String)
                .with_size(20)
                .not_null()
                .with_default("'new'"),
        );

        let diff = analyse(&PostgresDialect, &table, &record);
        let changes = diff.columns[0].changes;
        assert!(changes.native_type && changes.size && changes.type_changed());
        assert!(changes.nullability && changes.default);
        assert!(!changes.unique && !changes.index);
        assert_eq!(diff.modified().count(), 1);
        assert_eq!(diff.orphaned.len(), 1);
        assert_eq!(diff.orphaned[0].name, "legacy");
        assert_eq!(diff.previous_name.as_deref(), Some("orders"));
    }
}
