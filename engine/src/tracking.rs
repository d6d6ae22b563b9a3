//! Tracking Store: the engine's own bookkeeping tables.
//!
//! Three tables live in the target database next to the user tables:
//!
//! - `sys_ddl_object` — one row per tracked table
//! - `sys_ddl_column` — one row per tracked column, owned by `table_id`
//! - `sys_ddl_name` — append-only ledger of superseded table names
//!
//! Their definitions are ordinary [`Table`] declarations, so they are
//! created through the same dialect path as user tables. State is read
//! once per run by [`TrackingStore::load`]; every write refreshes the
//! affected cache entry from the database.

use chrono::Utc;
use schema_ledger_core::{
    Column, ColumnType, OBJECT_TYPE_TABLE, RenameRecord, Table, TrackedColumn, TrackedTable,
};
use tracing::debug;

use crate::client::{DbClient, Row, Value};
use crate::dialect::Dialect;
use crate::diff::{ColumnStatus, TableDiff};
use crate::error::{LedgerError, Result};

pub const OBJECT_TABLE: &str = "sys_ddl_object";
pub const COLUMN_TABLE: &str = "sys_ddl_column";
pub const NAME_TABLE: &str = "sys_ddl_name";

const OBJECT_FIELDS: [&str; 10] = [
    "id",
    "schema_name",
    "object_type",
    "object_name",
    "object_hash",
    "version",
    "category",
    "comments",
    "created_on",
    "updated_on",
];

const COLUMN_FIELDS: [&str; 20] = [
    "id",
    "table_id",
    "internal_id",
    "column_name",
    "comments",
    "column_type",
    "column_size",
    "scale",
    "default_value",
    "allow_null",
    "reference",
    "is_unique",
    "is_pk",
    "constraint_value",
    "auto_increase",
    "is_index",
    "version",
    "hash_code",
    "created_on",
    "updated_on",
];

/// Column attributes written on insert and on in-place update, in order.
const COLUMN_ATTRIBUTES: [&str; 16] = [
    "column_name",
    "comments",
    "column_type",
    "column_size",
    "scale",
    "default_value",
    "allow_null",
    "reference",
    "is_unique",
    "is_pk",
    "constraint_value",
    "auto_increase",
    "is_index",
    "version",
    "hash_code",
    "updated_on",
];

const NAME_FIELDS: [&str; 8] = [
    "id",
    "schema_name",
    "object_type",
    "object_id",
    "object_name",
    "hash_code",
    "version",
    "created_on",
];

fn key_column(name: &str) -> Column {
    Column::new(name, ColumnType::Int64).primary_key().auto_increment()
}

fn text(name: &str, size: u32) -> Column {
    Column::new(name, ColumnType::String).with_size(size)
}

/// Declarations of the three tracking tables, in creation order.
pub fn tracking_tables() -> Vec<Table> {
    let mut object = Table::new(OBJECT_TABLE).with_comment("Tracked database objects");
    object
        .add_column(key_column("id"))
        .add_column(text("schema_name", 128))
        .add_column(text("object_type", 32).not_null())
        .add_column(text("comments", 500))
        .add_column(text("category", 100))
        .add_column(text("object_name", 128).not_null().indexed())
        .add_column(Column::new("object_hash", ColumnType::Int64))
        .add_column(Column::new("version", ColumnType::Int32).not_null())
        .add_column(Column::new("created_on", ColumnType::DateTime))
        .add_column(Column::new("updated_on", ColumnType::DateTime));

    let mut column = Table::new(COLUMN_TABLE).with_comment("Tracked table columns");
    column
        .add_column(key_column("id"))
        .add_column(
            Column::new("table_id", ColumnType::Int64)
                .not_null()
                .references(format!("{OBJECT_TABLE}(id)"))
                .indexed(),
        )
        .add_column(Column::new("internal_id", ColumnType::Int32).not_null())
        .add_column(text("column_name", 128).not_null())
        .add_column(text("comments", 500))
        .add_column(text("column_type", 64))
        .add_column(Column::new("column_size", ColumnType::Int32))
        .add_column(Column::new("scale", ColumnType::Int32))
        .add_column(text("default_value", 500))
        .add_column(Column::new("allow_null", ColumnType::Boolean))
        .add_column(text("reference", 256))
        .add_column(Column::new("is_unique", ColumnType::Boolean))
        .add_column(Column::new("is_pk", ColumnType::Boolean))
        .add_column(text("constraint_value", 500))
        .add_column(Column::new("auto_increase", ColumnType::Boolean))
        .add_column(Column::new("is_index", ColumnType::Boolean))
        .add_column(Column::new("version", ColumnType::Int32).not_null())
        .add_column(Column::new("hash_code", ColumnType::Int64))
        .add_column(Column::new("created_on", ColumnType::DateTime))
        .add_column(Column::new("updated_on", ColumnType::DateTime));

    let mut name = Table::new(NAME_TABLE).with_comment("Superseded object names");
    name.add_column(key_column("id"))
        .add_column(text("schema_name", 128))
        .add_column(text("object_type", 32).not_null())
        .add_column(Column::new("object_id", ColumnType::Int64).not_null().indexed())
        .add_column(text("object_name", 128).not_null())
        .add_column(Column::new("hash_code", ColumnType::Int64))
        .add_column(Column::new("version", ColumnType::Int32).not_null())
        .add_column(Column::new("created_on", ColumnType::DateTime));

    vec![object, column, name]
}

/// Reads and writes tracking state through one client and dialect.
pub struct TrackingStore<'a> {
    client: &'a dyn DbClient,
    dialect: &'a dyn Dialect,
    tables: Vec<TrackedTable>,
    renames: Vec<RenameRecord>,
}

impl<'a> TrackingStore<'a> {
    /// Creates an empty store; nothing is read until [`load`](Self::load).
    pub fn new(client: &'a dyn DbClient, dialect: &'a dyn Dialect) -> Self {
        Self {
            client,
            dialect,
            tables: Vec::new(),
            renames: Vec::new(),
        }
    }

    /// Returns `true` when every tracking table exists.
    pub fn exists(&self) -> Result<bool> {
        for table in tracking_tables() {
            let sql = self.dialect.table_exist_sql(&table.schema, &table.name);
            let found = self.client.execute_scalar(&sql, &[])?;
            if !found.is_some_and(|v| v.is_present()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reads every tracked table, column and rename record.
    pub fn load(&mut self) -> Result<()> {
        let mut tables = self.query_tables(None)?;
        let columns = self.query_columns(None)?;
        for column in columns {
            match tables.iter_mut().find(|t| t.id == column.table_id) {
                Some(owner) => owner.columns.push(column),
                None => {
                    return Err(LedgerError::IntegrityError(format!(
                        "tracked column {} references missing table {}",
                        column.id, column.table_id
                    )));
                }
            }
        }
        self.tables = tables;
        self.renames = self.query_renames(None)?;
        debug!(
            tables = self.tables.len(),
            renames = self.renames.len(),
            "loaded tracking state"
        );
        Ok(())
    }

    pub fn tables(&self) -> &[TrackedTable] {
        &self.tables
    }

    pub fn renames(&self) -> &[RenameRecord] {
        &self.renames
    }

    /// Rename records of one tracked table, oldest first.
    pub fn renames_for(&self, object_id: i64) -> impl Iterator<Item = &RenameRecord> {
        self.renames.iter().filter(move |r| r.object_id == object_id)
    }

    pub fn find(&self, schema: &str, name: &str) -> Option<&TrackedTable> {
        self.tables.iter().find(|t| t.matches(schema, name))
    }

    /// Finds the tracking row for a declaration, by its current name or
    /// through its name history.
    ///
    /// A history entry only counts when it names the tracked table at the
    /// tracked version.
    pub fn find_declared(&self, table: &Table) -> Option<&TrackedTable> {
        self.find(&table.schema, &table.name).or_else(|| {
            self.tables.iter().find(|t| {
                t.schema.eq_ignore_ascii_case(&table.schema)
                    && table
                        .old_names
                        .get(&t.version)
                        .is_some_and(|old| t.name.eq_ignore_ascii_case(old))
            })
        })
    }

    /// Registers `table`, replacing any row with id `replace_id` or the
    /// same schema and name together with its column rows.
    ///
    /// Rename records of `replace_id` move to the new row. Returns the new
    /// tracking id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::IntegrityError`] when the inserted row cannot
    /// be read back.
    pub fn add_table(&mut self, table: &Table, replace_id: Option<i64>) -> Result<i64> {
        let stale = replace_id.unwrap_or(-1);
        let matching = format!(
            "SELECT {id} FROM {obj} WHERE {id} = {p1} \
             OR ({schema} = {p2} AND {name} = {p3} AND {kind} = {p4})",
            id = self.q("id"),
            obj = self.q(OBJECT_TABLE),
            schema = self.q("schema_name"),
            name = self.q("object_name"),
            kind = self.q("object_type"),
            p1 = self.p(1),
            p2 = self.p(2),
            p3 = self.p(3),
            p4 = self.p(4),
        );
        let keys = [
            Value::Integer(stale),
            Value::from(&table.schema),
            Value::from(&table.name),
            Value::from(OBJECT_TYPE_TABLE),
        ];
        self.client.execute_non_query(
            &format!(
                "DELETE FROM {} WHERE {} IN ({matching})",
                self.q(COLUMN_TABLE),
                self.q("table_id")
            ),
            &keys,
        )?;
        self.client.execute_non_query(
            &format!(
                "DELETE FROM {} WHERE {} IN ({matching})",
                self.q(OBJECT_TABLE),
                self.q("id")
            ),
            &keys,
        )?;

        let now = Utc::now();
        self.client.execute_non_query(
            &self.insert_sql(
                OBJECT_TABLE,
                &[
                    "schema_name",
                    "object_type",
                    "comments",
                    "category",
                    "object_name",
                    "object_hash",
                    "version",
                    "created_on",
                    "updated_on",
                ],
            ),
            &[
                Value::from(&table.schema),
                Value::from(OBJECT_TYPE_TABLE),
                Value::from(table.comment.as_deref()),
                Value::from(table.category.as_deref()),
                Value::from(&table.name),
                Value::Integer(table.hash()),
                Value::from(table.version),
                Value::Timestamp(now),
                Value::Timestamp(now),
            ],
        )?;

        let id = self
            .client
            .execute_scalar(
                &format!(
                    "SELECT MAX({}) FROM {} WHERE {} = {} AND {} = {} AND {} = {}",
                    self.q("id"),
                    self.q(OBJECT_TABLE),
                    self.q("schema_name"),
                    self.p(1),
                    self.q("object_name"),
                    self.p(2),
                    self.q("object_type"),
                    self.p(3)
                ),
                &[
                    Value::from(&table.schema),
                    Value::from(&table.name),
                    Value::from(OBJECT_TYPE_TABLE),
                ],
            )?
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                LedgerError::IntegrityError(format!(
                    "tracking row for {} not found after insert",
                    table.full_name()
                ))
            })
            .and_then(|v| Row(vec![v]).i64(0))?;

        for column in &table.columns {
            self.insert_column(id, column.internal_id, column)?;
        }
        if let Some(old_id) = replace_id {
            let moved = self.client.execute_non_query(
                &format!(
                    "UPDATE {} SET {} = {} WHERE {} = {}",
                    self.q(NAME_TABLE),
                    self.q("object_id"),
                    self.p(1),
                    self.q("object_id"),
                    self.p(2)
                ),
                &[Value::Integer(id), Value::Integer(old_id)],
            )?;
            for record in self.renames.iter_mut().filter(|r| r.object_id == old_id) {
                record.object_id = id;
            }
            if moved > 0 {
                debug!(from = old_id, to = id, records = moved, "moved rename records");
            }
        }
        debug!(table = %table.full_name(), id, "registered table in tracking");

        self.tables
            .retain(|t| Some(t.id) != replace_id && !t.matches(&table.schema, &table.name));
        let fresh = self.fetch_table(id)?;
        self.tables.push(fresh);
        Ok(id)
    }

    /// Inserts rows for added columns and rewrites rows whose column was
    /// renamed, modified or given a newer version.
    ///
    /// The table row is left alone; it only moves with a rename or a
    /// table version bump.
    pub fn update_columns(&mut self, table: &Table, diff: &TableDiff) -> Result<()> {
        let table_id = diff.tracked_table_id;
        for entry in &diff.columns {
            let Some(column) = table.columns.get(entry.position) else {
                continue;
            };
            match (&entry.status, entry.tracked_id) {
                (ColumnStatus::Added, _) => {
                    self.insert_column(table_id, entry.internal_id, column)?;
                }
                (_, Some(tracked_id)) if entry.needs_tracking_update() => {
                    let assignments: Vec<String> = COLUMN_ATTRIBUTES
                        .iter()
                        .enumerate()
                        .map(|(i, field)| format!("{} = {}", self.q(field), self.p(i + 1)))
                        .collect();
                    let sql = format!(
                        "UPDATE {} SET {} WHERE {} = {}",
                        self.q(COLUMN_TABLE),
                        assignments.join(", "),
                        self.q("id"),
                        self.p(COLUMN_ATTRIBUTES.len() + 1)
                    );
                    let mut params = self.column_values(column);
                    params.push(Value::Integer(tracked_id));
                    self.client.execute_non_query(&sql, &params)?;
                }
                _ => {}
            }
        }
        self.refresh(table_id)
    }

    /// Appends the superseded name of `tracked` to the rename ledger, then
    /// renames its tracking row in place so owned column rows stay attached.
    pub fn record_rename(&mut self, table: &Table, tracked: &TrackedTable) -> Result<()> {
        let now = Utc::now();
        self.client.execute_non_query(
            &self.insert_sql(
                NAME_TABLE,
                &[
                    "schema_name",
                    "object_type",
                    "object_id",
                    "object_name",
                    "hash_code",
                    "version",
                    "created_on",
                ],
            ),
            &[
                Value::from(&tracked.schema),
                Value::from(tracked.object_type.as_str()),
                Value::Integer(tracked.id),
                Value::from(&tracked.name),
                Value::Integer(tracked.hash),
                Value::from(tracked.version),
                Value::Timestamp(now),
            ],
        )?;
        self.update_object(table, tracked.id, true)?;
        debug!(from = %tracked.name, to = %table.name, id = tracked.id, "recorded table rename");

        self.renames.retain(|r| r.object_id != tracked.id);
        let ledger = self.query_renames(Some(tracked.id))?;
        self.renames.extend(ledger);
        self.refresh(tracked.id)
    }

    /// Rewrites version, hash, comments and category of a tracked table
    /// whose declared version moved ahead without a rename.
    pub fn update_table_version(&mut self, table: &Table, tracked_id: i64) -> Result<()> {
        self.update_object(table, tracked_id, false)?;
        self.refresh(tracked_id)
    }

    fn update_object(&self, table: &Table, id: i64, rename: bool) -> Result<()> {
        let mut fields = vec!["object_hash", "version", "comments", "category", "updated_on"];
        let mut params = vec![
            Value::Integer(table.hash()),
            Value::from(table.version),
            Value::from(table.comment.as_deref()),
            Value::from(table.category.as_deref()),
            Value::Timestamp(Utc::now()),
        ];
        if rename {
            fields.push("object_name");
            params.push(Value::from(&table.name));
        }
        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{} = {}", self.q(f), self.p(i + 1)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.q(OBJECT_TABLE),
            assignments.join(", "),
            self.q("id"),
            self.p(fields.len() + 1)
        );
        params.push(Value::Integer(id));
        let touched = self.client.execute_non_query(&sql, &params)?;
        if touched == 0 {
            return Err(LedgerError::IntegrityError(format!(
                "tracking row {id} for {} disappeared",
                table.full_name()
            )));
        }
        Ok(())
    }

    fn insert_column(&self, table_id: i64, internal_id: i32, column: &Column) -> Result<()> {
        let mut fields = vec!["table_id", "internal_id", "created_on"];
        fields.extend(COLUMN_ATTRIBUTES);
        let mut params = vec![
            Value::Integer(table_id),
            Value::from(internal_id),
            Value::Timestamp(Utc::now()),
        ];
        params.extend(self.column_values(column));
        self.client
            .execute_non_query(&self.insert_sql(COLUMN_TABLE, &fields), &params)?;
        Ok(())
    }

    /// Values for [`COLUMN_ATTRIBUTES`], in order.
    fn column_values(&self, column: &Column) -> Vec<Value> {
        vec![
            Value::from(&column.name),
            Value::from(column.comment.as_deref()),
            Value::from(self.dialect.to_native_type(column)),
            Value::from(column.size),
            Value::from(column.scale),
            Value::from(column.default.as_deref()),
            Value::Bool(column.nullable),
            Value::from(column.reference.as_deref()),
            Value::Bool(column.unique),
            Value::Bool(column.primary_key),
            Value::from(column.check.as_deref()),
            Value::Bool(column.auto_increment),
            Value::Bool(column.indexed),
            Value::from(column.version),
            Value::Integer(column.hash()),
            Value::Timestamp(Utc::now()),
        ]
    }

    /// Re-reads one tracked table into the cache.
    fn refresh(&mut self, id: i64) -> Result<()> {
        let fresh = self.fetch_table(id)?;
        match self.tables.iter_mut().find(|t| t.id == id) {
            Some(slot) => *slot = fresh,
            None => self.tables.push(fresh),
        }
        Ok(())
    }

    fn fetch_table(&self, id: i64) -> Result<TrackedTable> {
        let mut table = self
            .query_tables(Some(id))?
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::IntegrityError(format!("tracking row {id} not found")))?;
        table.columns = self.query_columns(Some(id))?;
        Ok(table)
    }

    fn query_tables(&self, id: Option<i64>) -> Result<Vec<TrackedTable>> {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.field_list(&OBJECT_FIELDS, None),
            self.q(OBJECT_TABLE),
            self.q("object_type"),
            self.p(1)
        );
        let mut params = vec![Value::from(OBJECT_TYPE_TABLE)];
        if let Some(id) = id {
            sql.push_str(&format!(" AND {} = {}", self.q("id"), self.p(2)));
            params.push(Value::Integer(id));
        }
        sql.push_str(&format!(" ORDER BY {}", self.q("id")));
        self.client
            .query(&sql, &params)?
            .iter()
            .map(table_from_row)
            .collect()
    }

    fn query_columns(&self, table_id: Option<i64>) -> Result<Vec<TrackedColumn>> {
        let mut sql = format!(
            "SELECT {} FROM {} c INNER JOIN {} o ON o.{} = c.{}",
            self.field_list(&COLUMN_FIELDS, Some("c")),
            self.q(COLUMN_TABLE),
            self.q(OBJECT_TABLE),
            self.q("id"),
            self.q("table_id")
        );
        let mut params = Vec::new();
        if let Some(id) = table_id {
            sql.push_str(&format!(" WHERE o.{} = {}", self.q("id"), self.p(1)));
            params.push(Value::Integer(id));
        }
        sql.push_str(&format!(
            " ORDER BY c.{}, c.{}",
            self.q("table_id"),
            self.q("id")
        ));
        self.client
            .query(&sql, &params)?
            .iter()
            .map(column_from_row)
            .collect()
    }

    fn query_renames(&self, object_id: Option<i64>) -> Result<Vec<RenameRecord>> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.field_list(&NAME_FIELDS, None),
            self.q(NAME_TABLE)
        );
        let mut params = Vec::new();
        if let Some(id) = object_id {
            sql.push_str(&format!(" WHERE {} = {}", self.q("object_id"), self.p(1)));
            params.push(Value::Integer(id));
        }
        sql.push_str(&format!(" ORDER BY {}", self.q("id")));
        self.client
            .query(&sql, &params)?
            .iter()
            .map(rename_from_row)
            .collect()
    }

    fn insert_sql(&self, table: &str, fields: &[&str]) -> String {
        let placeholders: Vec<String> = (1..=fields.len()).map(|i| self.p(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.q(table),
            self.dialect.column_list(fields),
            placeholders.join(", ")
        )
    }

    fn field_list(&self, fields: &[&str], alias: Option<&str>) -> String {
        fields
            .iter()
            .map(|f| match alias {
                Some(a) => format!("{a}.{}", self.q(f)),
                None => self.q(f),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn q(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    fn p(&self, index: usize) -> String {
        self.dialect.placeholder(index)
    }
}

fn table_from_row(row: &Row) -> Result<TrackedTable> {
    Ok(TrackedTable {
        id: row.i64(0)?,
        schema: row.string(1)?,
        object_type: row.string(2)?,
        name: row.string(3)?,
        hash: row.i64(4)?,
        version: row.i32(5)?,
        category: row.opt_string(6)?,
        comments: row.opt_string(7)?,
        created_on: row.opt_timestamp(8)?,
        updated_on: row.opt_timestamp(9)?,
        columns: Vec::new(),
    })
}

fn column_from_row(row: &Row) -> Result<TrackedColumn> {
    Ok(TrackedColumn {
        id: row.i64(0)?,
        table_id: row.i64(1)?,
        internal_id: row.i32(2)?,
        name: row.string(3)?,
        comments: row.opt_string(4)?,
        column_type: row.string(5)?,
        size: row.u32(6)?,
        scale: row.u32(7)?,
        default_value: row.opt_string(8)?,
        allow_null: row.bool(9)?,
        reference: row.opt_string(10)?,
        is_unique: row.bool(11)?,
        is_pk: row.bool(12)?,
        check: row.opt_string(13)?,
        auto_increment: row.bool(14)?,
        is_index: row.bool(15)?,
        version: row.i32(16)?,
        hash: row.i64(17)?,
        created_on: row.opt_timestamp(18)?,
        updated_on: row.opt_timestamp(19)?,
    })
}

fn rename_from_row(row: &Row) -> Result<RenameRecord> {
    Ok(RenameRecord {
        id: row.i64(0)?,
        schema: row.string(1)?,
        object_type: row.string(2)?,
        object_id: row.i64(3)?,
        name: row.string(4)?,
        hash: row.i64(5)?,
        version: row.i32(6)?,
        created_on: row.opt_timestamp(7)?,
    })
}
