//! SQLite dialect.
//!
//! SQLite's `ALTER TABLE` can only rename tables and columns and append
//! simple columns. Every other change goes through a table rebuild:
//!
//! 1. drop a `{table}__rebuild` table left behind by an interrupted run
//! 2. `CREATE TABLE {table}__rebuild` with the declared columns plus the
//!    orphaned tracked columns
//! 3. `INSERT INTO ... SELECT` the surviving columns (renamed columns are
//!    read under their live name)
//! 4. `DROP TABLE` the old table
//! 5. `ALTER TABLE {table}__rebuild RENAME TO {table}`
//! 6. recreate the declared indexes
//!
//! A rebuild runs with foreign key enforcement off inside a savepoint and
//! is released only when `PRAGMA foreign_key_check` finds nothing, so a
//! failed step leaves the original table untouched.

use schema_ledger_core::{Column, ColumnType, Table, TrackedColumn};
use schema_ledger_engine::{
    ColumnStatus, DbClient, Dialect, LedgerError, Result, TableDiff, UpdateGuard, quote_literal,
};

/// Suffix of the temporary table used by a rebuild.
pub const REBUILD_SUFFIX: &str = "__rebuild";

const REBUILD_SAVEPOINT: &str = "schema_ledger_rebuild";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }

    /// Whether `diff` needs more than `RENAME COLUMN` and `ADD COLUMN`.
    pub fn needs_rebuild(&self, table: &Table, diff: &TableDiff) -> bool {
        diff.columns.iter().any(|entry| match entry.status {
            ColumnStatus::Added => table
                .columns
                .get(entry.position)
                .is_some_and(|c| !self.can_add_column(c)),
            _ => entry.changes.any(),
        })
    }

    /// `ADD COLUMN` cannot add key, unique or auto-increment columns, a
    /// NOT NULL column without a default, or a default that is not a
    /// constant. A referencing column may only default to NULL.
    fn can_add_column(&self, column: &Column) -> bool {
        let default = column.default.as_deref().map(str::trim).filter(|d| !d.is_empty());
        if default.is_some_and(|d| !is_constant_default(d)) {
            return false;
        }
        if column.reference.is_some() && default.is_some_and(|d| !d.eq_ignore_ascii_case("null")) {
            return false;
        }
        !(column.primary_key
            || column.unique
            || column.auto_increment
            || (!column.nullable && default.is_none()))
    }

    fn orphan_definition(&self, column: &TrackedColumn) -> String {
        let mut def = format!(
            "{} {} {}",
            self.quote_ident(&column.name),
            column.column_type,
            if column.allow_null { "NULL" } else { "NOT NULL" }
        );
        if let Some(expr) = column.default_value.as_deref().filter(|d| !d.trim().is_empty()) {
            def.push_str(&format!(" DEFAULT {expr}"));
        }
        def
    }

    fn rebuild_sqls(&self, table: &Table, diff: &TableDiff) -> Vec<String> {
        let temp = format!("{}{REBUILD_SUFFIX}", table.name);
        let pk = table.primary_key_columns();
        let inline = pk.len() == 1;

        let mut defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(table, c, inline && c.primary_key))
            .collect();
        defs.extend(diff.orphaned.iter().map(|o| self.orphan_definition(o)));
        if pk.len() > 1 {
            defs.push(format!("PRIMARY KEY ({})", self.column_list(&pk)));
        }

        let mut targets: Vec<String> = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        for entry in diff.columns.iter().filter(|c| c.status != ColumnStatus::Added) {
            targets.push(self.quote_ident(&entry.name));
            let source = self.quote_ident(entry.live_name());
            // NULLs copied into a column that became NOT NULL take its default.
            let fill = table
                .columns
                .get(entry.position)
                .filter(|c| entry.changes.nullability && !c.nullable)
                .and_then(|c| {
                    let expr = c.default.as_deref().filter(|d| !d.trim().is_empty())?;
                    Some(self.render_default(c, expr))
                });
            sources.push(match fill {
                Some(expr) => format!("COALESCE({source}, {expr})"),
                None => source,
            });
        }
        for orphan in &diff.orphaned {
            targets.push(self.quote_ident(&orphan.name));
            sources.push(self.quote_ident(&orphan.name));
        }

        let live = self.qualified_name(&table.schema, &table.name);
        let rebuilt = self.qualified_name(&table.schema, &temp);
        let mut sqls = vec![
            format!("DROP TABLE IF EXISTS {rebuilt}"),
            format!("CREATE TABLE {rebuilt} ({})", defs.join(", ")),
        ];
        if !targets.is_empty() {
            sqls.push(format!(
                "INSERT INTO {rebuilt} ({}) SELECT {} FROM {live}",
                targets.join(", "),
                sources.join(", ")
            ));
        }
        sqls.push(format!("DROP TABLE {live}"));
        sqls.push(self.table_rename_sql(&table.schema, &temp, &table.name));
        sqls.extend(self.index_sqls(table, true));
        sqls
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn parameter_prefix(&self) -> &str {
        "?"
    }

    fn to_sql_condition(&self, value: bool) -> String {
        if value { "1" } else { "0" }.to_string()
    }

    fn can_create(&self) -> bool {
        true
    }

    /// Opening a connection creates the file, so the database always exists.
    fn database_exists(&self, _client: &dyn DbClient) -> Result<bool> {
        Ok(true)
    }

    fn create_database(&self, _client: &dyn DbClient) -> Result<()> {
        Ok(())
    }

    fn table_exist_sql(&self, schema: &str, name: &str) -> String {
        let master = if schema.is_empty() {
            "sqlite_master".to_string()
        } else {
            format!("{}.sqlite_master", self.quote_ident(schema))
        };
        format!(
            "SELECT name FROM {master} WHERE type = 'table' AND name = {} COLLATE NOCASE",
            quote_literal(name)
        )
    }

    fn to_native_type(&self, column: &Column) -> String {
        let size = column.size;
        match column.column_type {
            ColumnType::Boolean => "BOOLEAN".into(),
            // Only the exact name INTEGER makes a rowid alias for AUTOINCREMENT.
            ColumnType::Byte | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => {
                "INTEGER".into()
            }
            ColumnType::Decimal if size > 0 => format!("NUMERIC({size},{})", column.scale),
            ColumnType::Decimal => "NUMERIC".into(),
            ColumnType::Float | ColumnType::Double => "REAL".into(),
            ColumnType::String if size > 0 => format!("VARCHAR({size})"),
            ColumnType::String | ColumnType::Text | ColumnType::Json => "TEXT".into(),
            ColumnType::FixedString => format!("CHAR({})", size.max(1)),
            ColumnType::Date => "DATE".into(),
            ColumnType::DateTime => "DATETIME".into(),
            ColumnType::Time => "TIME".into(),
            ColumnType::Guid => "CHAR(36)".into(),
            ColumnType::Binary => "BLOB".into(),
        }
    }

    /// `AUTOINCREMENT` must follow `PRIMARY KEY` directly.
    fn primary_key_clause(&self, column: &Column) -> String {
        if column.auto_increment {
            "PRIMARY KEY AUTOINCREMENT".into()
        } else {
            "PRIMARY KEY".into()
        }
    }

    /// SQLite qualifies the index, not the indexed table.
    fn create_index_sql(
        &self,
        table: &Table,
        name: &str,
        columns: &[String],
        if_not_exists: bool,
    ) -> String {
        let cols: Vec<&str> = columns.iter().map(String::as_str).collect();
        format!(
            "CREATE INDEX {}{} ON {} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            self.qualified_name(&table.schema, name),
            self.quote_ident(&table.name),
            self.column_list(&cols)
        )
    }

    fn table_update_sqls(&self, table: &Table, diff: &TableDiff) -> Vec<String> {
        if self.needs_rebuild(table, diff) {
            return self.rebuild_sqls(table, diff);
        }

        let live = self.qualified_name(&table.schema, &table.name);
        let mut sqls = Vec::new();
        for entry in &diff.columns {
            let Some(column) = table.columns.get(entry.position) else {
                continue;
            };
            match &entry.status {
                ColumnStatus::Renamed { from } => sqls.push(format!(
                    "ALTER TABLE {live} RENAME COLUMN {} TO {}",
                    self.quote_ident(from),
                    self.quote_ident(&column.name)
                )),
                ColumnStatus::Added => sqls.push(format!(
                    "ALTER TABLE {live} ADD COLUMN {}",
                    self.column_definition(table, column, false)
                )),
                ColumnStatus::Matched => {}
            }
        }
        sqls.extend(self.renamed_index_sqls(table, diff));
        sqls.extend(self.index_sqls_for_changes(table, diff));
        sqls
    }

    /// A rebuild drops the live table, so foreign keys are off while it runs.
    fn update_guard(&self, table: &Table, diff: &TableDiff) -> UpdateGuard {
        if !self.needs_rebuild(table, diff) {
            return UpdateGuard::default();
        }
        UpdateGuard {
            begin: vec![
                "PRAGMA foreign_keys = OFF".into(),
                format!("SAVEPOINT {REBUILD_SAVEPOINT}"),
            ],
            commit: vec![
                format!("RELEASE {REBUILD_SAVEPOINT}"),
                "PRAGMA foreign_keys = ON".into(),
            ],
            rollback: vec![
                format!("ROLLBACK TO {REBUILD_SAVEPOINT}"),
                format!("RELEASE {REBUILD_SAVEPOINT}"),
                "PRAGMA foreign_keys = ON".into(),
            ],
        }
    }

    fn check_update(&self, client: &dyn DbClient, table: &Table) -> Result<()> {
        let prefix = if table.schema.is_empty() {
            String::new()
        } else {
            format!("{}.", self.quote_ident(&table.schema))
        };
        let sql = format!(
            "PRAGMA {prefix}foreign_key_check({})",
            self.quote_ident(&table.name)
        );
        let violations = client.query(&sql, &[])?;
        let Some(first) = violations.first() else {
            return Ok(());
        };
        let parent = first.opt_string(2)?.unwrap_or_default();
        Err(LedgerError::ConstraintError(format!(
            "{} row(s) of {} reference missing rows of {parent}",
            violations.len(),
            table.full_name()
        )))
    }
}

/// Whether `expr` is a literal: a number, a string or blob, NULL, TRUE or FALSE.
fn is_constant_default(expr: &str) -> bool {
    let expr = expr.trim();
    if matches!(expr.to_ascii_uppercase().as_str(), "NULL" | "TRUE" | "FALSE") {
        return true;
    }
    let quoted = expr
        .strip_prefix(['x', 'X'])
        .unwrap_or(expr)
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''));
    if let Some(body) = quoted {
        return !body.replace("''", "").contains('\'');
    }
    let number = expr.strip_prefix(['+', '-']).unwrap_or(expr);
    number.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && number
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && number.parse::<f64>().is_ok()
}
