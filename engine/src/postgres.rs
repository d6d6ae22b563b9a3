//! Standard PostgreSQL dialect.

use schema_ledger_core::naming::constraint_name;
use schema_ledger_core::{Column, ColumnType, Table};

use crate::client::DbClient;
use crate::dialect::{Dialect, quote_literal};
use crate::diff::{ColumnDiff, ColumnStatus, TableDiff};
use crate::error::{LedgerError, Result};

/// PostgreSQL DDL.
///
/// Auto-increment columns are identity columns, column constraints carry
/// generated `uq_`/`ck_`/`fk_` names so they can be dropped and re-added
/// on change, and check constraints render at table level.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    fn alter_prefix(&self, table: &Table) -> String {
        format!(
            "ALTER TABLE {}",
            self.qualified_name(&table.schema, &table.name)
        )
    }

    fn alter_column(&self, table: &Table, column: &str, action: &str) -> String {
        format!(
            "{} ALTER COLUMN {} {action}",
            self.alter_prefix(table),
            self.quote_ident(column)
        )
    }

    /// Drops the generated constraint under its current name and, after a
    /// table or column rename, under the name it was created with.
    fn drop_constraint(
        &self,
        table: &Table,
        kind: &str,
        column: &str,
        created_as: (&str, &str),
    ) -> Vec<String> {
        let current = constraint_name(kind, &table.name, column);
        let original = constraint_name(kind, created_as.0, created_as.1);
        let mut names = vec![original];
        if names[0] != current {
            names.push(current);
        }
        names
            .iter()
            .map(|name| {
                format!(
                    "{} DROP CONSTRAINT IF EXISTS {}",
                    self.alter_prefix(table),
                    self.quote_ident(name)
                )
            })
            .collect()
    }

    fn add_constraint(&self, table: &Table, kind: &str, column: &str, body: &str) -> String {
        format!(
            "{} ADD CONSTRAINT {} {body}",
            self.alter_prefix(table),
            self.quote_ident(&constraint_name(kind, &table.name, column))
        )
    }

    /// Statements for one matched or renamed column whose attributes changed.
    fn modify_column_sqls(
        &self,
        table: &Table,
        column: &Column,
        diff: &ColumnDiff,
        old_table: &str,
    ) -> Vec<String> {
        let changes = diff.changes;
        let name = column.name.as_str();
        let created_as = (old_table, diff.live_name());
        let mut sqls = Vec::new();

        if changes.type_changed() {
            let native = self.to_native_type(column);
            sqls.push(self.alter_column(
                table,
                name,
                &format!("TYPE {native} USING {}::{native}", self.quote_ident(name)),
            ));
        }
        if changes.nullability {
            let action = if column.nullable && !column.primary_key {
                "DROP NOT NULL"
            } else {
                "SET NOT NULL"
            };
            sqls.push(self.alter_column(table, name, action));
        }
        if changes.default {
            match &column.default {
                Some(expr) => sqls.push(self.alter_column(
                    table,
                    name,
                    &format!("SET DEFAULT {}", self.render_default(column, expr)),
                )),
                None => sqls.push(self.alter_column(table, name, "DROP DEFAULT")),
            }
        }
        if changes.unique {
            sqls.extend(self.drop_constraint(table, "uq", name, created_as));
            if column.unique && !column.primary_key {
                sqls.push(self.add_constraint(
                    table,
                    "uq",
                    name,
                    &format!("UNIQUE ({})", self.quote_ident(name)),
                ));
            }
        }
        if changes.check {
            sqls.extend(self.drop_constraint(table, "ck", name, created_as));
            if let Some(expr) = &column.check {
                sqls.push(self.add_constraint(table, "ck", name, &format!("CHECK ({expr})")));
            }
        }
        if changes.reference {
            sqls.extend(self.drop_constraint(table, "fk", name, created_as));
            if let Some(target) = &column.reference {
                sqls.push(self.add_constraint(
                    table,
                    "fk",
                    name,
                    &format!("FOREIGN KEY ({}) REFERENCES {target}", self.quote_ident(name)),
                ));
            }
        }
        if changes.auto_increment {
            let action = if column.auto_increment {
                "ADD GENERATED BY DEFAULT AS IDENTITY"
            } else {
                "DROP IDENTITY IF EXISTS"
            };
            sqls.push(self.alter_column(table, name, action));
        }
        sqls
    }

    /// Drops the current primary key and re-adds it over the declared key.
    ///
    /// The key is looked up in `pg_constraint`: a renamed table keeps the
    /// `{old}_pkey` name it was created with.
    fn primary_key_rebuild_sqls(&self, table: &Table) -> Vec<String> {
        let target = quote_literal(&self.qualified_name(&table.schema, &table.name));
        let mut sqls = vec![format!(
            "DO $$ DECLARE pk text; BEGIN \
             SELECT conname INTO pk FROM pg_constraint \
             WHERE conrelid = {target}::regclass AND contype = 'p'; \
             IF pk IS NOT NULL THEN \
             EXECUTE format('ALTER TABLE %s DROP CONSTRAINT %I', {target}, pk); \
             END IF; END $$"
        )];
        let pk = table.primary_key_columns();
        if !pk.is_empty() {
            sqls.push(format!(
                "{} ADD PRIMARY KEY ({})",
                self.alter_prefix(table),
                self.column_list(&pk)
            ));
        }
        sqls
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn parameter_prefix(&self) -> &str {
        "$"
    }

    fn to_sql_condition(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }

    fn enable_outline_check_constraint(&self) -> bool {
        true
    }

    fn named_constraints(&self) -> bool {
        true
    }

    fn can_create(&self) -> bool {
        false
    }

    fn database_exists(&self, client: &dyn DbClient) -> Result<bool> {
        let found = client.execute_scalar(
            "SELECT datname FROM pg_database WHERE datname = current_database()",
            &[],
        )?;
        Ok(found.is_some_and(|v| v.is_present()))
    }

    fn create_database(&self, _client: &dyn DbClient) -> Result<()> {
        Err(LedgerError::PreconditionError(
            "PostgreSQL databases must be created by an administrator".into(),
        ))
    }

    fn table_exist_sql(&self, schema: &str, name: &str) -> String {
        format!(
            "SELECT to_regclass({})::text",
            quote_literal(&self.qualified_name(schema, name))
        )
    }

    fn to_native_type(&self, column: &Column) -> String {
        let size = column.size;
        match column.column_type {
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::Byte | ColumnType::Int16 => "SMALLINT".into(),
            ColumnType::Int32 => "INTEGER".into(),
            ColumnType::Int64 => "BIGINT".into(),
            ColumnType::Decimal if size > 0 => format!("NUMERIC({size},{})", column.scale),
            ColumnType::Decimal => "NUMERIC".into(),
            ColumnType::Float => "REAL".into(),
            ColumnType::Double => "DOUBLE PRECISION".into(),
            ColumnType::String if size > 0 => format!("VARCHAR({size})"),
            ColumnType::String => "VARCHAR".into(),
            ColumnType::FixedString => format!("CHAR({})", size.max(1)),
            ColumnType::Text => "TEXT".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::DateTime => "TIMESTAMP".into(),
            ColumnType::Time => "TIME".into(),
            ColumnType::Guid => "UUID".into(),
            ColumnType::Binary => "BYTEA".into(),
            ColumnType::Json => "JSONB".into(),
        }
    }

    fn auto_increment_clause(&self, _column: &Column) -> Option<String> {
        Some("GENERATED BY DEFAULT AS IDENTITY".into())
    }

    /// Indexes live in the table's schema and are renamed in place.
    fn index_rename_sqls(
        &self,
        table: &Table,
        old: &str,
        new: &str,
        _columns: &[String],
    ) -> Vec<String> {
        vec![format!(
            "ALTER INDEX IF EXISTS {} RENAME TO {}",
            self.qualified_name(&table.schema, old),
            self.quote_ident(new)
        )]
    }

    fn table_update_sqls(&self, table: &Table, diff: &TableDiff) -> Vec<String> {
        let old_table = diff.previous_name.as_deref().unwrap_or(&table.name);
        let mut sqls = Vec::new();
        let mut rebuild_pk = false;

        for entry in &diff.columns {
            let Some(column) = table.columns.get(entry.position) else {
                continue;
            };
            match &entry.status {
                ColumnStatus::Added => {
                    sqls.push(format!(
                        "{} ADD COLUMN {}",
                        self.alter_prefix(table),
                        self.column_definition(table, column, false)
                    ));
                    if column.check.is_some() {
                        sqls.push(format!(
                            "{} ADD {}",
                            self.alter_prefix(table),
                            self.outline_check_sql(table, column)
                        ));
                    }
                    rebuild_pk |= column.primary_key;
                    continue;
                }
                ColumnStatus::Renamed { from } => {
                    sqls.push(format!(
                        "{} RENAME COLUMN {} TO {}",
                        self.alter_prefix(table),
                        self.quote_ident(from),
                        self.quote_ident(&column.name)
                    ));
                }
                ColumnStatus::Matched => {}
            }
            sqls.extend(self.modify_column_sqls(table, column, entry, old_table));
            rebuild_pk |= entry.changes.primary_key;
        }

        if rebuild_pk {
            sqls.extend(self.primary_key_rebuild_sqls(table));
        }
        sqls.extend(self.renamed_index_sqls(table, diff));
        sqls.extend(self.index_sqls_for_changes(table, diff));
        sqls
    }
}
