//! SQL dialect abstraction (Strategy pattern).
//!
//! A [`Dialect`] turns the schema model into DDL for one database product.
//! The provided methods render portable SQL in the canonical column order
//! (type, primary key, nullability, unique, default, check, auto-increment,
//! foreign key); products override the hooks where their syntax differs.

use schema_ledger_core::naming::{constraint_name, index_name};
use schema_ledger_core::{Column, ColumnType, Table, TrackedTable};

use crate::client::DbClient;
use crate::diff::{self, ColumnStatus, TableDiff};
use crate::error::Result;

/// Statements that make one table update apply as a unit.
///
/// The builder runs `begin`, the update statements and
/// [`Dialect::check_update`], then `commit`. After any failure it runs every
/// `rollback` statement, logging the ones that fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateGuard {
    pub begin: Vec<String>,
    pub commit: Vec<String>,
    pub rollback: Vec<String>,
}

impl UpdateGuard {
    pub fn is_empty(&self) -> bool {
        self.begin.is_empty() && self.commit.is_empty() && self.rollback.is_empty()
    }
}

/// One database product's DDL idioms.
pub trait Dialect: Send + Sync {
    /// Provider identifier, e.g. `"postgres"`.
    fn name(&self) -> &str;

    /// Quotes an identifier, doubling embedded quote characters.
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quoted `schema.name`, or just the quoted name when `schema` is empty.
    fn qualified_name(&self, schema: &str, name: &str) -> String {
        if schema.is_empty() {
            self.quote_ident(name)
        } else {
            format!("{}.{}", self.quote_ident(schema), self.quote_ident(name))
        }
    }

    /// Prefix of positional parameter placeholders (`$` or `?`).
    fn parameter_prefix(&self) -> &str;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String {
        format!("{}{index}", self.parameter_prefix())
    }

    /// Boolean literal as the product spells it.
    fn to_sql_condition(&self, value: bool) -> String;

    /// Whether the product indexes `UNIQUE` columns on its own.
    fn auto_unique_index(&self) -> bool {
        true
    }

    /// Whether check constraints render as named table-level constraints.
    fn enable_outline_check_constraint(&self) -> bool {
        false
    }

    /// Whether column constraints carry generated `uq_`/`ck_`/`fk_` names.
    fn named_constraints(&self) -> bool {
        false
    }

    /// Whether [`create_database`](Self::create_database) may be attempted.
    fn can_create(&self) -> bool;

    fn database_exists(&self, client: &dyn DbClient) -> Result<bool>;

    fn create_database(&self, client: &dyn DbClient) -> Result<()>;

    /// Query whose non-null, non-empty scalar result means the table exists.
    fn table_exist_sql(&self, schema: &str, name: &str) -> String;

    /// Native type text for a column, e.g. `VARCHAR(50)`.
    fn to_native_type(&self, column: &Column) -> String;

    fn primary_key_clause(&self, _column: &Column) -> String {
        "PRIMARY KEY".to_string()
    }

    fn auto_increment_clause(&self, _column: &Column) -> Option<String> {
        None
    }

    /// Renders a default expression; boolean literals go through
    /// [`to_sql_condition`](Self::to_sql_condition).
    fn render_default(&self, column: &Column, expr: &str) -> String {
        if column.column_type == ColumnType::Boolean {
            match expr.trim().to_ascii_lowercase().as_str() {
                "true" => return self.to_sql_condition(true),
                "false" => return self.to_sql_condition(false),
                _ => {}
            }
        }
        expr.to_string()
    }

    /// `CONSTRAINT "name" ` when constraints are named, otherwise empty.
    fn constraint_prefix(&self, kind: &str, table: &Table, column: &Column) -> String {
        if self.named_constraints() {
            format!(
                "CONSTRAINT {} ",
                self.quote_ident(&constraint_name(kind, &table.name, &column.name))
            )
        } else {
            String::new()
        }
    }

    /// Full column definition in canonical clause order.
    fn column_definition(&self, table: &Table, column: &Column, inline_pk: bool) -> String {
        let mut parts = vec![self.quote_ident(&column.name), self.to_native_type(column)];
        if inline_pk {
            parts.push(self.primary_key_clause(column));
        }
        parts.push(if column.nullable && !column.primary_key {
            "NULL".to_string()
        } else {
            "NOT NULL".to_string()
        });
        if column.unique && !column.primary_key {
            parts.push(format!("{}UNIQUE", self.constraint_prefix("uq", table, column)));
        }
        if let Some(expr) = &column.default {
            parts.push(format!("DEFAULT {}", self.render_default(column, expr)));
        }
        if !self.enable_outline_check_constraint() {
            if let Some(expr) = &column.check {
                parts.push(format!(
                    "{}CHECK ({expr})",
                    self.constraint_prefix("ck", table, column)
                ));
            }
        }
        if column.auto_increment {
            if let Some(clause) = self.auto_increment_clause(column) {
                parts.push(clause);
            }
        }
        if let Some(target) = &column.reference {
            parts.push(format!(
                "{}REFERENCES {target}",
                self.constraint_prefix("fk", table, column)
            ));
        }
        parts.join(" ")
    }

    /// One `CREATE TABLE` followed by one `CREATE INDEX` per registered index.
    fn table_create_sqls(&self, table: &Table) -> Vec<String> {
        let pk = table.primary_key_columns();
        let inline = pk.len() == 1;
        let mut defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(table, c, inline && c.primary_key))
            .collect();
        if pk.len() > 1 {
            defs.push(format!("PRIMARY KEY ({})", self.column_list(&pk)));
        }
        if self.enable_outline_check_constraint() {
            for column in table.columns.iter().filter(|c| c.check.is_some()) {
                defs.push(self.outline_check_sql(table, column));
            }
        }

        let mut sqls = vec![format!(
            "CREATE TABLE {} ({})",
            self.qualified_name(&table.schema, &table.name),
            defs.join(", ")
        )];
        sqls.extend(self.index_sqls(table, false));
        sqls
    }

    /// Table-level `CONSTRAINT ck_... CHECK (...)` for a column with a check.
    fn outline_check_sql(&self, table: &Table, column: &Column) -> String {
        format!(
            "CONSTRAINT {} CHECK ({})",
            self.quote_ident(&constraint_name("ck", &table.name, &column.name)),
            column.check.as_deref().unwrap_or_default()
        )
    }

    /// Comma-separated quoted column names.
    fn column_list(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns `true` when the product already indexes `columns` through a
    /// unique or single-column primary key constraint.
    fn index_is_implicit(&self, table: &Table, columns: &[String]) -> bool {
        let [single] = columns else {
            return false;
        };
        match table.column(single) {
            Some(c) => {
                (c.unique && self.auto_unique_index())
                    || (c.primary_key && table.primary_key_columns().len() == 1)
            }
            None => false,
        }
    }

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
            self.quote_ident(name),
            self.qualified_name(&table.schema, &table.name),
            self.column_list(&cols)
        )
    }

    /// `CREATE INDEX` for every registered index that is not implicit.
    fn index_sqls(&self, table: &Table, if_not_exists: bool) -> Vec<String> {
        table
            .indexes
            .iter()
            .filter(|(_, cols)| !self.index_is_implicit(table, cols))
            .map(|(name, cols)| self.create_index_sql(table, name, cols, if_not_exists))
            .collect()
    }

    /// Indexes touching a column that was added or newly flagged indexed.
    ///
    /// Indexes are only ever created here; an index dropped from the
    /// declaration stays in the database.
    fn index_sqls_for_changes(&self, table: &Table, diff: &TableDiff) -> Vec<String> {
        let touched: Vec<&str> = diff
            .columns
            .iter()
            .filter(|c| {
                c.status == ColumnStatus::Added
                    || (c.changes.index && table.columns[c.position].indexed)
            })
            .map(|c| c.name.as_str())
            .collect();
        table
            .indexes
            .iter()
            .filter(|(_, cols)| {
                cols.iter()
                    .any(|c| touched.iter().any(|t| t.eq_ignore_ascii_case(c)))
            })
            .filter(|(_, cols)| !self.index_is_implicit(table, cols))
            .map(|(name, cols)| self.create_index_sql(table, name, cols, true))
            .collect()
    }

    /// Compares the declaration with its tracking record.
    fn analyse_table_change(&self, table: &Table, tracked: &TrackedTable) -> TableDiff {
        diff::analyse(self, table, tracked)
    }

    /// Moves an index from `old` to `new`; the default drops and recreates it.
    fn index_rename_sqls(
        &self,
        table: &Table,
        old: &str,
        new: &str,
        columns: &[String],
    ) -> Vec<String> {
        vec![
            format!(
                "DROP INDEX IF EXISTS {}",
                self.qualified_name(&table.schema, old)
            ),
            self.create_index_sql(table, new, columns, true),
        ]
    }

    /// Renames the auto-registered indexes of indexed columns whose table or
    /// column name changed, so they keep matching `idx_{table}_{column}`.
    fn renamed_index_sqls(&self, table: &Table, diff: &TableDiff) -> Vec<String> {
        let old_table = diff.previous_name.as_deref().unwrap_or(&table.name);
        let mut sqls = Vec::new();
        for entry in &diff.columns {
            if entry.status == ColumnStatus::Added || entry.changes.index {
                continue;
            }
            let Some(column) = table.columns.get(entry.position) else {
                continue;
            };
            if !column.indexed {
                continue;
            }
            let old = index_name(old_table, entry.live_name());
            let new = index_name(&table.name, &column.name);
            if old == new {
                continue;
            }
            match table.indexes.get(&new) {
                Some(cols) if !self.index_is_implicit(table, cols) => {
                    sqls.extend(self.index_rename_sqls(table, &old, &new, cols));
                }
                _ => {}
            }
        }
        sqls
    }

    /// Ordered statements reconciling the live table with `diff`.
    fn table_update_sqls(&self, table: &Table, diff: &TableDiff) -> Vec<String>;

    /// Guard for the statements of [`table_update_sqls`](Self::table_update_sqls).
    /// Empty by default: every statement commits on its own.
    fn update_guard(&self, _table: &Table, _diff: &TableDiff) -> UpdateGuard {
        UpdateGuard::default()
    }

    /// Verifies the updated table before its guard commits.
    fn check_update(&self, _client: &dyn DbClient, _table: &Table) -> Result<()> {
        Ok(())
    }

    fn table_rename_sql(&self, schema: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.qualified_name(schema, old_name),
            self.quote_ident(new_name)
        )
    }
}

/// Escapes a value for use inside a single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use schema_ledger_core::TrackedColumn;

    use super::*;
    use crate::diff::analyse;

    /// Only the required methods; everything else uses the defaults.
    struct PlainDialect;

    impl Dialect for PlainDialect {
        fn name(&self) -> &str {
            "plain"
        }

        fn parameter_prefix(&self) -> &str {
            "?"
        }

        fn to_sql_condition(&self, value: bool) -> String {
            if value { "1" } else { "0" }.to_string()
        }

        fn can_create(&self) -> bool {
            false
        }

        fn database_exists(&self, _client: &dyn DbClient) -> Result<bool> {
            Ok(true)
        }

        fn create_database(&self, _client: &dyn DbClient) -> Result<()> {
            Ok(())
        }

        fn table_exist_sql(&self, _schema: &str, name: &str) -> String {
            format!("SELECT {}", quote_literal(name))
        }

        fn to_native_type(&self, column: &Column) -> String {
            format!("{:?}", column.column_type).to_uppercase()
        }

        fn table_update_sqls(&self, table: &Table, diff: &TableDiff) -> Vec<String> {
            self.renamed_index_sqls(table, diff)
        }
    }

    fn tracked_from(name: &str, table: &Table) -> TrackedTable {
        TrackedTable {
            id: 1,
            name: name.into(),
            version: table.version,
            columns: table
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| TrackedColumn {
                    id: i as i64 + 1,
                    internal_id: c.internal_id,
                    name: c.name.clone(),
                    column_type: PlainDialect.to_native_type(c),
                    size: c.size,
                    allow_null: c.nullable,
                    is_pk: c.primary_key,
                    is_unique: c.unique,
                    is_index: c.indexed,
                    version: c.version,
                    ..TrackedColumn::default()
                })
                .collect(),
            ..TrackedTable::default()
        }
    }

    #[test]
    fn test_quoting() {
        assert_eq!(PlainDialect.quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(PlainDialect.qualified_name("", "orders"), "\"orders\"");
        assert_eq!(PlainDialect.qualified_name("app", "orders"), "\"app\".\"orders\"");
        assert_eq!(PlainDialect.placeholder(4), "?4");
        assert_eq!(quote_literal("o'clock"), "'o''clock'");
        assert_eq!(
            PlainDialect.table_rename_sql("app", "orders", "sales_orders"),
            "ALTER TABLE \"app\".\"orders\" RENAME TO \"sales_orders\""
        );
    }

    #[test]
    fn test_column_definition_clause_order() {
        let mut table = Table::new("users");
        table.add_column(
            Column::new("active", ColumnType::Boolean)
                .not_null()
                .unique()
                .with_default("true")
                .with_check("active IN (0, 1)")
                .references("flags(id)"),
        );
        assert_eq!(
            PlainDialect.column_definition(&table, &table.columns[0], false),
            "\"active\" BOOLEAN NOT NULL UNIQUE DEFAULT 1 CHECK (active IN (0, 1)) \
             REFERENCES flags(id)"
        );
    }

    #[test]
    fn test_unique_and_key_columns_need_no_index() {
        let mut table = Table::new("users");
        table
            .add_pk_column(Column::new("id", ColumnType::Int64).indexed())
            .add_column(Column::new("email", ColumnType::String).unique().indexed())
            .add_column(Column::new("name", ColumnType::String).indexed());
        assert_eq!(
            PlainDialect.index_sqls(&table, false),
            vec!["CREATE INDEX \"idx_users_name\" ON \"users\" (\"name\")".to_string()]
        );
    }

    #[test]
    fn test_table_rename_recreates_auto_named_indexes() {
        let mut before = Table::new("orders");
        before
            .add_pk_column(Column::new("id", ColumnType::Int64))
            .add_column(Column::new("status", ColumnType::String).indexed());
        let tracked = tracked_from("orders", &before);

        let mut after = Table::new("sales_orders");
        after
            .add_pk_column(Column::new("id", ColumnType::Int64))
            .add_column(Column::new("status", ColumnType::String).indexed())
            .add_column(Column::new("region", ColumnType::String).indexed());
        let diff = analyse(&PlainDialect, &after, &tracked);

        assert_eq!(
            PlainDialect.table_update_sqls(&after, &diff),
            vec![
                "DROP INDEX IF EXISTS \"idx_orders_status\"".to_string(),
                "CREATE INDEX IF NOT EXISTS \"idx_sales_orders_status\" ON \"sales_orders\" \
                 (\"status\")"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_unchanged_table_keeps_its_indexes() {
        let mut table = Table::new("orders");
        table.add_column(Column::new("status", ColumnType::String).indexed());
        let diff = analyse(&PlainDialect, &table, &tracked_from("orders", &table));
        assert!(PlainDialect.table_update_sqls(&table, &diff).is_empty());
        assert!(PlainDialect.update_guard(&table, &diff).is_empty());
    }
}
