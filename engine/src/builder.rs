//! Migration orchestration.
//!
//! A [`SchemaBuilder`] owns a database client, a dialect and the tables
//! registered for one run. [`build`](SchemaBuilder::build) walks every
//! table through the reconciliation state machine:
//!
//! ```text
//! NotExists -> Create -> Tracked                      (first run)
//! Tracked -> NoChange | Renamed -> Altered | Altered  (later runs)
//! ```
//!
//! Each statement commits on its own unless the dialect wraps the update in
//! an [`UpdateGuard`](crate::UpdateGuard). A failing table is recorded and
//! the batch moves on; only tracking-integrity errors abort the run.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use schema_ledger_core::{Table, TrackedTable, validate_table};
use tracing::{debug, info, warn};

use crate::catalog::DialectCatalog;
use crate::client::DbClient;
use crate::config::BuildConfig;
use crate::dialect::Dialect;
use crate::diff::TableDiff;
use crate::error::{LedgerError, Result};
use crate::tracking::{TrackingStore, tracking_tables};

/// One-time guard for creating the tracking tables.
///
/// Builders that share one `Arc<BootstrapFlag>` bootstrap at most once
/// between them, even from several threads; a failed bootstrap leaves the
/// flag unset so the next build retries.
#[derive(Debug, Default)]
pub struct BootstrapFlag {
    done: Mutex<bool>,
}

impl BootstrapFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn is_done(&self) -> bool {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `bootstrap` unless an earlier call succeeded.
    ///
    /// The lock is held while `bootstrap` runs, so concurrent callers wait
    /// for the first one and then skip. Returns `true` if `bootstrap` ran.
    pub fn run_once<F>(&self, bootstrap: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        if *done {
            return Ok(false);
        }
        bootstrap()?;
        *done = true;
        Ok(true)
    }
}

/// Per-run settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Schema given to registered tables that leave theirs empty.
    pub default_schema: String,
    /// Render and report statements without executing DDL or tracking writes.
    pub dry_run: bool,
}

impl From<&BuildConfig> for BuildOptions {
    fn from(config: &BuildConfig) -> Self {
        Self {
            default_schema: config.default_schema.clone(),
            dry_run: config.dry_run,
        }
    }
}

/// What a build did to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// Created and registered.
    Created,
    /// Already present live; registered without DDL.
    Registered,
    /// Tracked but missing live; created again and re-registered.
    Recreated,
    /// Renamed from its tracked name, possibly with column changes.
    Renamed { from: String },
    /// Column changes applied.
    Altered,
    Unchanged,
    /// Reconciliation stopped at an error; later tables still ran.
    Failed { error: String },
}

impl TableOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TableOutcome::Failed { .. })
    }
}

impl fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOutcome::Created => f.write_str("created"),
            TableOutcome::Registered => f.write_str("registered"),
            TableOutcome::Recreated => f.write_str("recreated"),
            TableOutcome::Renamed { from } => write!(f, "renamed from {from}"),
            TableOutcome::Altered => f.write_str("altered"),
            TableOutcome::Unchanged => f.write_str("unchanged"),
            TableOutcome::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Outcome and statements of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    /// Schema-qualified table name.
    pub table: String,
    pub outcome: TableOutcome,
    /// DDL issued (or, in a dry run, rendered) in order.
    pub statements: Vec<String>,
}

/// Summary of the last [`SchemaBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Whether the tracking tables were created by this build.
    pub bootstrapped: bool,
    pub tables: Vec<TableReport>,
}

impl BuildReport {
    pub fn failures(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| t.outcome.is_failure())
    }

    pub fn statement_count(&self) -> usize {
        self.tables.iter().map(|t| t.statements.len()).sum()
    }

    /// Returns `true` if no table needed DDL or tracking registration.
    pub fn is_noop(&self) -> bool {
        self.tables
            .iter()
            .all(|t| t.outcome == TableOutcome::Unchanged && t.statements.is_empty())
    }
}

/// Reconciles registered tables with a live database.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use schema_ledger_core::{Column, ColumnType, Table};
/// use schema_ledger_engine::{DbClient, PostgresDialect, SchemaBuilder};
///
/// fn migrate(client: impl DbClient) -> schema_ledger_engine::Result<bool> {
///     let mut orders = Table::new("orders");
///     orders
///         .add_pk_column(Column::new("id", ColumnType::Int64).auto_increment())
///         .add_column(Column::new("status", ColumnType::String).with_size(10));
///
///     let mut builder = SchemaBuilder::new(client, Arc::new(PostgresDialect::new()));
///     builder.register(orders)?;
///     builder.build()
/// }
/// ```
pub struct SchemaBuilder<C> {
    client: C,
    dialect: Arc<dyn Dialect>,
    options: BuildOptions,
    bootstrap: Arc<BootstrapFlag>,
    tables: Vec<Table>,
    last_error: Option<String>,
    report: BuildReport,
}

impl<C: DbClient> SchemaBuilder<C> {
    pub fn new(client: C, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            client,
            dialect,
            options: BuildOptions::default(),
            bootstrap: BootstrapFlag::shared(),
            tables: Vec::new(),
            last_error: None,
            report: BuildReport::default(),
        }
    }

    /// Validates `config` and looks up its provider in `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConfigError`] for an invalid configuration and
    /// [`LedgerError::UnknownProvider`] when no dialect is registered.
    pub fn from_config(client: C, config: &BuildConfig, catalog: &DialectCatalog) -> Result<Self> {
        config.validate()?;
        let dialect = catalog.require(&config.provider)?;
        Ok(Self::new(client, dialect).with_options(BuildOptions::from(config)))
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares a bootstrap guard with other builders.
    pub fn with_bootstrap_flag(mut self, flag: Arc<BootstrapFlag>) -> Self {
        self.bootstrap = flag;
        self
    }

    /// Adds a table to the run, applying the default schema.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateTable`] if a table with the same
    /// schema and name (ignoring ASCII case) is already registered.
    pub fn register(&mut self, mut table: Table) -> Result<&mut Self> {
        if table.schema.is_empty() {
            table.schema = self.options.default_schema.clone();
        }
        let duplicate = self.tables.iter().any(|t| {
            t.schema.eq_ignore_ascii_case(&table.schema) && t.name.eq_ignore_ascii_case(&table.name)
        });
        if duplicate {
            return Err(LedgerError::DuplicateTable(table.full_name()));
        }
        self.tables.push(table);
        Ok(self)
    }

    pub fn register_all(&mut self, tables: impl IntoIterator<Item = Table>) -> Result<&mut Self> {
        for table in tables {
            self.register(table)?;
        }
        Ok(self)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Message of the last failure of the most recent build.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Reconciles every registered table with the database.
    ///
    /// Returns `Ok(true)` when every table reached its tracked state and
    /// `Ok(false)` when the database precondition failed or at least one
    /// table failed; [`last_error`](Self::last_error) then holds the last
    /// failure and [`report`](Self::report) the per-table outcomes.
    ///
    /// # Errors
    ///
    /// Only [`LedgerError::IntegrityError`] is returned as `Err`: the
    /// tracking tables can no longer be trusted and the run stops.
    pub fn build(&mut self) -> Result<bool> {
        self.last_error = None;
        self.report = BuildReport::default();
        let dry_run = self.options.dry_run;
        info!(
            provider = self.dialect.name(),
            tables = self.tables.len(),
            dry_run,
            "starting schema build"
        );

        let mut run = Run {
            client: &self.client,
            dialect: self.dialect.as_ref(),
            dry_run,
            statements: Vec::new(),
        };

        if let Err(err) = run.ensure_database() {
            return precondition_failed(&mut self.last_error, err);
        }

        let mut store = TrackingStore::new(&self.client, self.dialect.as_ref());
        match run.bootstrap(&store, &self.bootstrap) {
            Ok(created) => self.report.bootstrapped = created,
            Err(err) => return precondition_failed(&mut self.last_error, err),
        }
        run.statements.clear();

        // A dry run against a fresh database has no tracking tables to read.
        let loadable = if dry_run { store.exists() } else { Ok(true) };
        match loadable.and_then(|present| if present { store.load() } else { Ok(()) }) {
            Ok(()) => {}
            Err(err) => return precondition_failed(&mut self.last_error, err),
        }

        for table in &self.tables {
            let outcome = match run.reconcile(&mut store, table) {
                Ok(outcome) => outcome,
                Err(err) if err.is_integrity() => return Err(err),
                Err(err) => {
                    warn!(table = %table.full_name(), error = %err, "table reconciliation failed");
                    self.last_error = Some(format!("{}: {err}", table.full_name()));
                    TableOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            self.report.tables.push(TableReport {
                table: table.full_name(),
                outcome,
                statements: std::mem::take(&mut run.statements),
            });
        }

        let ok = self.last_error.is_none();
        info!(
            tables = self.report.tables.len(),
            statements = self.report.statement_count(),
            failures = self.report.failures().count(),
            "schema build finished"
        );
        Ok(ok)
    }
}

impl<C> fmt::Debug for SchemaBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("dialect", &self.dialect.name())
            .field("options", &self.options)
            .field("tables", &self.tables.len())
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Records a non-fatal start-up failure; integrity errors pass through.
fn precondition_failed(last_error: &mut Option<String>, err: LedgerError) -> Result<bool> {
    if err.is_integrity() {
        return Err(err);
    }
    warn!(error = %err, "schema build precondition failed");
    *last_error = Some(err.to_string());
    Ok(false)
}

/// State of one build: where statements go and which ones were issued.
struct Run<'a> {
    client: &'a dyn DbClient,
    dialect: &'a dyn Dialect,
    dry_run: bool,
    statements: Vec<String>,
}

impl Run<'_> {
    fn ensure_database(&self) -> Result<()> {
        if self.dialect.database_exists(self.client)? {
            return Ok(());
        }
        if !self.dialect.can_create() {
            return Err(LedgerError::PreconditionError(format!(
                "database does not exist and the {} dialect cannot create it",
                self.dialect.name()
            )));
        }
        if self.dry_run {
            return Err(LedgerError::PreconditionError(
                "database does not exist; a dry run does not create it".into(),
            ));
        }
        info!(provider = self.dialect.name(), "creating database");
        self.dialect.create_database(self.client)
    }

    /// Creates missing tracking tables through the regular create path.
    ///
    /// Dry runs never bootstrap. Returns `true` if this call created the tables.
    fn bootstrap(&mut self, store: &TrackingStore<'_>, flag: &BootstrapFlag) -> Result<bool> {
        if self.dry_run {
            return Ok(false);
        }
        let mut created = false;
        flag.run_once(|| {
            if store.exists()? {
                return Ok(());
            }
            for table in tracking_tables() {
                if !self.table_exists(&table.schema, &table.name)? {
                    self.create(&table)?;
                    created = true;
                }
            }
            Ok(())
        })?;
        if created {
            info!("tracking tables created");
        }
        Ok(created)
    }

    fn reconcile(&mut self, store: &mut TrackingStore<'_>, table: &Table) -> Result<TableOutcome> {
        for finding in validate_table(table) {
            warn!(table = %table.full_name(), %finding, "questionable table declaration");
        }

        let Some(mut tracked) = store.find_declared(table).cloned() else {
            let outcome = if self.table_exists(&table.schema, &table.name)? {
                TableOutcome::Registered
            } else {
                self.create(table)?;
                TableOutcome::Created
            };
            if !self.dry_run {
                store.add_table(table, None)?;
            }
            info!(table = %table.full_name(), %outcome, "untracked table");
            return Ok(outcome);
        };

        let mut live = self.table_exists(&table.schema, &table.name)?;
        let renamed_from = if tracked.name.eq_ignore_ascii_case(&table.name) {
            None
        } else {
            let from = tracked.name.clone();
            live = self.rename(store, table, &tracked)? || live;
            tracked.version = table.version;
            Some(from)
        };

        if !live {
            warn!(table = %table.full_name(), "tracked table missing live, recreating");
            self.create(table)?;
            if !self.dry_run {
                store.add_table(table, Some(tracked.id))?;
            }
            return Ok(TableOutcome::Recreated);
        }

        let diff = self.dialect.analyse_table_change(table, &tracked);
        for orphan in &diff.orphaned {
            warn!(
                table = %table.full_name(),
                column = %orphan.name,
                "column no longer declared; left in place"
            );
        }
        if diff.has_changes() || diff.previous_name.is_some() {
            let sqls = self.dialect.table_update_sqls(table, &diff);
            self.execute_guarded(table, &diff, sqls)?;
        }
        if !self.dry_run {
            if diff.needs_tracking_update() {
                store.update_columns(table, &diff)?;
            }
            if renamed_from.is_none() && table.version > tracked.version {
                store.update_table_version(table, tracked.id)?;
            }
        }

        let outcome = match renamed_from {
            Some(from) => TableOutcome::Renamed { from },
            None if diff.has_changes() => TableOutcome::Altered,
            None => TableOutcome::Unchanged,
        };
        info!(table = %table.full_name(), %outcome, "tracked table");
        Ok(outcome)
    }

    /// Renames the live table when it still has the tracked name, then
    /// records the rename. Returns `true` if the old table was live.
    fn rename(
        &mut self,
        store: &mut TrackingStore<'_>,
        table: &Table,
        tracked: &TrackedTable,
    ) -> Result<bool> {
        let old_live = self.table_exists(&tracked.schema, &tracked.name)?;
        if old_live {
            if self.table_exists(&table.schema, &table.name)? {
                return Err(LedgerError::PreconditionError(format!(
                    "cannot rename {} to {}: both tables exist",
                    tracked.name, table.name
                )));
            }
            let sql = self
                .dialect
                .table_rename_sql(&tracked.schema, &tracked.name, &table.name);
            self.execute(vec![sql])?;
        }
        if !self.dry_run {
            store.record_rename(table, tracked)?;
        }
        info!(from = %tracked.name, to = %table.name, "table renamed");
        Ok(old_live)
    }

    fn create(&mut self, table: &Table) -> Result<()> {
        let sqls = self.dialect.table_create_sqls(table);
        self.execute(sqls)
    }

    fn table_exists(&self, schema: &str, name: &str) -> Result<bool> {
        let sql = self.dialect.table_exist_sql(schema, name);
        Ok(self
            .client
            .execute_scalar(&sql, &[])?
            .is_some_and(|v| v.is_present()))
    }

    /// Issues statements in order; a dry run only records them.
    fn execute(&mut self, sqls: Vec<String>) -> Result<()> {
        for sql in sqls {
            debug!(sql = %sql, dry_run = self.dry_run, "ddl");
            if !self.dry_run {
                self.client.execute_non_query(&sql, &[])?;
            }
            self.statements.push(sql);
        }
        Ok(())
    }

    /// Runs a table update inside the dialect's [`UpdateGuard`].
    ///
    /// Guard statements are not part of the report. On failure every
    /// rollback statement is attempted and the original error returned.
    ///
    /// [`UpdateGuard`]: crate::UpdateGuard
    fn execute_guarded(
        &mut self,
        table: &Table,
        diff: &TableDiff,
        sqls: Vec<String>,
    ) -> Result<()> {
        let guard = self.dialect.update_guard(table, diff);
        if self.dry_run || guard.is_empty() {
            return self.execute(sqls);
        }

        let applied = self
            .execute_quiet(&guard.begin)
            .and_then(|()| self.execute(sqls))
            .and_then(|()| self.dialect.check_update(self.client, table))
            .and_then(|()| self.execute_quiet(&guard.commit));
        if let Err(err) = applied {
            warn!(table = %table.full_name(), error = %err, "table update rolled back");
            for sql in &guard.rollback {
                if let Err(rollback_err) = self.client.execute_non_query(sql, &[]) {
                    warn!(sql = %sql, error = %rollback_err, "rollback statement failed");
                }
            }
            return Err(err);
        }
        Ok(())
    }

    fn execute_quiet(&self, sqls: &[String]) -> Result<()> {
        for sql in sqls {
            debug!(sql = %sql, "guard");
            self.client.execute_non_query(sql, &[])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn test_bootstrap_flag_runs_once() {
        let flag = BootstrapFlag::shared();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flag = Arc::clone(&flag);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    flag.run_once(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap()
                })
            })
            .collect();
        let ran: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();

        assert_eq!(ran, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(flag.is_done());
    }

    #[test]
    fn test_bootstrap_flag_retries_after_failure() {
        let flag = BootstrapFlag::new();
        let failed = flag.run_once(|| Err(LedgerError::PreconditionError("offline".into())));
        assert!(failed.is_err());
        assert!(!flag.is_done());
        assert!(flag.run_once(|| Ok(())).unwrap());
        assert!(!flag.run_once(|| Ok(())).unwrap());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            TableOutcome::Renamed {
                from: "order_headers".into()
            }
            .to_string(),
            "renamed from order_headers"
        );
        assert!(
            TableOutcome::Failed {
                error: "boom".into()
            }
            .is_failure()
        );
    }

    #[test]
    fn test_options_from_config() {
        let mut config = BuildConfig::new("sqlite", ":memory:");
        config.default_schema = "main".into();
        config.dry_run = true;
        let options = BuildOptions::from(&config);
        assert_eq!(options.default_schema, "main");
        assert!(options.dry_run);
    }
}
