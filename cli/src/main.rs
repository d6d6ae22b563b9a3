use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use schema_ledger_core::{SchemaFile, Table, validate_table};
use schema_ledger_engine::{BuildConfig, SchemaBuilder, TableOutcome, TrackingStore};
use schema_ledger_sqlite::{SqliteClient, SqliteDialect};
use tracing_subscriber::EnvFilter;

const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "schema-ledger", version = PACKAGE_VERSION)]
#[command(about = "Code-first schema migrations with in-database change tracking")]
struct Cli {
    /// Log level used when RUST_LOG is not set (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile a SQLite database with a schema file.
    Apply(ApplyArgs),
    /// Show the statements `apply` would run, without changing anything.
    Plan(TargetArgs),
    /// List tracked tables and their columns.
    Status(DbArgs),
    /// Show the table rename ledger.
    History(HistoryArgs),
    /// Print CREATE statements for a schema file.
    Render(RenderArgs),
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Database file path (SQLite).
    #[arg(long, required_unless_present = "config")]
    db: Option<PathBuf>,
    /// Build configuration YAML; takes the place of --db.
    #[arg(long, conflicts_with = "db")]
    config: Option<PathBuf>,
    /// Schema file (YAML, or JSON with a .json extension).
    #[arg(long)]
    schema: PathBuf,
    /// Schema applied to tables that do not name one.
    #[arg(long)]
    default_schema: Option<String>,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Render and report statements without executing them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbArgs {
    /// Database file path (SQLite).
    #[arg(long)]
    db: PathBuf,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    /// Database file path (SQLite).
    #[arg(long)]
    db: PathBuf,
    /// Only show renames of this tracked table (current name).
    #[arg(long)]
    table: Option<String>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// Schema file (YAML, or JSON with a .json extension).
    #[arg(long)]
    schema: PathBuf,
    /// Dialect to render for.
    #[arg(long, default_value = "sqlite")]
    provider: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Command::Apply(args) => run_apply(args.target, args.dry_run),
        Command::Plan(args) => run_apply(args, true),
        Command::Status(args) => run_status(args),
        Command::History(args) => run_history(args),
        Command::Render(args) => run_render(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so command output stays machine-readable.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_tables(path: &Path) -> Result<Vec<Table>, String> {
    let file = SchemaFile::load(path)
        .map_err(|e| format!("Failed to load schema file '{}': {e}", path.display()))?;
    let tables = file.into_tables();
    if tables.is_empty() {
        return Err(format!("Schema file '{}' declares no tables", path.display()));
    }
    for table in &tables {
        for finding in validate_table(table) {
            eprintln!("warning: {finding}");
        }
    }
    Ok(tables)
}

fn resolve_config(target: &TargetArgs, dry_run: bool) -> Result<BuildConfig, String> {
    let mut config = match (&target.config, &target.db) {
        (Some(path), _) => BuildConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        (None, Some(db)) => {
            BuildConfig::new(schema_ledger_sqlite::PROVIDER, db.display().to_string())
        }
        (None, None) => return Err("either --db or --config is required".to_string()),
    };
    if !config.provider.eq_ignore_ascii_case(schema_ledger_sqlite::PROVIDER) {
        return Err(format!(
            "provider '{}' cannot be applied from the command line; \
             only sqlite databases are supported (use `render` for other dialects)",
            config.provider
        ));
    }
    if let Some(schema) = &target.default_schema {
        config.default_schema = schema.clone();
    }
    config.dry_run |= dry_run;
    Ok(config)
}

fn run_apply(target: TargetArgs, dry_run: bool) -> Result<(), String> {
    let config = resolve_config(&target, dry_run)?;
    let tables = load_tables(&target.schema)?;

    let mut builder = schema_ledger_sqlite::open_builder(&config, &schema_ledger_sqlite::catalog())
        .map_err(|e| format!("Failed to open database '{}': {e}", config.connection))?;
    builder
        .register_all(tables)
        .map_err(|e| format!("Invalid schema: {e}"))?;

    let ok = builder
        .build()
        .map_err(|e| format!("Tracking tables are inconsistent: {e}"))?;
    print_report(&builder, config.dry_run);

    if ok {
        Ok(())
    } else {
        Err(builder
            .last_error()
            .unwrap_or("schema build failed")
            .to_string())
    }
}

fn print_report(builder: &SchemaBuilder<SqliteClient>, dry_run: bool) {
    let report = builder.report();
    if report.bootstrapped {
        println!("Created tracking tables.");
    }
    for table in &report.tables {
        println!("{}: {}", table.table, table.outcome);
        for sql in &table.statements {
            println!("    {sql};");
        }
    }

    let changed = report
        .tables
        .iter()
        .filter(|t| !matches!(t.outcome, TableOutcome::Unchanged | TableOutcome::Failed { .. }))
        .count();
    let verb = if dry_run { "would run" } else { "ran" };
    println!(
        "\n{} table(s), {changed} changed, {} failed; {verb} {} statement(s).",
        report.tables.len(),
        report.failures().count(),
        report.statement_count()
    );
}

fn open_store_client(db: &Path) -> Result<SqliteClient, String> {
    if !db.exists() {
        return Err(format!("Database '{}' does not exist", db.display()));
    }
    SqliteClient::open(db).map_err(|e| format!("Failed to open database '{}': {e}", db.display()))
}

fn run_status(args: DbArgs) -> Result<(), String> {
    let client = open_store_client(&args.db)?;
    let dialect = SqliteDialect::new();
    let mut store = TrackingStore::new(&client, &dialect);
    if !store.exists().map_err(|e| e.to_string())? {
        println!("No tracking tables in '{}'.", args.db.display());
        return Ok(());
    }
    store
        .load()
        .map_err(|e| format!("Failed to read tracking tables: {e}"))?;

    println!("Tracked tables: {}", store.tables().len());
    for table in store.tables() {
        let name = if table.schema.is_empty() {
            table.name.clone()
        } else {
            format!("{}.{}", table.schema, table.name)
        };
        println!(
            "\n{name} (v{}, {} column(s), hash {:016x})",
            table.version,
            table.columns.len(),
            table.hash
        );
        for column in &table.columns {
            println!(
                "  #{:<3} {:<30} {:<16} {}{}",
                column.internal_id,
                column.name,
                column.column_type,
                if column.allow_null { "NULL" } else { "NOT NULL" },
                if column.is_pk { " PK" } else { "" }
            );
        }
    }
    Ok(())
}

fn run_history(args: HistoryArgs) -> Result<(), String> {
    let client = open_store_client(&args.db)?;
    let dialect = SqliteDialect::new();
    let mut store = TrackingStore::new(&client, &dialect);
    if !store.exists().map_err(|e| e.to_string())? {
        println!("No tracking tables in '{}'.", args.db.display());
        return Ok(());
    }
    store
        .load()
        .map_err(|e| format!("Failed to read tracking tables: {e}"))?;

    let mut shown = 0;
    for table in store.tables() {
        if args
            .table
            .as_deref()
            .is_some_and(|t| !table.name.eq_ignore_ascii_case(t))
        {
            continue;
        }
        for record in store.renames_for(table.id) {
            let when = record
                .created_on
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            println!(
                "{when}  {} (v{}) -> {} (v{})",
                record.name, record.version, table.name, table.version
            );
            shown += 1;
        }
    }
    if shown == 0 {
        println!("No renames recorded.");
    }
    Ok(())
}

fn run_render(args: RenderArgs) -> Result<(), String> {
    let tables = load_tables(&args.schema)?;
    let catalog = schema_ledger_sqlite::catalog();
    let dialect = catalog.require(&args.provider).map_err(|e| {
        format!("{e} (available: {})", catalog.providers().join(", "))
    })?;
    for table in &tables {
        println!("-- {}", table.full_name());
        for sql in dialect.table_create_sqls(table) {
            println!("{sql};");
        }
        println!();
    }
    Ok(())
}
