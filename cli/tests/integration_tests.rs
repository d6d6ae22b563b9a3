use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rusqlite::Connection;
use tempfile::TempDir;

const ORDERS_V1: &str = r#"
audit:
  - orders
tables:
  - name: orders
    category: sales
    columns:
      - name: id
        type: Int64
        primary_key: true
        auto_increment: true
      - name: status
        type: String
        size: 10
        indexed: true
"#;

const ORDERS_V2_RENAMED: &str = r#"
tables:
  - name: sales_orders
    version: 2
    old_names:
      1: orders
    columns:
      - name: id
        type: Int64
        primary_key: true
        auto_increment: true
      - name: status
        type: String
        size: 10
        indexed: true
"#;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("failed to write test file");
    path
}

fn schema_ledger(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_schema-ledger"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run schema-ledger")
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn live_tables(db: &Path) -> Vec<String> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

#[test]
fn test_apply_creates_then_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(&dir, "schema.yaml", ORDERS_V1);
    let db = dir.path().join("app.db");

    let first = schema_ledger(&["apply", "--db", arg(&db), "--schema", arg(&schema)]);
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let out = stdout(&first);
    assert!(out.contains("Created tracking tables."));
    assert!(out.contains("orders: created"));
    assert!(out.contains("CREATE TABLE \"orders\""));

    let tables = live_tables(&db);
    for expected in ["orders", "sys_ddl_column", "sys_ddl_name", "sys_ddl_object"] {
        assert!(tables.iter().any(|t| t == expected), "missing {expected}: {tables:?}");
    }

    let second = schema_ledger(&["apply", "--db", arg(&db), "--schema", arg(&schema)]);
    assert!(second.status.success(), "stderr: {}", stderr(&second));
    let out = stdout(&second);
    assert!(out.contains("orders: unchanged"));
    assert!(out.contains("ran 0 statement(s)"));
}

#[test]
fn test_plan_does_not_touch_database() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(&dir, "schema.yaml", ORDERS_V1);
    let db = dir.path().join("app.db");

    let output = schema_ledger(&["plan", "--db", arg(&db), "--schema", arg(&schema)]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("CREATE TABLE \"orders\""));
    assert!(out.contains("would run"));
    assert!(live_tables(&db).is_empty());
}

#[test]
fn test_apply_dry_run_flag_matches_plan() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(&dir, "schema.yaml", ORDERS_V1);
    let db = dir.path().join("app.db");

    let output = schema_ledger(&[
        "apply",
        "--db",
        arg(&db),
        "--schema",
        arg(&schema),
        "--dry-run",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("would run"));
    assert!(live_tables(&db).is_empty());
}

#[test]
fn test_status_lists_tracked_columns() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(&dir, "schema.yaml", ORDERS_V1);
    let db = dir.path().join("app.db");
    assert!(schema_ledger(&["apply", "--db", arg(&db), "--schema", arg(&schema)]).status.success());

    let output = schema_ledger(&["status", "--db", arg(&db)]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Tracked tables: 1"));
    assert!(out.contains("orders (v1, 6 column(s)"));
    assert!(out.contains("created_on"));
    assert!(!out.contains("sys_ddl_object"));
}

#[test]
fn test_status_without_tracking_tables() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("empty.db");
    Connection::open(&db).unwrap();

    let output = schema_ledger(&["status", "--db", arg(&db)]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No tracking tables"));
}

#[test]
fn test_status_missing_database_fails() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("missing.db");

    let output = schema_ledger(&["status", "--db", arg(&db)]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"));
    assert!(!db.exists());
}

#[test]
fn test_rename_shows_up_in_history() {
    let dir = TempDir::new().unwrap();
    let v1 = write_file(&dir, "v1.yaml", ORDERS_V1);
    let v2 = write_file(&dir, "v2.yaml", ORDERS_V2_RENAMED);
    let db = dir.path().join("app.db");
    assert!(schema_ledger(&["apply", "--db", arg(&db), "--schema", arg(&v1)]).status.success());

    let output = schema_ledger(&["apply", "--db", arg(&db), "--schema", arg(&v2)]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("sales_orders: renamed from orders"));

    let tables = live_tables(&db);
    assert!(tables.iter().any(|t| t == "sales_orders"));
    assert!(!tables.iter().any(|t| t == "orders"));

    let history = schema_ledger(&["history", "--db", arg(&db), "--table", "sales_orders"]);
    assert!(history.status.success(), "stderr: {}", stderr(&history));
    assert!(stdout(&history).contains("orders (v1) -> sales_orders (v2)"));

    let other = schema_ledger(&["history", "--db", arg(&db), "--table", "customers"]);
    assert!(stdout(&other).contains("No renames recorded."));
}

#[test]
fn test_config_file_with_default_schema_override() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(&dir, "schema.yaml", ORDERS_V1);
    let db = dir.path().join("app.db");
    let config = write_file(
        &dir,
        "ledger.yaml",
        &format!("provider: sqlite\nconnection: {}\n", arg(&db)),
    );

    let output = schema_ledger(&[
        "apply",
        "--config",
        arg(&config),
        "--schema",
        arg(&schema),
        "--default-schema",
        "main",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("main.orders: created"));
    assert!(live_tables(&db).iter().any(|t| t == "orders"));
}

#[test]
fn test_non_sqlite_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(&dir, "schema.yaml", ORDERS_V1);
    let config = write_file(
        &dir,
        "ledger.yaml",
        "provider: postgres\nconnection: host=localhost dbname=app\n",
    );

    let output = schema_ledger(&["apply", "--config", arg(&config), "--schema", arg(&schema)]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("only sqlite databases are supported"));
}

#[test]
fn test_missing_schema_file_fails() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("app.db");
    let schema = dir.path().join("nope.yaml");

    let output = schema_ledger(&["apply", "--db", arg(&db), "--schema", arg(&schema)]);
    assert!(!output.status.success());
    assert!(stderr(&output).starts_with("error: Failed to load schema file"));
}

#[test]
fn test_render_postgres() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(&dir, "schema.yaml", ORDERS_V1);

    let output = schema_ledger(&["render", "--schema", arg(&schema), "--provider", "postgres"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("-- orders"));
    assert!(out.contains("GENERATED BY DEFAULT AS IDENTITY"));
    assert!(out.contains("CREATE INDEX \"idx_orders_status\""));
}

#[test]
fn test_render_unknown_provider_lists_available() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(&dir, "schema.yaml", ORDERS_V1);

    let output = schema_ledger(&["render", "--schema", arg(&schema), "--provider", "oracle"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("oracle"));
    assert!(err.contains("available: postgres, sqlite"));
}

#[test]
fn test_json_schema_file() {
    let dir = TempDir::new().unwrap();
    let schema = write_file(
        &dir,
        "schema.json",
        r#"{"tables": [{"name": "notes", "columns": [
            {"name": "id", "type": "Int32", "primary_key": true},
            {"name": "body", "type": "Text"}
        ]}]}"#,
    );

    let output = schema_ledger(&["render", "--schema", arg(&schema)]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("CREATE TABLE \"notes\""));
}
