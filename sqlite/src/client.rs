//! [`DbClient`] over a `rusqlite` connection.

use std::path::Path;

use rusqlite::{Connection, params_from_iter};
use rusqlite::types::Value as SqlValue;
use schema_ledger_engine::{DbClient, Row, Value};

use crate::convert::{from_sql, to_sql};
use crate::error::Result;

/// A SQLite connection usable by the engine.
///
/// Every statement runs in autocommit mode.
#[derive(Debug)]
pub struct SqliteClient {
    conn: Connection,
}

impl SqliteClient {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the client and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn rows(&self, sql: &str, params: &[Value], limit: Option<usize>) -> Result<Vec<Row>> {
        let bound: Vec<SqlValue> = params.iter().map(to_sql).collect();
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(bound.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(from_sql(row.get_ref(idx)?)?);
            }
            out.push(Row(values));
            if limit.is_some_and(|n| out.len() >= n) {
                break;
            }
        }
        Ok(out)
    }
}

impl DbClient for SqliteClient {
    fn execute_non_query(&self, sql: &str, params: &[Value]) -> schema_ledger_engine::Result<u64> {
        let bound: Vec<SqlValue> = params.iter().map(to_sql).collect();
        let changed = self
            .conn
            .execute(sql, params_from_iter(bound.iter()))
            .map_err(crate::SqliteError::from)?;
        Ok(changed as u64)
    }

    fn execute_scalar(
        &self,
        sql: &str,
        params: &[Value],
    ) -> schema_ledger_engine::Result<Option<Value>> {
        let first = self.rows(sql, params, Some(1))?.into_iter().next();
        Ok(first.and_then(|row| row.0.into_iter().next()))
    }

    fn query(&self, sql: &str, params: &[Value]) -> schema_ledger_engine::Result<Vec<Row>> {
        Ok(self.rows(sql, params, None)?)
    }
}
