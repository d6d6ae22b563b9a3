//! Database client abstraction.
//!
//! The engine never talks to a driver directly. A [`DbClient`] executes SQL
//! text with positional [`Value`] parameters and returns [`Row`]s; each
//! backend crate provides an implementation over its driver.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{LedgerError, Result};

/// A bound parameter or a value read back from the database.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for anything other than `NULL` or an empty string.
    ///
    /// This is how existence checks such as
    /// [`Dialect::table_exist_sql`](crate::Dialect::table_exist_sql) are read.
    pub fn is_present(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Text(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row with typed positional accessors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    fn value(&self, idx: usize) -> Result<&Value> {
        self.0.get(idx).ok_or_else(|| {
            LedgerError::ConversionError(format!(
                "column {idx} out of range for row of {} values",
                self.0.len()
            ))
        })
    }

    pub fn i64(&self, idx: usize) -> Result<i64> {
        match self.value(idx)? {
            Value::Integer(v) => Ok(*v),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Real(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::Text(s) => s.trim().parse().map_err(|_| {
                LedgerError::ConversionError(format!("column {idx}: '{s}' is not an integer"))
            }),
            Value::Null => Ok(0),
            other => Err(LedgerError::ConversionError(format!(
                "column {idx}: expected integer, found {other:?}"
            ))),
        }
    }

    pub fn i32(&self, idx: usize) -> Result<i32> {
        let v = self.i64(idx)?;
        i32::try_from(v).map_err(|_| {
            LedgerError::ConversionError(format!("column {idx}: {v} does not fit in i32"))
        })
    }

    pub fn u32(&self, idx: usize) -> Result<u32> {
        let v = self.i64(idx)?;
        u32::try_from(v).map_err(|_| {
            LedgerError::ConversionError(format!("column {idx}: {v} does not fit in u32"))
        })
    }

    pub fn bool(&self, idx: usize) -> Result<bool> {
        match self.value(idx)? {
            Value::Bool(b) => Ok(*b),
            Value::Integer(v) => Ok(*v != 0),
            Value::Null => Ok(false),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "yes" => Ok(true),
                "0" | "false" | "f" | "no" | "" => Ok(false),
                _ => Err(LedgerError::ConversionError(format!(
                    "column {idx}: '{s}' is not a boolean"
                ))),
            },
            other => Err(LedgerError::ConversionError(format!(
                "column {idx}: expected boolean, found {other:?}"
            ))),
        }
    }

    /// Text value; `NULL` reads as the empty string.
    pub fn string(&self, idx: usize) -> Result<String> {
        Ok(self.opt_string(idx)?.unwrap_or_default())
    }

    pub fn opt_string(&self, idx: usize) -> Result<Option<String>> {
        match self.value(idx)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Integer(v) => Ok(Some(v.to_string())),
            Value::Real(v) => Ok(Some(v.to_string())),
            Value::Bool(v) => Ok(Some(v.to_string())),
            Value::Timestamp(t) => Ok(Some(t.to_rfc3339())),
        }
    }

    /// Timestamp value; unparseable text reads as `None`.
    pub fn opt_timestamp(&self, idx: usize) -> Result<Option<DateTime<Utc>>> {
        match self.value(idx)? {
            Value::Timestamp(t) => Ok(Some(*t)),
            Value::Text(s) => Ok(parse_timestamp(s)),
            _ => Ok(None),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Synchronous database client.
///
/// Each call is one round-trip that commits on its own; the engine never
/// opens a transaction spanning several statements.
pub trait DbClient {
    /// Executes a statement and returns the number of affected rows.
    fn execute_non_query(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Returns the first column of the first row, or `None` when there is no row.
    fn execute_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>>;

    /// Runs a query and returns every row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Executes parameterless statements in order, stopping at the first failure.
    fn execute_batch(&self, statements: &[String]) -> Result<()> {
        for sql in statements {
            self.execute_non_query(sql, &[])?;
        }
        Ok(())
    }
}

impl<T: DbClient + ?Sized> DbClient for &T {
    fn execute_non_query(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute_non_query(sql, params)
    }

    fn execute_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        (**self).execute_scalar(sql, params)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute_batch(&self, statements: &[String]) -> Result<()> {
        (**self).execute_batch(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence() {
        assert!(!Value::Null.is_present());
        assert!(!Value::Text(String::new()).is_present());
        assert!(Value::Text("orders".into()).is_present());
        assert!(Value::Integer(0).is_present());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
        assert_eq!(Value::from(7i32), Value::Integer(7));
    }

    #[test]
    fn test_row_accessors() {
        let row = Row(vec![
            Value::Integer(42),
            Value::Text("1".into()),
            Value::Null,
            Value::Text("2024-01-15T10:30:00+00:00".into()),
            Value::Text("2024-01-15 10:30:00".into()),
        ]);
        assert_eq!(row.i64(0).unwrap(), 42);
        assert!(row.bool(1).unwrap());
        assert_eq!(row.opt_string(2).unwrap(), None);
        assert_eq!(row.string(2).unwrap(), "");
        assert!(row.opt_timestamp(3).unwrap().is_some());
        assert_eq!(row.opt_timestamp(3).unwrap(), row.opt_timestamp(4).unwrap());
        assert!(row.i64(9).is_err());
    }

    #[test]
    fn test_row_rejects_bad_integer() {
        let row = Row(vec![Value::Text("abc".into()), Value::Integer(i64::MAX)]);
        assert!(matches!(row.i64(0), Err(LedgerError::ConversionError(_))));
        assert!(row.i32(1).is_err());
    }
}
