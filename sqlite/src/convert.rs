//! Conversion between engine [`Value`]s and SQLite values.
//!
//! SQLite has no boolean or timestamp storage class: booleans are stored as
//! `0`/`1` and timestamps as RFC 3339 text, which
//! [`Row::opt_timestamp`](schema_ledger_engine::Row::opt_timestamp) parses
//! back.

use rusqlite::types::{Value as SqlValue, ValueRef};
use schema_ledger_engine::Value;

use crate::error::{Result, SqliteError};

pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Timestamp(t) => SqlValue::Text(t.to_rfc3339()),
    }
}

pub(crate) fn from_sql(value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(v) => Ok(Value::Integer(v)),
        ValueRef::Real(v) => Ok(Value::Real(v)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| SqliteError::ConversionError(format!("invalid UTF-8 text: {e}"))),
        ValueRef::Blob(_) => Err(SqliteError::ConversionError(
            "blob values cannot be read as engine values".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_bool_and_timestamp_storage() {
        assert_eq!(to_sql(&Value::Bool(true)), SqlValue::Integer(1));
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(
            to_sql(&Value::Timestamp(at)),
            SqlValue::Text("2024-01-15T10:30:00+00:00".into())
        );
    }

    #[test]
    fn test_read_values() {
        assert_eq!(from_sql(ValueRef::Integer(4)).unwrap(), Value::Integer(4));
        assert_eq!(
            from_sql(ValueRef::Text(b"orders")).unwrap(),
            Value::Text("orders".into())
        );
        assert!(matches!(
            from_sql(ValueRef::Blob(&[0, 1])),
            Err(SqliteError::ConversionError(_))
        ));
        assert!(from_sql(ValueRef::Text(&[0xff, 0xfe])).is_err());
    }
}
