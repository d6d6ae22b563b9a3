//! Portable column types.
//!
//! A [`ColumnType`] names the logical shape of a column independently of
//! any database product. Dialects translate it, together with the column's
//! size and scale, into native type text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Portable column type enumeration.
///
/// # Examples
///
/// ```
/// use schema_ledger_core::ColumnType;
///
/// assert_eq!(ColumnType::default(), ColumnType::String);
/// assert_eq!(ColumnType::Int64.as_str(), "Int64");
/// assert!(ColumnType::Decimal.takes_size());
/// assert!(!ColumnType::Boolean.takes_size());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColumnType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    /// Exact numeric; `size` is the precision and `scale` the fractional digits.
    Decimal,
    Float,
    Double,
    /// Variable-length text; a zero size means unbounded.
    #[default]
    String,
    /// Fixed-length text.
    FixedString,
    /// Unbounded text.
    Text,
    Date,
    DateTime,
    Time,
    Guid,
    Binary,
    Json,
}

impl ColumnType {
    /// Stable name used in hashes and schema files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "Boolean",
            ColumnType::Byte => "Byte",
            ColumnType::Int16 => "Int16",
            ColumnType::Int32 => "Int32",
            ColumnType::Int64 => "Int64",
            ColumnType::Decimal => "Decimal",
            ColumnType::Float => "Float",
            ColumnType::Double => "Double",
            ColumnType::String => "String",
            ColumnType::FixedString => "FixedString",
            ColumnType::Text => "Text",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "DateTime",
            ColumnType::Time => "Time",
            ColumnType::Guid => "Guid",
            ColumnType::Binary => "Binary",
            ColumnType::Json => "Json",
        }
    }

    /// Returns `true` if the native rendering of this type carries a size.
    pub fn takes_size(&self) -> bool {
        matches!(
            self,
            ColumnType::Decimal | ColumnType::String | ColumnType::FixedString | ColumnType::Binary
        )
    }

    /// Returns `true` for the integral types that may auto-increment.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Byte | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_uses_variant_names() {
        let json = serde_json::to_string(&ColumnType::DateTime).unwrap();
        assert_eq!(json, "\"DateTime\"");
        let parsed: ColumnType = serde_json::from_str("\"FixedString\"").unwrap();
        assert_eq!(parsed, ColumnType::FixedString);
    }

    #[test]
    fn test_integer_types() {
        assert!(ColumnType::Int32.is_integer());
        assert!(ColumnType::Byte.is_integer());
        assert!(!ColumnType::Decimal.is_integer());
        assert!(!ColumnType::Guid.is_integer());
    }
}
