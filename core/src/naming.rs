//! Generated identifier names.
//!
//! Index and constraint names are derived from the table and column names.
//! Names longer than [`MAX_IDENTIFIER_LEN`] keep their last
//! [`NAME_SUFFIX_LEN`] characters and lose characters from the front part,
//! so the column-specific tail stays recognizable.

/// Longest identifier the engine generates.
pub const MAX_IDENTIFIER_LEN: usize = 30;

/// Number of trailing characters preserved when a name is shortened.
pub const NAME_SUFFIX_LEN: usize = 8;

/// Shortens `name` to at most [`MAX_IDENTIFIER_LEN`] characters.
///
/// # Examples
///
/// ```
/// use schema_ledger_core::naming::{truncate_identifier, MAX_IDENTIFIER_LEN};
///
/// assert_eq!(truncate_identifier("idx_orders_status"), "idx_orders_status");
///
/// let long = truncate_identifier("idx_customer_orders_archive_created_on");
/// assert_eq!(long.chars().count(), MAX_IDENTIFIER_LEN);
/// assert_eq!(long, "idx_customer_orders_areated_on");
/// ```
pub fn truncate_identifier(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= MAX_IDENTIFIER_LEN {
        return name.to_string();
    }
    let head = MAX_IDENTIFIER_LEN - NAME_SUFFIX_LEN;
    let mut out: String = chars[..head].iter().collect();
    out.extend(&chars[chars.len() - NAME_SUFFIX_LEN..]);
    out
}

/// Name of the auto-registered index for `column` of `table`.
pub fn index_name(table: &str, column: &str) -> String {
    truncate_identifier(&format!("idx_{table}_{column}"))
}

/// Name of a column-level constraint; `kind` is a short prefix such as `uq`,
/// `ck` or `fk`.
pub fn constraint_name(kind: &str, table: &str, column: &str) -> String {
    truncate_identifier(&format!("{kind}_{table}_{column}"))
}
