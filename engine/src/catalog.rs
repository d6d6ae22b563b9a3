//! Dialect registry keyed by provider identifier.
//!
//! A [`DialectCatalog`] is built explicitly and handed to whoever opens a
//! [`SchemaBuilder`](crate::SchemaBuilder); there is no global registry.
//! Backend crates register their own dialects on top of
//! [`DialectCatalog::with_builtins`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::{LedgerError, Result};
use crate::postgres::PostgresDialect;

/// Registry of dialects by provider id.
///
/// # Examples
///
/// ```
/// use schema_ledger_engine::{Dialect, DialectCatalog};
///
/// let catalog = DialectCatalog::with_builtins();
/// assert_eq!(catalog.require("postgres").unwrap().name(), "postgres");
/// assert!(catalog.get("oracle").is_none());
/// assert!(catalog.require("oracle").is_err());
/// ```
#[derive(Default, Clone)]
pub struct DialectCatalog {
    dialects: HashMap<String, Arc<dyn Dialect>>,
}

impl DialectCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog with the standard PostgreSQL dialect registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register("postgres", PostgresDialect::new());
        catalog
    }

    /// Registers `dialect` under `provider`, replacing any previous entry.
    ///
    /// Provider ids are matched case-insensitively.
    pub fn register(&mut self, provider: impl Into<String>, dialect: impl Dialect + 'static) {
        self.register_arc(provider, Arc::new(dialect));
    }

    /// Registers a shared dialect.
    pub fn register_arc(&mut self, provider: impl Into<String>, dialect: Arc<dyn Dialect>) {
        self.dialects
            .insert(provider.into().to_ascii_lowercase(), dialect);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn Dialect>> {
        self.dialects
            .get(&provider.to_ascii_lowercase())
            .cloned()
    }

    /// Like [`get`](Self::get), but a missing provider is an
    /// [`UnknownProvider`](LedgerError::UnknownProvider) error.
    pub fn require(&self, provider: &str) -> Result<Arc<dyn Dialect>> {
        self.get(provider)
            .ok_or_else(|| LedgerError::UnknownProvider(provider.to_string()))
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.dialects.contains_key(&provider.to_ascii_lowercase())
    }

    /// Registered provider ids, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for DialectCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectCatalog")
            .field("providers", &self.providers())
            .finish()
    }
}
