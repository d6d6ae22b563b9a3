//! Build configuration.
//!
//! Defines the YAML-serializable settings that select a dialect, point at a
//! database and tune a build run.
//!
//! # Example YAML
//!
//! ```yaml
//! provider: sqlite
//! connection: data/app.db
//! default_schema: ""
//! dry_run: false
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Settings for one [`SchemaBuilder`](crate::SchemaBuilder).
///
/// # Examples
///
/// ```
/// use schema_ledger_engine::BuildConfig;
///
/// let config = BuildConfig::new("sqlite", ":memory:");
/// assert!(config.validate().is_ok());
/// assert!(!config.dry_run);
///
/// assert!(BuildConfig::new("", ":memory:").validate().is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Provider identifier used to look up the dialect (e.g. `sqlite`, `postgres`).
    pub provider: String,
    /// Connection string or database path, interpreted by the client.
    pub connection: String,
    /// Schema applied to registered tables that do not name one.
    #[serde(default)]
    pub default_schema: String,
    /// Render and report statements without executing them.
    #[serde(default)]
    pub dry_run: bool,
}

impl BuildConfig {
    pub fn new(provider: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            connection: connection.into(),
            default_schema: String::new(),
            dry_run: false,
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::LedgerError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::LedgerError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks that a provider and a connection are present.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConfigError`] naming the missing field.
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(LedgerError::ConfigError("provider must not be empty".into()));
        }
        if self.connection.trim().is_empty() {
            return Err(LedgerError::ConfigError(
                "connection must not be empty".into(),
            ));
        }
        if self.connection.contains('\0') {
            return Err(LedgerError::ConfigError(
                "connection contains a NUL byte".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.yaml");

        let mut config = BuildConfig::new("postgres", "host=localhost dbname=app");
        config.default_schema = "public".into();
        config.dry_run = true;
        config.save(&path).unwrap();

        let loaded = BuildConfig::load(&path).unwrap();
        assert_eq!(loaded.provider, "postgres");
        assert_eq!(loaded.connection, "host=localhost dbname=app");
        assert_eq!(loaded.default_schema, "public");
        assert!(loaded.dry_run);
    }

    #[test]
    fn test_optional_fields_default() {
        let config: BuildConfig =
            serde_yaml::from_str("provider: sqlite\nconnection: app.db\n").unwrap();
        assert_eq!(config.default_schema, "");
        assert!(!config.dry_run);
    }

    #[test]
    fn test_validate_rejects_blank_connection() {
        let err = BuildConfig::new("sqlite", "  ").validate().unwrap_err();
        assert!(matches!(err, LedgerError::ConfigError(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BuildConfig::load("/nonexistent/ledger.yaml").unwrap_err();
        assert!(matches!(err, LedgerError::IoError(_)));
    }
}
