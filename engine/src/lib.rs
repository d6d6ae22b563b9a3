//! Schema reconciliation engine.
//!
//! This crate compares [`Table`](schema_ledger_core::Table) declarations
//! with the state it recorded in the target database on earlier runs and
//! issues the DDL that brings the database up to date.
//!
//! # Architecture
//!
//! - **`client`** — [`DbClient`] trait and [`Value`]/[`Row`] exchange types
//! - **`dialect`** — [`Dialect`] trait rendering DDL for one product
//! - **`postgres`** — the standard [`PostgresDialect`]
//! - **`diff`** — declared-versus-tracked column analysis ([`TableDiff`])
//! - **`tracking`** — [`TrackingStore`] over `sys_ddl_object`, `sys_ddl_column`, `sys_ddl_name`
//! - **`builder`** — [`SchemaBuilder`], the per-table state machine
//! - **`catalog`** — [`DialectCatalog`] mapping provider ids to dialects
//! - **`config`** — [`BuildConfig`] loaded from YAML
//!
//! Columns and indexes that disappear from a declaration are reported and
//! left in place; the engine never drops them.

mod builder;
mod catalog;
mod client;
mod config;
mod dialect;
mod diff;
mod error;
mod postgres;
pub mod tracking;

pub use builder::{
    BootstrapFlag, BuildOptions, BuildReport, SchemaBuilder, TableOutcome, TableReport,
};
pub use catalog::DialectCatalog;
pub use client::{DbClient, Row, Value};
pub use config::BuildConfig;
pub use dialect::{Dialect, UpdateGuard, quote_literal};
pub use diff::{ColumnChanges, ColumnDiff, ColumnStatus, TableDiff, analyse};
pub use error::{LedgerError, Result};
pub use postgres::PostgresDialect;
pub use tracking::TrackingStore;
