//! Target store abstraction
//!
//! The ingest engine talks to the database only through [`TargetStore`]:
//! statement execution with classified errors, identifier and literal
//! quoting, and the handful of DDL operations a load needs. DDL hooks have
//! portable default implementations which a backend overrides where its SQL
//! dialect differs.

pub mod sqlite;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::DatabaseConfig;

pub use self::sqlite::SqliteStore;

/// Class of a non-fatal store notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticClass {
    /// A statement referred to a table that does not exist
    UnknownTable,
    Other,
}

impl fmt::Display for DiagnosticClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticClass::UnknownTable => write!(f, "unknown table"),
            DiagnosticClass::Other => write!(f, "other"),
        }
    }
}

/// Errors reported by a target store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Statement completed with a notice; never aborts a run
    #[error("Store warning ({class}): {message}")]
    Warning {
        class: DiagnosticClass,
        message: String,
    },

    /// A uniqueness or primary key constraint rejected the statement
    #[error("Integrity violation: {message}")]
    IntegrityViolation { message: String },

    #[error("Store failure: {message}")]
    Fatal { message: String },
}

impl StoreError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::IntegrityViolation { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Statement verb used for batch writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Plain insert; key collisions are integrity violations
    Insert,
    /// Insert that silently drops rows colliding on the primary key
    InsertIgnore,
    /// Insert that replaces rows colliding on the primary key
    Upsert,
}

/// Relational store the ingest engine writes into
pub trait TargetStore {
    /// Open a connection using the configured settings
    fn connect(config: &DatabaseConfig) -> StoreResult<Self>
    where
        Self: Sized;

    /// Execute one statement, returning the number of affected rows
    fn execute(&mut self, statement: &str) -> StoreResult<usize>;

    fn table_exists(&mut self, name: &str) -> StoreResult<bool>;

    /// Number of columns in an existing table
    fn column_count(&mut self, name: &str) -> StoreResult<usize>;

    /// Literal for raw field bytes, safe for inclusion in a statement
    fn escape_literal(&self, bytes: &[u8]) -> String;

    fn quote_identifier(&self, name: &str) -> String;

    fn null_literal(&self) -> &'static str {
        "NULL"
    }

    fn write_verb(&self, mode: WriteMode) -> &'static str;

    fn create_table(
        &mut self,
        name: &str,
        columns: &[String],
        types: &[String],
        primary_key: &[String],
    ) -> StoreResult<()> {
        let statement = create_table_statement(&*self, name, columns, types, primary_key);
        self.execute(&statement).map(|_| ())
    }

    fn rename_table(&mut self, from: &str, to: &str) -> StoreResult<()> {
        let statement = format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        );
        self.execute(&statement).map(|_| ())
    }

    fn drop_table_if_exists(&mut self, name: &str) -> StoreResult<()> {
        let statement = format!("DROP TABLE IF EXISTS {}", self.quote_identifier(name));
        self.execute(&statement).map(|_| ())
    }

    /// Add a primary key constraint to an existing, unconstrained table
    fn apply_primary_key(
        &mut self,
        name: &str,
        columns: &[String],
        types: &[String],
        primary_key: &[String],
    ) -> StoreResult<()>;
}

/// `CREATE TABLE` statement with the primary key declared inline
pub fn create_table_statement<S: TargetStore + ?Sized>(
    store: &S,
    name: &str,
    columns: &[String],
    types: &[String],
    primary_key: &[String],
) -> String {
    let mut definitions: Vec<String> = columns
        .iter()
        .zip(types)
        .map(|(column, ty)| format!("{} {}", store.quote_identifier(column), ty))
        .collect();

    if !primary_key.is_empty() {
        definitions.push(format!(
            "PRIMARY KEY ({})",
            quote_list(store, primary_key)
        ));
    }

    format!(
        "CREATE TABLE {} ({})",
        store.quote_identifier(name),
        definitions.join(", ")
    )
}

/// Comma-separated list of quoted identifiers
pub fn quote_list<S: TargetStore + ?Sized>(store: &S, names: &[String]) -> String {
    names
        .iter()
        .map(|n| store.quote_identifier(n))
        .collect::<Vec<_>>()
        .join(", ")
}
