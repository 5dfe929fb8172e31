//! Error handling for EPF ingest operations.
//!
//! Provides error types with context for header parsing, schema checks,
//! table writes and resume-state persistence.

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid EPF format in file: {path} - {reason}")]
    Format { path: PathBuf, reason: String },

    #[error(
        "Schema violation on table {table}: table has {table_columns} columns but the file declares only {file_columns}"
    )]
    SchemaViolation {
        table: String,
        table_columns: usize,
        file_columns: usize,
    },

    #[error("Column {column} required for merging into {table} is not declared by the file")]
    MissingColumn { table: String, column: String },

    #[error("Fatal write error on table {table} after {last_record} records: {source}")]
    FatalWrite {
        table: String,
        last_record: u64,
        #[source]
        source: StoreError,
    },

    #[error("Could not swap new table into {target}; previous table left in place: {source}")]
    Swap {
        target: String,
        #[source]
        source: StoreError,
    },

    #[error(
        "Could not swap new table into {target} and could not restore it from {backup} ({rollback}); previous table is left under {backup}: {source}"
    )]
    SwapRollback {
        target: String,
        backup: String,
        rollback: StoreError,
        #[source]
        source: StoreError,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Snapshot file {path} could not be read or written: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid file filter pattern: {0}")]
    Filter(#[from] regex::Error),

    #[error("Directory traversal error: {0}")]
    DirectoryTraversal(#[from] walkdir::Error),
}

impl IngestError {
    /// Create a format error for the given file
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True for errors raised before anything was written
    pub fn is_fail_closed(&self) -> bool {
        matches!(
            self,
            Self::Format { .. }
                | Self::SchemaViolation { .. }
                | Self::MissingColumn { .. }
                | Self::Configuration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
