//! EPF Ingest Library
//!
//! A Rust library for loading EPF-style delimited export files into
//! relational tables.
//!
//! This library provides tools for:
//! - Parsing EPF headers, trailers and records with custom multi-byte delimiters
//! - Full loads built under a temporary name and swapped in by rename
//! - Incremental loads, upserted in place or merged on a freshness column
//! - Checkpointed progress so interrupted loads resume where they stopped
//! - Importing whole export directories with allow/deny file filters

pub mod config;
pub mod constants;
pub mod error;
pub mod importer;
pub mod ingest;
pub mod models;
pub mod parser;
pub mod store;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::{ImportConfig, IngestOptions};
pub use error::{IngestError, Result};
pub use importer::{ImportSummary, Importer};
pub use ingest::{CheckpointSink, IngestOutcome, IngestReport, Ingester, LoadStrategy};
pub use models::{ExportMode, FieldValue, FileHeader, IngestRunState, Record, TableNames};
pub use parser::EpfParser;
pub use store::{SqliteStore, TargetStore};
