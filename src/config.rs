//! Configuration management and validation.
//!
//! Provides the import configuration persisted as JSON next to the binary,
//! the two file-format presets (EPF and EPF Flat), database connection
//! settings, and the tuning options consumed by the ingest engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::constants::{
    CHECKPOINT_RECORD_GAP, CHECKPOINT_SECONDS, DEFAULT_BATCH_SIZE, DEFAULT_FIELD_DELIM,
    DEFAULT_FRESHNESS_COLUMN, DEFAULT_RECORD_DELIM, FLAT_FIELD_DELIM, FLAT_RECORD_DELIM,
    LARGE_INCREMENTAL_THRESHOLD,
};
use crate::error::{IngestError, Result};
use crate::store::DiagnosticClass;

/// File-format preset used when creating a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// Standard EPF files (`\x02\n` records, `\x01` fields)
    Epf,
    /// EPF Flat files (newline records, tab fields)
    Flat,
}

impl ConfigPreset {
    pub fn config(self) -> ImportConfig {
        match self {
            ConfigPreset::Epf => ImportConfig::default(),
            ConfigPreset::Flat => ImportConfig::flat(),
        }
    }
}

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(rename = "dbHost")]
    pub host: String,
    #[serde(rename = "dbUser")]
    pub user: String,
    #[serde(rename = "dbPassword")]
    pub password: String,
    /// Database name; the database file path for SQLite
    #[serde(rename = "dbName")]
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: "epfimporter".to_string(),
            password: "epf123".to_string(),
            name: "epf.db".to_string(),
        }
    }
}

/// Store notices that are expected and logged at debug level only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticPolicy {
    allowed: Vec<DiagnosticClass>,
}

impl Default for DiagnosticPolicy {
    fn default() -> Self {
        Self {
            allowed: vec![DiagnosticClass::UnknownTable],
        }
    }
}

impl DiagnosticPolicy {
    pub fn new(allowed: Vec<DiagnosticClass>) -> Self {
        Self { allowed }
    }

    /// Policy that reports every notice at warn level
    pub fn strict() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_allowed(&self, class: DiagnosticClass) -> bool {
        self.allowed.contains(&class)
    }
}

/// Tuning options for the ingest engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngestOptions {
    /// Records per batch statement
    pub batch_size: usize,
    /// Expected record count at which incremental files use the merge path
    pub large_incremental_threshold: u64,
    /// Minimum records written between checkpoints
    pub checkpoint_record_gap: u64,
    /// Minimum seconds between checkpoints
    pub checkpoint_seconds: u64,
    /// Column compared when merging rows that share a primary key
    pub freshness_column: String,
    /// Declared column type substitutions
    pub type_map: HashMap<String, String>,
    /// Drop rows colliding on the primary key during full loads
    pub skip_key_violators: bool,
    pub diagnostics: DiagnosticPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            large_incremental_threshold: LARGE_INCREMENTAL_THRESHOLD,
            checkpoint_record_gap: CHECKPOINT_RECORD_GAP,
            checkpoint_seconds: CHECKPOINT_SECONDS,
            freshness_column: DEFAULT_FRESHNESS_COLUMN.to_string(),
            type_map: HashMap::from([("CLOB".to_string(), "LONGTEXT".to_string())]),
            skip_key_violators: false,
            diagnostics: DiagnosticPolicy::default(),
        }
    }
}

impl IngestOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_large_incremental_threshold(mut self, threshold: u64) -> Self {
        self.large_incremental_threshold = threshold;
        self
    }

    /// Set both checkpoint gaps
    pub fn with_checkpoint_interval(mut self, records: u64, seconds: u64) -> Self {
        self.checkpoint_record_gap = records;
        self.checkpoint_seconds = seconds;
        self
    }

    pub fn with_freshness_column(mut self, column: impl Into<String>) -> Self {
        self.freshness_column = column.into();
        self
    }

    pub fn with_skip_key_violators(mut self) -> Self {
        self.skip_key_violators = true;
        self
    }

    pub fn with_diagnostics(mut self, policy: DiagnosticPolicy) -> Self {
        self.diagnostics = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::configuration("batch size must be at least 1"));
        }
        if self.freshness_column.trim().is_empty() {
            return Err(IngestError::configuration(
                "freshness column name must not be empty",
            ));
        }
        Ok(())
    }
}

/// Complete import configuration, stored as camelCase JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportConfig {
    #[serde(flatten)]
    pub database: DatabaseConfig,
    /// Import files whose names contain a `.`
    pub allow_extensions: bool,
    pub table_prefix: String,
    /// Regexes a file name must match to be imported
    pub white_list: Vec<String>,
    /// Regexes excluding otherwise allowed file names
    pub black_list: Vec<String>,
    pub record_sep: String,
    pub field_sep: String,
    #[serde(flatten)]
    pub ingest: IngestOptions,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            allow_extensions: false,
            table_prefix: "epf".to_string(),
            white_list: vec![".*?".to_string()],
            black_list: vec!["^\\.".to_string()],
            record_sep: DEFAULT_RECORD_DELIM.to_string(),
            field_sep: DEFAULT_FIELD_DELIM.to_string(),
            ingest: IngestOptions::default(),
        }
    }
}

impl ImportConfig {
    /// Preset for EPF Flat files
    pub fn flat() -> Self {
        Self {
            allow_extensions: true,
            table_prefix: "epfflat".to_string(),
            record_sep: FLAT_RECORD_DELIM.to_string(),
            field_sep: FLAT_FIELD_DELIM.to_string(),
            ..Self::default()
        }
    }

    /// Read the configuration at `path`, first writing the preset there if
    /// the file does not exist
    pub fn load_or_create(path: &Path, preset: ConfigPreset) -> Result<Self> {
        if !path.exists() {
            let config = preset.config();
            let json = serde_json::to_string_pretty(&config).map_err(|e| {
                IngestError::configuration(format!("cannot serialise configuration: {}", e))
            })?;
            fs::write(path, json)?;
            info!("Created default configuration at {}", path.display());
        }

        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            IngestError::configuration(format!("invalid configuration {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database.name = name.into();
        self
    }

    pub fn with_database_host(mut self, host: impl Into<String>) -> Self {
        self.database.host = host.into();
        self
    }

    pub fn with_database_user(mut self, user: impl Into<String>) -> Self {
        self.database.user = user.into();
        self
    }

    pub fn with_database_password(mut self, password: impl Into<String>) -> Self {
        self.database.password = password.into();
        self
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_separators(mut self, record_sep: impl Into<String>, field_sep: impl Into<String>) -> Self {
        self.record_sep = record_sep.into();
        self.field_sep = field_sep.into();
        self
    }

    pub fn with_allow_extensions(mut self) -> Self {
        self.allow_extensions = true;
        self
    }

    pub fn with_white_list(mut self, patterns: Vec<String>) -> Self {
        self.white_list = patterns;
        self
    }

    pub fn with_black_list(mut self, patterns: Vec<String>) -> Self {
        self.black_list = patterns;
        self
    }

    pub fn with_ingest_options(mut self, options: IngestOptions) -> Self {
        self.ingest = options;
        self
    }

    /// Table prefix, or `None` when tables are named after files alone
    pub fn prefix(&self) -> Option<&str> {
        Some(self.table_prefix.as_str()).filter(|p| !p.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.record_sep.is_empty() || self.field_sep.is_empty() {
            return Err(IngestError::configuration(
                "record and field separators must not be empty",
            ));
        }
        if self.record_sep == self.field_sep {
            return Err(IngestError::configuration(
                "record and field separators must differ",
            ));
        }
        if self.database.name.is_empty() {
            return Err(IngestError::configuration("database name must not be empty"));
        }
        self.ingest.validate()
    }
}
