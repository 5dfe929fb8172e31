//! Core data structures and types for EPF ingestion.
//!
//! Defines the parsed file header, decoded field values, table naming and
//! the per-file run state that is checkpointed for resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::constants::{
    BACKUP_TABLE_SUFFIX, INCREMENTAL_TABLE_SUFFIX, TEMP_TABLE_SUFFIX, UNION_TABLE_SUFFIX,
};

/// How the exporter produced the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportMode {
    /// Complete table contents
    Full,
    /// Only rows added or changed since the previous export
    Incremental,
}

impl ExportMode {
    /// Parse the value of an `exportMode:` header tag
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "FULL" => Some(ExportMode::Full),
            "INCREMENTAL" => Some(ExportMode::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportMode::Full => write!(f, "FULL"),
            ExportMode::Incremental => write!(f, "INCREMENTAL"),
        }
    }
}

/// Schema metadata extracted from the header and trailer of an export file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Column names in file order
    pub column_names: Vec<String>,
    /// Column types after type mapping, aligned with `column_names`
    pub data_types: Vec<String>,
    /// Primary key columns, possibly empty
    pub primary_key: Vec<String>,
    pub export_mode: ExportMode,
    /// Declared record count from the trailer; advisory only
    pub records_expected: u64,
    /// Positions of date-like columns, classified from the declared type
    pub date_columns: Vec<usize>,
    /// Positions of integer-like columns, classified from the declared type
    pub number_columns: Vec<usize>,
}

impl FileHeader {
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    pub fn is_date_column(&self, index: usize) -> bool {
        self.date_columns.contains(&index)
    }

    pub fn is_number_column(&self, index: usize) -> bool {
        self.number_columns.contains(&index)
    }

    /// Keep only the first `count` columns.
    ///
    /// Used when an existing table has fewer columns than the file declares;
    /// cached column positions and primary key entries beyond the cut are
    /// dropped along with the columns.
    pub fn truncate_columns(&mut self, count: usize) {
        if count >= self.column_names.len() {
            return;
        }
        self.column_names.truncate(count);
        self.data_types.truncate(count);
        self.date_columns.retain(|&i| i < count);
        self.number_columns.retain(|&i| i < count);
        let retained = &self.column_names;
        self.primary_key.retain(|k| retained.contains(k));
    }
}

/// A single decoded field value
///
/// Null is carried as its own variant rather than as a textual sentinel,
/// so no field content can be mistaken for a missing value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Null,
    /// Raw field bytes, unchanged
    Text(Vec<u8>),
    /// Date-like field after normalisation
    Date(Vec<u8>),
}

impl FieldValue {
    /// Field content, or `None` for Null
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(bytes) | FieldValue::Date(bytes) => Some(bytes),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.as_bytes().to_vec())
    }
}

/// A decoded data record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based ordinal of the record among the file's data records
    pub number: u64,
    /// Field values aligned positionally with the header columns
    pub fields: Vec<FieldValue>,
}

/// Names of every table a single ingest may touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableNames {
    /// Live table the file is loaded into
    pub target: String,
    /// Build table for full ingests
    pub temp: String,
    /// Side table holding incremental rows on the large path
    pub incremental: String,
    /// Merged table swapped in at the end of the large path
    pub merged: String,
    /// Name the live table is parked under during a swap
    pub backup: String,
}

impl TableNames {
    /// Derive the table names for an export file.
    ///
    /// The target is the optional `prefix_` followed by the file name up to
    /// its first `.`, with hyphens replaced by underscores.
    pub fn for_file(path: &Path, prefix: Option<&str>) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = file_name.split('.').next().unwrap_or_default();
        let target = match prefix {
            Some(p) if !p.is_empty() => format!("{}_{}", p, stem),
            _ => stem.to_string(),
        }
        .replace('-', "_");
        Self::from_target(target)
    }

    /// Derive the auxiliary table names from a target name
    pub fn from_target(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            temp: format!("{}{}", target, TEMP_TABLE_SUFFIX),
            incremental: format!("{}{}", target, INCREMENTAL_TABLE_SUFFIX),
            merged: format!("{}{}", target, UNION_TABLE_SUFFIX),
            backup: format!("{}{}", target, BACKUP_TABLE_SUFFIX),
            target,
        }
    }
}

/// Progress of one file's ingest, persisted by the orchestrator for resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRunState {
    pub file_name: String,
    pub file_path: PathBuf,
    pub tables: TableNames,
    /// High-water mark: number of records durably written
    pub last_record_ingested: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub abort_time: Option<DateTime<Utc>>,
    pub did_abort: bool,
}

impl IngestRunState {
    pub fn new(file_path: &Path, tables: TableNames) -> Self {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file_name,
            file_path: file_path.to_path_buf(),
            tables,
            last_record_ingested: 0,
            start_time: None,
            end_time: None,
            abort_time: None,
            did_abort: false,
        }
    }

    pub fn mark_started(&mut self) {
        self.start_time = Some(Utc::now());
        self.end_time = None;
        self.abort_time = None;
        self.did_abort = false;
    }

    pub fn mark_finished(&mut self) {
        self.end_time = Some(Utc::now());
    }

    pub fn mark_aborted(&mut self) {
        self.abort_time = Some(Utc::now());
        self.did_abort = true;
    }

    /// Build the request needed to pick this run up again
    pub fn resume_request(&self, record_delim: &str, field_delim: &str) -> ResumeRequest {
        ResumeRequest {
            file_path: self.file_path.clone(),
            last_record_ingested: self.last_record_ingested,
            record_delim: record_delim.to_string(),
            field_delim: field_delim.to_string(),
        }
    }
}

/// Everything needed to continue an interrupted ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub file_path: PathBuf,
    pub last_record_ingested: u64,
    pub record_delim: String,
    pub field_delim: String,
}
