//! Application constants for the EPF ingester
//!
//! This module contains the file-format tags, default delimiters, load
//! thresholds and table-naming suffixes used throughout the crate.

// =============================================================================
// File Format Tags
// =============================================================================

/// Marker byte that prefixes every header and trailer line
pub const COMMENT_MARKER: &[u8] = b"#";

/// Header tag listing the primary key columns
pub const PRIMARY_KEY_TAG: &[u8] = b"primaryKey:";

/// Header tag listing the declared column types
pub const DATA_TYPES_TAG: &[u8] = b"dbTypes:";

/// Header tag declaring the export mode
pub const EXPORT_MODE_TAG: &[u8] = b"exportMode:";

/// Trailer tag preceding the declared record count
pub const RECORD_COUNT_TAG: &[u8] = b"recordsWritten:";

/// Number of lines after the column-name line scanned for header tags
pub const HEADER_SCAN_LINES: usize = 5;

/// Size of the window read from end-of-file when looking for the trailer
pub const TRAILER_WINDOW_BYTES: u64 = 40;

// =============================================================================
// Delimiters
// =============================================================================

/// Default EPF record separator (STX followed by newline)
pub const DEFAULT_RECORD_DELIM: &str = "\x02\n";

/// Default EPF field separator (SOH)
pub const DEFAULT_FIELD_DELIM: &str = "\x01";

/// EPF Flat record separator
pub const FLAT_RECORD_DELIM: &str = "\n";

/// EPF Flat field separator
pub const FLAT_FIELD_DELIM: &str = "\t";

// =============================================================================
// Column Type Classification
// =============================================================================

/// Declared types whose values are normalised as dates
pub const DATE_TYPES: &[&str] = &["DATE", "DATETIME", "TIME", "TIMESTAMP"];

/// Declared types whose values are emitted as bare integers when possible
pub const NUMBER_TYPES: &[&str] = &["INTEGER", "INT", "BIGINT", "TINYINT"];

/// Maximum length of a normalised date value
pub const DATE_MAX_LEN: usize = 19;

// =============================================================================
// Ingest Defaults
// =============================================================================

/// Records per bulk write statement
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Incremental files at or above this record count use the merge-and-swap path
pub const LARGE_INCREMENTAL_THRESHOLD: u64 = 500_000;

/// Minimum records written between two checkpoints
pub const CHECKPOINT_RECORD_GAP: u64 = 5_000;

/// Minimum seconds elapsed between two checkpoints
pub const CHECKPOINT_SECONDS: u64 = 120;

/// Column compared when deciding whether an existing row is superseded
pub const DEFAULT_FRESHNESS_COLUMN: &str = "export_date";

// =============================================================================
// Table Naming
// =============================================================================

/// Suffix of the table a full ingest is built into
pub const TEMP_TABLE_SUFFIX: &str = "_tmp";

/// Suffix of the side table holding incremental rows on the large path
pub const INCREMENTAL_TABLE_SUFFIX: &str = "_inc";

/// Suffix of the merged table on the large incremental path
pub const UNION_TABLE_SUFFIX: &str = "_un";

/// Suffix the live table is renamed to during a swap
pub const BACKUP_TABLE_SUFFIX: &str = "_old";

// =============================================================================
// Orchestrator Files
// =============================================================================

/// Default location of the EPF importer configuration
pub const DEFAULT_CONFIG_PATH: &str = "./EPFConfig.json";

/// Default location of the EPF Flat importer configuration
pub const DEFAULT_FLAT_CONFIG_PATH: &str = "./EPFFlatConfig.json";

/// Default location of the resume snapshot
pub const DEFAULT_SNAPSHOT_PATH: &str = "./EPFSnapshot.json";

/// Base name of rolling log files
pub const LOG_FILE_PREFIX: &str = "EPFLog.log";
