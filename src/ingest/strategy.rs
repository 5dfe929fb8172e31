//! Load strategy selection

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{ExportMode, FileHeader};
use crate::store::WriteMode;

/// How a file is loaded into its target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadStrategy {
    /// Build the table under a temporary name, then swap it in
    FullSwap,
    /// Upsert rows directly into the live table
    IncrementalInPlace,
    /// Load rows into a side table, merge with the live table, swap the result in
    IncrementalMerge,
}

impl LoadStrategy {
    /// Pick the strategy from the export mode and declared record count
    pub fn select(header: &FileHeader, large_incremental_threshold: u64) -> Self {
        match header.export_mode {
            ExportMode::Full => LoadStrategy::FullSwap,
            ExportMode::Incremental if header.records_expected < large_incremental_threshold => {
                LoadStrategy::IncrementalInPlace
            }
            ExportMode::Incremental => LoadStrategy::IncrementalMerge,
        }
    }

    /// Statement verb for batch writes
    pub fn write_mode(self, skip_key_violators: bool) -> WriteMode {
        match self {
            LoadStrategy::FullSwap if skip_key_violators => WriteMode::InsertIgnore,
            LoadStrategy::FullSwap => WriteMode::Insert,
            LoadStrategy::IncrementalInPlace | LoadStrategy::IncrementalMerge => WriteMode::Upsert,
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::FullSwap => write!(f, "full"),
            LoadStrategy::IncrementalInPlace => write!(f, "incremental"),
            LoadStrategy::IncrementalMerge => write!(f, "incremental (merge)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(mode: ExportMode, records_expected: u64) -> FileHeader {
        FileHeader {
            column_names: vec!["id".into()],
            data_types: vec!["INT".into()],
            primary_key: vec!["id".into()],
            export_mode: mode,
            records_expected,
            date_columns: Vec::new(),
            number_columns: vec![0],
        }
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            LoadStrategy::select(&header(ExportMode::Full, 10_000_000), 500_000),
            LoadStrategy::FullSwap
        );
        assert_eq!(
            LoadStrategy::select(&header(ExportMode::Incremental, 499_999), 500_000),
            LoadStrategy::IncrementalInPlace
        );
        assert_eq!(
            LoadStrategy::select(&header(ExportMode::Incremental, 500_000), 500_000),
            LoadStrategy::IncrementalMerge
        );
    }

    #[test]
    fn test_write_modes() {
        assert_eq!(LoadStrategy::FullSwap.write_mode(false), WriteMode::Insert);
        assert_eq!(LoadStrategy::FullSwap.write_mode(true), WriteMode::InsertIgnore);
        assert_eq!(
            LoadStrategy::IncrementalMerge.write_mode(true),
            WriteMode::Upsert
        );
    }
}
