//! EPF header and trailer parsing.
//!
//! The first line of an export file lists the column names; the lines that
//! follow carry `#primaryKey:`, `#dbTypes:` and `#exportMode:` tags in no
//! particular order. The trailer carries `#recordsWritten:` with the number
//! of data records the exporter wrote.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

use super::record::{rfind_bytes, split_fields};
use crate::constants::{
    COMMENT_MARKER, DATA_TYPES_TAG, DATE_TYPES, EXPORT_MODE_TAG, NUMBER_TYPES, PRIMARY_KEY_TAG,
    RECORD_COUNT_TAG, TRAILER_WINDOW_BYTES,
};
use crate::error::{IngestError, Result};
use crate::models::{ExportMode, FileHeader};

/// Read the declared record count from the end of the file
pub fn read_trailer_count(file: &mut File, record_delim: &[u8], path: &Path) -> Result<u64> {
    let len = file.seek(SeekFrom::End(0))?;
    let window = TRAILER_WINDOW_BYTES.min(len);
    file.seek(SeekFrom::Start(len - window))?;

    let mut tail = Vec::with_capacity(window as usize);
    file.read_to_end(&mut tail)?;
    file.seek(SeekFrom::Start(0))?;

    let tag = [COMMENT_MARKER, RECORD_COUNT_TAG].concat();
    let start = rfind_bytes(&tail, &tag).ok_or_else(|| {
        IngestError::format(path, "missing #recordsWritten: trailer")
    })? + tag.len();

    let mut value = &tail[start..];
    if let Some(end) = rfind_bytes(value, record_delim) {
        value = &value[..end];
    }

    let text = String::from_utf8_lossy(value.trim_ascii());
    text.parse::<u64>().map_err(|_| {
        IngestError::format(path, format!("unparsable record count '{}' in trailer", text))
    })
}

/// Builder collecting header metadata line by line
#[derive(Debug, Default)]
pub struct HeaderBuilder {
    column_names: Option<Vec<String>>,
    primary_key: Option<Vec<String>>,
    data_types: Option<Vec<String>>,
    export_mode: Option<ExportMode>,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the first header line, which must start with the comment marker
    pub fn parse_column_line(&mut self, line: &[u8], field_delim: &[u8], path: &Path) -> Result<()> {
        let body = line.strip_prefix(COMMENT_MARKER).ok_or_else(|| {
            IngestError::format(path, "first line is not a comment-prefixed column list")
        })?;
        self.column_names = Some(split_text(body, field_delim));
        Ok(())
    }

    /// Parse one of the tag lines following the column list.
    ///
    /// Lines that carry none of the known tags are ignored.
    pub fn parse_tag_line(&mut self, line: &[u8], field_delim: &[u8], path: &Path) -> Result<()> {
        let Some(body) = line.strip_prefix(COMMENT_MARKER) else {
            return Ok(());
        };

        if let Some(rest) = body.strip_prefix(PRIMARY_KEY_TAG) {
            let key = split_text(rest, field_delim);
            // An empty tag declares a table without a primary key
            self.primary_key = Some(if key == [""] { Vec::new() } else { key });
        } else if let Some(rest) = body.strip_prefix(DATA_TYPES_TAG) {
            self.data_types = Some(split_text(rest, field_delim));
        } else if let Some(rest) = body.strip_prefix(EXPORT_MODE_TAG) {
            let value = split_text(rest, field_delim).into_iter().next().unwrap_or_default();
            let mode = ExportMode::parse(&value).ok_or_else(|| {
                IngestError::format(path, format!("unknown export mode '{}'", value))
            })?;
            self.export_mode = Some(mode);
        } else {
            debug!("Ignoring unrecognised header line in {}", path.display());
        }
        Ok(())
    }

    /// Validate the collected metadata and apply the type mapping
    pub fn build(
        self,
        path: &Path,
        type_map: &HashMap<String, String>,
        records_expected: u64,
    ) -> Result<FileHeader> {
        let column_names = self
            .column_names
            .ok_or_else(|| IngestError::format(path, "missing column name line"))?;

        if column_names.iter().any(|c| c.trim().is_empty()) {
            return Err(IngestError::format(path, "empty column name in header"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = column_names.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(IngestError::format(path, format!("duplicate column '{}'", dup)));
        }

        let declared_types = self
            .data_types
            .ok_or_else(|| IngestError::format(path, "missing #dbTypes: header tag"))?;
        if declared_types.len() != column_names.len() {
            return Err(IngestError::format(
                path,
                format!(
                    "{} column names but {} data types",
                    column_names.len(),
                    declared_types.len()
                ),
            ));
        }

        let primary_key = self.primary_key.unwrap_or_default();
        if let Some(missing) = primary_key.iter().find(|k| !column_names.contains(k)) {
            return Err(IngestError::format(
                path,
                format!("primary key column '{}' is not a declared column", missing),
            ));
        }

        let export_mode = self.export_mode.unwrap_or_else(|| {
            warn!("No export mode declared in {}; assuming FULL", path.display());
            ExportMode::Full
        });

        let mut data_types = Vec::with_capacity(declared_types.len());
        let mut date_columns = Vec::new();
        let mut number_columns = Vec::new();
        for (i, declared) in declared_types.iter().enumerate() {
            let base = base_type(declared);
            if DATE_TYPES.contains(&base.as_str()) {
                date_columns.push(i);
            }
            if NUMBER_TYPES.contains(&base.as_str()) {
                number_columns.push(i);
            }
            data_types.push(type_map.get(declared).unwrap_or(declared).clone());
        }

        Ok(FileHeader {
            column_names,
            data_types,
            primary_key,
            export_mode,
            records_expected,
            date_columns,
            number_columns,
        })
    }
}

/// Upper-cased type name without any length or precision suffix
fn base_type(declared: &str) -> String {
    declared
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_uppercase()
}

fn split_text(bytes: &[u8], field_delim: &[u8]) -> Vec<String> {
    split_fields(bytes, field_delim)
        .into_iter()
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect()
}
