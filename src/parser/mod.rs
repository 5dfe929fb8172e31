//! Parser for EPF export files
//!
//! An EPF file is delimited text with its schema carried in-band: a header of
//! comment-prefixed lines naming the columns, their types, the primary key and
//! the export mode, and a trailer declaring how many records were written.
//!
//! ## Architecture
//!
//! - [`header`] - header tag and trailer count extraction
//! - [`record`] - field splitting, Null mapping and date normalisation
//!
//! Records are found by scanning for the record delimiter, so there is no
//! byte-offset index; [`EpfParser::seek_to_record`] rescans from the start of
//! the file and is the only way to resume part-way through.
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//! use epf_ingest::parser::EpfParser;
//!
//! # fn example() -> epf_ingest::Result<()> {
//! let mut parser = EpfParser::open("application", b"\x02\n", b"\x01", &HashMap::new())?;
//! println!("{} columns, {} records expected",
//!          parser.header().column_count(),
//!          parser.header().records_expected);
//!
//! while let Some(record) = parser.next_record()? {
//!     println!("record {} has {} fields", record.number, record.fields.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod header;
pub mod record;

#[cfg(test)]
pub mod tests;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

use self::header::{HeaderBuilder, read_trailer_count};
use self::record::RecordCodec;
use crate::constants::{COMMENT_MARKER, HEADER_SCAN_LINES};
use crate::error::{IngestError, Result};
use crate::models::{FileHeader, Record};

pub use self::record::{ColumnKind, normalize_date};

/// Position of the parser within its file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserCursor {
    /// Byte offset of the next unread byte
    pub offset: u64,
    /// Number of data records read so far; comments are never counted
    pub record_index: u64,
}

/// Sequential and resumable reader over one EPF file
#[derive(Debug)]
pub struct EpfParser {
    path: PathBuf,
    reader: BufReader<File>,
    record_delim: Vec<u8>,
    field_delim: Vec<u8>,
    header: FileHeader,
    codec: RecordCodec,
    cursor: ParserCursor,
}

impl EpfParser {
    /// Open an export file and parse its header and trailer.
    ///
    /// `type_map` substitutes declared column types (for example a generic
    /// `CLOB` for the store's long text type). Date and number columns are
    /// classified from the declared type before substitution.
    pub fn open(
        path: impl AsRef<Path>,
        record_delim: &[u8],
        field_delim: &[u8],
        type_map: &HashMap<String, String>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if record_delim.is_empty() || field_delim.is_empty() {
            return Err(IngestError::configuration(
                "record and field delimiters must not be empty",
            ));
        }

        let mut file = File::open(&path)?;
        let records_expected = read_trailer_count(&mut file, record_delim, &path)?;

        let mut parser = Self {
            path,
            reader: BufReader::new(file),
            record_delim: record_delim.to_vec(),
            field_delim: field_delim.to_vec(),
            header: placeholder_header(),
            codec: RecordCodec::new(&placeholder_header(), field_delim),
            cursor: ParserCursor::default(),
        };

        let mut builder = HeaderBuilder::new();
        let first = parser
            .read_raw_record()?
            .ok_or_else(|| IngestError::format(&parser.path, "file is empty"))?;
        builder.parse_column_line(parser.strip_delim(&first), field_delim, &parser.path)?;

        for _ in 0..HEADER_SCAN_LINES {
            match parser.read_raw_record()? {
                Some(line) => {
                    builder.parse_tag_line(parser.strip_delim(&line), field_delim, &parser.path)?
                }
                None => break,
            }
        }

        parser.header = builder.build(&parser.path, type_map, records_expected)?;
        parser.codec = RecordCodec::new(&parser.header, field_delim);
        parser.rewind()?;

        debug!(
            "Parsed header for {}: {} columns, mode {}, {} records expected",
            parser.path.display(),
            parser.header.column_count(),
            parser.header.export_mode,
            parser.header.records_expected
        );

        Ok(parser)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn cursor(&self) -> ParserCursor {
        self.cursor
    }

    /// Number of data records read since the last rewind
    pub fn latest_record_number(&self) -> u64 {
        self.cursor.record_index
    }

    pub fn column_kinds(&self) -> &[ColumnKind] {
        self.codec.column_kinds()
    }

    /// Restrict decoding to the first `count` columns.
    ///
    /// Records returned afterwards carry at most `count` fields.
    pub fn restrict_columns(&mut self, count: usize) {
        self.header.truncate_columns(count);
        self.codec = RecordCodec::new(&self.header, &self.field_delim);
    }

    /// Read and decode the next data record, skipping comment lines
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(raw) = self.next_raw_data_record()? else {
            return Ok(None);
        };
        let fields = self.codec.decode(self.strip_delim(&raw));
        Ok(Some(Record {
            number: self.cursor.record_index,
            fields,
        }))
    }

    /// Read up to `max_count` records; an empty batch means end of file
    pub fn next_batch(&mut self, max_count: usize) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(max_count.min(4096));
        while records.len() < max_count {
            match self.next_record()? {
                Some(record) => records.push(record),
                None => break,
            }
        }
        Ok(records)
    }

    /// Position the parser so the next record read is record `n + 1`.
    ///
    /// Rescans from the start of the file; seeking past the last record
    /// leaves the parser at end of file.
    pub fn seek_to_record(&mut self, n: u64) -> Result<()> {
        self.rewind()?;
        for _ in 0..n {
            if self.next_raw_data_record()?.is_none() {
                debug!(
                    "Seek to record {} passed end of {} after {} records",
                    n,
                    self.path.display(),
                    self.cursor.record_index
                );
                break;
            }
        }
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.cursor = ParserCursor::default();
        Ok(())
    }

    /// Next record that is not a header or trailer comment
    fn next_raw_data_record(&mut self) -> Result<Option<Vec<u8>>> {
        while let Some(raw) = self.read_raw_record()? {
            if raw.starts_with(COMMENT_MARKER) {
                continue;
            }
            self.cursor.record_index += 1;
            return Ok(Some(raw));
        }
        Ok(None)
    }

    /// Bytes up to and including the next record delimiter, or the
    /// remaining bytes at end of file
    fn read_raw_record(&mut self) -> Result<Option<Vec<u8>>> {
        let last = self.record_delim[self.record_delim.len() - 1];
        let mut buf = Vec::new();
        loop {
            let read = self.reader.read_until(last, &mut buf)?;
            if read == 0 {
                break;
            }
            self.cursor.offset += read as u64;
            if buf.ends_with(&self.record_delim) {
                break;
            }
        }
        Ok((!buf.is_empty()).then_some(buf))
    }

    fn strip_delim<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        raw.strip_suffix(self.record_delim.as_slice()).unwrap_or(raw)
    }
}

impl Iterator for EpfParser {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn placeholder_header() -> FileHeader {
    FileHeader {
        column_names: Vec::new(),
        data_types: Vec::new(),
        primary_key: Vec::new(),
        export_mode: crate::models::ExportMode::Full,
        records_expected: 0,
        date_columns: Vec::new(),
        number_columns: Vec::new(),
    }
}
