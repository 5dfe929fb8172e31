//! Record decoding for EPF data lines
//!
//! Turns the raw bytes of one record into positional [`FieldValue`]s:
//! splitting on the field delimiter, trimming surplus fields, mapping empty
//! fields to Null and normalising date-like columns.

use crate::constants::DATE_MAX_LEN;
use crate::models::{FieldValue, FileHeader};

/// How a column's values are treated during decoding and escaping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Plain,
    Date,
    Number,
}

/// Per-file decoder with column kinds cached from the header
#[derive(Debug, Clone)]
pub struct RecordCodec {
    field_delim: Vec<u8>,
    kinds: Vec<ColumnKind>,
}

impl RecordCodec {
    /// Build a codec for the header's current column set
    pub fn new(header: &FileHeader, field_delim: &[u8]) -> Self {
        let kinds = (0..header.column_count())
            .map(|i| {
                if header.is_date_column(i) {
                    ColumnKind::Date
                } else if header.is_number_column(i) {
                    ColumnKind::Number
                } else {
                    ColumnKind::Plain
                }
            })
            .collect();

        Self {
            field_delim: field_delim.to_vec(),
            kinds,
        }
    }

    pub fn column_kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    /// Decode one record body (record delimiter already stripped).
    ///
    /// Fields beyond the column count are discarded; a record with too few
    /// fields is padded with Null so values stay aligned with the columns.
    pub fn decode(&self, line: &[u8]) -> Vec<FieldValue> {
        let mut values: Vec<FieldValue> = split_fields(line, &self.field_delim)
            .into_iter()
            .zip(self.kinds.iter())
            .map(|(raw, kind)| decode_field(raw, *kind))
            .collect();

        if values.len() < self.kinds.len() {
            tracing::debug!(
                "Record has {} fields, padding to {} columns",
                values.len(),
                self.kinds.len()
            );
            values.resize(self.kinds.len(), FieldValue::Null);
        }
        values
    }
}

fn decode_field(raw: &[u8], kind: ColumnKind) -> FieldValue {
    if raw.is_empty() {
        return FieldValue::Null;
    }
    match kind {
        ColumnKind::Date => FieldValue::Date(normalize_date(raw)),
        ColumnKind::Plain | ColumnKind::Number => FieldValue::Text(raw.to_vec()),
    }
}

/// Normalise an exported date value into `YYYY-MM-DD[-HH:MM:SS]` shape.
///
/// Most exported dates look like `2009 06 21`; some carry a zone suffix such
/// as `2005-09-06-00:00:00-Etc/GMT`, and a few are a bare year.
pub fn normalize_date(raw: &[u8]) -> Vec<u8> {
    let mut value: Vec<u8> = raw
        .trim_ascii()
        .iter()
        .map(|&b| if b == b' ' { b'-' } else { b })
        .collect();
    value.truncate(DATE_MAX_LEN);

    if value.len() == 4 && value.iter().all(u8::is_ascii_digit) {
        value.extend_from_slice(b"-01-01");
    }
    value
}

/// Split `line` on every occurrence of `delim`.
///
/// Always yields at least one (possibly empty) slice.
pub fn split_fields<'a>(line: &'a [u8], delim: &[u8]) -> Vec<&'a [u8]> {
    let mut fields = Vec::new();
    if delim.is_empty() {
        fields.push(line);
        return fields;
    }

    let mut start = 0;
    let mut i = 0;
    while i + delim.len() <= line.len() {
        if &line[i..i + delim.len()] == delim {
            fields.push(&line[start..i]);
            i += delim.len();
            start = i;
        } else {
            i += 1;
        }
    }
    fields.push(&line[start..]);
    fields
}

/// Position of the last occurrence of `needle` in `haystack`
pub fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_multibyte_delimiter() {
        assert_eq!(
            split_fields(b"a::b::::c", b"::"),
            vec![&b"a"[..], &b"b"[..], &b""[..], &b"c"[..]]
        );
        assert_eq!(split_fields(b"", b"\x01"), vec![&b""[..]]);
    }

    #[test]
    fn test_rfind_bytes() {
        assert_eq!(rfind_bytes(b"#x#x", b"#x"), Some(2));
        assert_eq!(rfind_bytes(b"abc", b"zz"), None);
    }
}
