//! Test utilities for EPF parser testing
//!
//! Provides a fixture builder that writes EPF-formatted bytes to a temporary
//! file, shared by the parser and ingest test modules.

use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

use crate::constants::{DEFAULT_FIELD_DELIM, DEFAULT_RECORD_DELIM};


/// Builder for EPF export file contents
#[derive(Debug, Clone)]
pub struct EpfFixture {
    pub columns: Vec<String>,
    pub types: Vec<String>,
    pub primary_key: Vec<String>,
    pub export_mode: Option<String>,
    pub rows: Vec<Vec<Vec<u8>>>,
    /// Overrides the trailer count; defaults to the number of rows
    pub declared_count: Option<String>,
    pub record_delim: Vec<u8>,
    pub field_delim: Vec<u8>,
}

impl EpfFixture {
    pub fn new(columns: &[&str], types: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            types: types.iter().map(|t| t.to_string()).collect(),
            primary_key: Vec::new(),
            export_mode: Some("FULL".to_string()),
            rows: Vec::new(),
            declared_count: None,
            record_delim: DEFAULT_RECORD_DELIM.as_bytes().to_vec(),
            field_delim: DEFAULT_FIELD_DELIM.as_bytes().to_vec(),
        }
    }

    /// The three-column application table used across tests
    pub fn application() -> Self {
        Self::new(&["id", "name", "export_date"], &["INT", "VARCHAR(100)", "BIGINT"])
            .primary_key(&["id"])
    }

    pub fn primary_key(mut self, key: &[&str]) -> Self {
        self.primary_key = key.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn mode(mut self, mode: &str) -> Self {
        self.export_mode = Some(mode.to_string());
        self
    }

    pub fn without_mode(mut self) -> Self {
        self.export_mode = None;
        self
    }

    pub fn flat(mut self) -> Self {
        self.record_delim = b"\n".to_vec();
        self.field_delim = b"\t".to_vec();
        self
    }

    pub fn declared_count(mut self, count: &str) -> Self {
        self.declared_count = Some(count.to_string());
        self
    }

    pub fn row(mut self, fields: &[&str]) -> Self {
        self.rows
            .push(fields.iter().map(|f| f.as_bytes().to_vec()).collect());
        self
    }

    pub fn raw_row(mut self, fields: Vec<Vec<u8>>) -> Self {
        self.rows.push(fields);
        self
    }

    fn line(&self, out: &mut Vec<u8>, parts: &[Vec<u8>]) {
        out.extend_from_slice(&parts.join(self.field_delim.as_slice()));
        out.extend_from_slice(&self.record_delim);
    }

    fn text_line(&self, out: &mut Vec<u8>, prefix: &str, parts: &[String]) {
        out.extend_from_slice(prefix.as_bytes());
        let fields: Vec<Vec<u8>> = parts.iter().map(|p| p.as_bytes().to_vec()).collect();
        self.line(out, &fields);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.text_line(&mut out, "#", &self.columns);
        self.text_line(&mut out, "#primaryKey:", &self.primary_key);
        self.text_line(&mut out, "#dbTypes:", &self.types);
        if let Some(mode) = &self.export_mode {
            self.text_line(&mut out, "#exportMode:", std::slice::from_ref(mode));
        }
        for row in &self.rows {
            self.line(&mut out, row);
        }
        let count = self
            .declared_count
            .clone()
            .unwrap_or_else(|| self.rows.len().to_string());
        self.text_line(&mut out, "#recordsWritten:", &[count]);
        out
    }

    /// Write the fixture to a temporary file
    pub fn write(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.to_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    /// Write the fixture under a chosen file name inside `dir`
    pub fn write_to(&self, dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.to_bytes()).unwrap();
        path
    }
}

pub fn default_type_map() -> HashMap<String, String> {
    HashMap::from([("CLOB".to_string(), "LONGTEXT".to_string())])
}
