//! Persisted progress of a multi-directory import
//!
//! The snapshot is rewritten after every file and at every engine
//! checkpoint, so an interrupted import can pick up with the directory and
//! file it was working on.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::ingest::CheckpointSink;
use crate::models::IngestRunState;

/// Progress through the directory currently being imported
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryProgress {
    pub record_sep: String,
    pub field_sep: String,
    pub dir_path: PathBuf,
    pub files_to_import: Vec<String>,
    pub files_left: Vec<String>,
    pub files_imported: Vec<String>,
    pub failed_files: Vec<String>,
    /// Run state of the most recent checkpointed or aborted ingest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_ingest: Option<IngestRunState>,
}

impl DirectoryProgress {
    pub fn new(dir_path: &Path, record_sep: &str, field_sep: &str, files: Vec<String>) -> Self {
        Self {
            record_sep: record_sep.to_string(),
            field_sep: field_sep.to_string(),
            dir_path: dir_path.to_path_buf(),
            files_left: files.clone(),
            files_to_import: files,
            files_imported: Vec::new(),
            failed_files: Vec::new(),
            active_ingest: None,
        }
    }

    pub fn mark_imported(&mut self, file_name: &str) {
        self.files_left.retain(|f| f != file_name);
        self.failed_files.retain(|f| f != file_name);
        self.files_imported.push(file_name.to_string());
        if self
            .active_ingest
            .as_ref()
            .is_some_and(|state| state.file_name == file_name)
        {
            self.active_ingest = None;
        }
    }

    /// Record a failure; the file stays in `files_left` for a later resume
    pub fn mark_failed(&mut self, file_name: &str) {
        if !self.failed_files.iter().any(|f| f == file_name) {
            self.failed_files.push(file_name.to_string());
        }
    }

    /// Interrupted run state for `file_name`, if one was recorded
    pub fn interrupted_ingest(&self, file_name: &str) -> Option<&IngestRunState> {
        self.active_ingest
            .as_ref()
            .filter(|state| state.file_name == file_name && state.last_record_ingested > 0)
    }
}

/// Whole-import snapshot, stored as JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub table_prefix: Option<String>,
    pub dirs_to_import: Vec<PathBuf>,
    pub dirs_left: Vec<PathBuf>,
    #[serde(rename = "wList")]
    pub white_list: Vec<String>,
    #[serde(rename = "bList")]
    pub black_list: Vec<String>,
    #[serde(default)]
    pub current_dict: Option<DirectoryProgress>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| IngestError::Snapshot {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the snapshot through a temporary file so a crash never leaves
    /// a truncated snapshot behind
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|source| IngestError::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
        let mut staging = path.as_os_str().to_owned();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        fs::write(&staging, json)?;
        fs::rename(&staging, path)?;
        debug!("Saved snapshot to {}", path.display());
        Ok(())
    }
}

/// Snapshot bound to its file; receives engine checkpoints
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    pub snapshot: Snapshot,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>, snapshot: Snapshot) -> Self {
        Self {
            path: path.into(),
            snapshot,
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = Snapshot::load(&path)?;
        Ok(Self { path, snapshot })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        self.snapshot.save(&self.path)
    }

    pub fn current(&mut self) -> Option<&mut DirectoryProgress> {
        self.snapshot.current_dict.as_mut()
    }
}

impl CheckpointSink for SnapshotFile {
    fn checkpoint(&mut self, state: &IngestRunState) -> Result<()> {
        if let Some(current) = self.snapshot.current_dict.as_mut() {
            current.active_ingest = Some(state.clone());
        }
        self.save()
    }
}
