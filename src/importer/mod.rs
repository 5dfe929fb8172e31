//! Directory importer
//!
//! Walks export directories, ingests every selected file with the
//! [`Ingester`](crate::ingest::Ingester) and keeps a [`Snapshot`] of its
//! progress on disk. A failing file is recorded and skipped; the snapshot
//! lets [`Importer::resume`] continue an interrupted import where it
//! stopped, picking up a partly written file from its last checkpoint.
//!
//! # Examples
//!
//! ```no_run
//! use epf_ingest::config::ImportConfig;
//! use epf_ingest::importer::Importer;
//! use epf_ingest::store::SqliteStore;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("epf.db")?;
//! let mut importer = Importer::new(store, ImportConfig::default(), "EPFSnapshot.json")?;
//! let summary = importer.run(&[PathBuf::from("itunes20100105")])?;
//! println!("{} files failed", summary.failed_count());
//! # Ok(())
//! # }
//! ```

pub mod filter;
pub mod snapshot;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use self::filter::effective_deny_list;
use self::snapshot::{DirectoryProgress, SnapshotFile};
use crate::config::ImportConfig;
use crate::error::Result;
use crate::ingest::{IngestReport, Ingester};
use crate::models::{IngestRunState, TableNames};
use crate::parser::EpfParser;
use crate::store::TargetStore;

pub use self::filter::FileFilter;
pub use self::snapshot::Snapshot;

/// Result of importing one directory
#[derive(Debug, Clone)]
pub struct DirectoryOutcome {
    pub dir: PathBuf,
    pub reports: Vec<IngestReport>,
    /// Names of files that could not be opened or ingested
    pub failed: Vec<String>,
    /// Files imported by the interrupted run this one resumed
    pub imported_before: Vec<String>,
}

/// Result of a whole import or resume
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub directories: Vec<DirectoryOutcome>,
    pub elapsed: Duration,
}

impl ImportSummary {
    pub fn reports(&self) -> impl Iterator<Item = &IngestReport> {
        self.directories.iter().flat_map(|d| d.reports.iter())
    }

    pub fn failed_count(&self) -> usize {
        self.directories.iter().map(|d| d.failed.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Imports export directories into a store
pub struct Importer<S: TargetStore> {
    store: S,
    config: ImportConfig,
    journal: SnapshotFile,
    show_progress: bool,
}

impl<S: TargetStore> Importer<S> {
    pub fn new(store: S, config: ImportConfig, snapshot_path: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            journal: SnapshotFile::new(snapshot_path, Snapshot::default()),
            show_progress: false,
        })
    }

    /// Draw a progress bar for each file
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.journal.snapshot
    }

    /// Import every directory in order
    pub fn run(&mut self, dirs: &[PathBuf]) -> Result<ImportSummary> {
        let started = Instant::now();
        let dirs = dirs
            .iter()
            .map(|d| std::path::absolute(d))
            .collect::<std::io::Result<Vec<_>>>()?;

        let snapshot = Snapshot {
            table_prefix: self.config.prefix().map(str::to_string),
            dirs_to_import: dirs.clone(),
            dirs_left: dirs.clone(),
            white_list: self.config.white_list.clone(),
            black_list: effective_deny_list(&self.config.black_list, self.config.allow_extensions),
            current_dict: None,
        };
        let filter = FileFilter::new(&snapshot.white_list, &snapshot.black_list)?;
        self.journal.snapshot = snapshot;
        self.journal.save()?;

        let mut summary = ImportSummary::default();
        self.import_directories(&dirs, &filter, &mut summary)?;
        summary.elapsed = started.elapsed();
        log_summary(&summary);
        Ok(summary)
    }

    /// Import a single directory with the configured filter and separators
    pub fn import_directory(&mut self, dir: &Path) -> Result<DirectoryOutcome> {
        let dir = std::path::absolute(dir)?;
        let deny = effective_deny_list(&self.config.black_list, self.config.allow_extensions);
        let filter = FileFilter::new(&self.config.white_list, &deny)?;
        if self.journal.snapshot.table_prefix.is_none() {
            self.journal.snapshot.table_prefix = self.config.prefix().map(str::to_string);
        }
        let record_sep = self.config.record_sep.clone();
        let field_sep = self.config.field_sep.clone();
        self.import_selected(&dir, &filter, &record_sep, &field_sep, None)
    }

    /// Continue the import recorded in the snapshot file.
    ///
    /// The interrupted directory is finished first, with the separators it
    /// was started with; files already imported there are not touched again.
    /// The remaining directories follow with the recorded filter.
    pub fn resume(&mut self) -> Result<ImportSummary> {
        let started = Instant::now();
        self.journal = SnapshotFile::load(self.journal.path().to_path_buf())?;
        let snapshot = self.journal.snapshot.clone();
        info!(
            "Resuming import from {} ({} directories left)",
            self.journal.path().display(),
            snapshot.dirs_left.len()
        );

        let mut summary = ImportSummary::default();
        if let Some(current) = snapshot.current_dict {
            info!(
                "Resuming {} with {} files left",
                current.dir_path.display(),
                current.files_left.len()
            );
            let filter = FileFilter::exact(&current.files_left, &current.files_imported)?;
            let (dir, record_sep, field_sep) = (
                current.dir_path.clone(),
                current.record_sep.clone(),
                current.field_sep.clone(),
            );
            let outcome =
                self.import_selected(&dir, &filter, &record_sep, &field_sep, Some(current))?;
            summary.directories.push(outcome);
        }

        let filter = FileFilter::new(&snapshot.white_list, &snapshot.black_list)?;
        self.import_directories(&snapshot.dirs_left, &filter, &mut summary)?;
        summary.elapsed = started.elapsed();
        log_summary(&summary);
        Ok(summary)
    }

    fn import_directories(
        &mut self,
        dirs: &[PathBuf],
        filter: &FileFilter,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let record_sep = self.config.record_sep.clone();
        let field_sep = self.config.field_sep.clone();
        for dir in dirs {
            let outcome = self.import_selected(dir, filter, &record_sep, &field_sep, None)?;
            summary.directories.push(outcome);
        }
        Ok(())
    }

    fn import_selected(
        &mut self,
        dir: &Path,
        filter: &FileFilter,
        record_sep: &str,
        field_sep: &str,
        previous: Option<DirectoryProgress>,
    ) -> Result<DirectoryOutcome> {
        let started = Instant::now();
        let files = filter.select_files(dir)?;
        info!("Importing {} files from {}", files.len(), dir.display());

        // A resumed directory keeps the lists of the interrupted run
        let progress = match previous {
            Some(mut progress) => {
                progress.files_left = files.clone();
                progress
            }
            None => DirectoryProgress::new(dir, record_sep, field_sep, files.clone()),
        };
        let imported_before = progress.files_imported.clone();
        self.journal.snapshot.dirs_left.retain(|d| d != dir);
        self.journal.snapshot.current_dict = Some(progress);
        self.journal.save()?;

        let mut outcome = DirectoryOutcome {
            dir: dir.to_path_buf(),
            reports: Vec::new(),
            failed: Vec::new(),
            imported_before,
        };
        for name in &files {
            let resume_state = self
                .journal
                .current()
                .and_then(|c| c.interrupted_ingest(name).cloned());

            match self.import_file(&dir.join(name), record_sep, field_sep, resume_state) {
                Ok(report) => {
                    if let Some(current) = self.journal.current() {
                        current.mark_imported(name);
                    }
                    outcome.reports.push(report);
                }
                Err(err) => {
                    error!("Failed to import {}: {}", name, err);
                    if let Some(current) = self.journal.current() {
                        current.mark_failed(name);
                    }
                    outcome.failed.push(name.clone());
                }
            }
            self.journal.save()?;
        }

        info!(
            "Imported {} of {} files from {} in {:.1}s",
            outcome.reports.len(),
            files.len(),
            dir.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(outcome)
    }

    fn import_file(
        &mut self,
        path: &Path,
        record_sep: &str,
        field_sep: &str,
        resume_state: Option<IngestRunState>,
    ) -> Result<IngestReport> {
        let mut ingester =
            Ingester::new(&mut self.store, &self.config.ingest).with_progress(self.show_progress);

        match resume_state {
            Some(state) => {
                let request = state.resume_request(record_sep, field_sep);
                ingester.resume(&request, &state.tables, &mut self.journal)
            }
            None => {
                let parser = EpfParser::open(
                    path,
                    record_sep.as_bytes(),
                    field_sep.as_bytes(),
                    &self.config.ingest.type_map,
                )?;
                let tables =
                    TableNames::for_file(path, self.journal.snapshot.table_prefix.as_deref());
                ingester.ingest(parser, &tables, &mut self.journal)
            }
        }
    }
}

fn log_summary(summary: &ImportSummary) {
    for outcome in &summary.directories {
        if !outcome.failed.is_empty() {
            warn!(
                "The following files encountered errors and were not imported from {}: {}",
                outcome.dir.display(),
                outcome.failed.join(", ")
            );
        }
    }
    info!(
        "Total import time for all directories: {:.1}s",
        summary.elapsed.as_secs_f64()
    );
}
