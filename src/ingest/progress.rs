//! Checkpoint pacing and progress reporting for a single ingest
//!
//! [`CheckpointGate`] decides when run state is worth persisting; it takes
//! the current instant as an argument so the pacing can be driven from tests.
//! [`ProgressReporter`] wraps an optional indicatif bar sized by the record
//! count declared in the file trailer.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::IngestOptions;

/// Rate limiter for checkpoints
///
/// A checkpoint is due only when both the record gap and the time gap since
/// the previous checkpoint have been reached.
#[derive(Debug, Clone)]
pub struct CheckpointGate {
    record_gap: u64,
    interval: Duration,
    last_records: u64,
    last_time: Instant,
}

impl CheckpointGate {
    pub fn new(options: &IngestOptions, records_written: u64, now: Instant) -> Self {
        Self {
            record_gap: options.checkpoint_record_gap,
            interval: Duration::from_secs(options.checkpoint_seconds),
            last_records: records_written,
            last_time: now,
        }
    }

    pub fn is_due(&self, records_written: u64, now: Instant) -> bool {
        records_written.saturating_sub(self.last_records) >= self.record_gap
            && now.saturating_duration_since(self.last_time) >= self.interval
    }

    /// Record that a checkpoint was taken
    pub fn mark(&mut self, records_written: u64, now: Instant) {
        self.last_records = records_written;
        self.last_time = now;
    }
}

/// Progress bar for one file's records
pub struct ProgressReporter {
    progress_bar: Option<ProgressBar>,
    total_records: u64,
}

impl ProgressReporter {
    /// Reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            progress_bar: None,
            total_records: 0,
        }
    }

    /// Create a bar for `total_records`; no bar is drawn for an empty file
    pub fn new(table: &str, total_records: u64, already_written: u64) -> Self {
        if total_records == 0 {
            return Self::hidden();
        }

        let pb = ProgressBar::new(total_records);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({percent}%) | {msg}",
        )
        .map(|s| s.progress_chars("█▉▊▋▌▍▎▏  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_position(already_written.min(total_records));
        pb.set_message(table.to_string());

        debug!("Progress bar initialized for {} records", total_records);
        Self {
            progress_bar: Some(pb),
            total_records,
        }
    }

    pub fn set_position(&self, records_written: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_position(records_written.min(self.total_records));
        }
    }

    pub fn finish(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message(message.to_string());
        }
    }

    pub fn finish_with_error(&self, error_message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message(format!("Failed: {}", error_message));
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.progress_bar.is_some()
    }

    pub fn current_position(&self) -> u64 {
        self.progress_bar.as_ref().map_or(0, |pb| pb.position())
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(ref pb) = self.progress_bar {
            if !pb.is_finished() {
                pb.finish_and_clear();
            }
        }
    }
}
