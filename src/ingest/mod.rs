//! Ingest engine
//!
//! Drives one parsed export file into its target table using one of three
//! load strategies:
//!
//! - **full**: build the table under a temporary name, then swap it in
//! - **incremental**: upsert rows straight into the live table
//! - **incremental (merge)**: for large deltas, load a side table, merge it
//!   with the live table into a union table, constrain it and swap it in
//!
//! Progress is tracked as a high-water mark in [`IngestRunState`] and handed
//! to a [`CheckpointSink`] at a bounded rate, so an interrupted run can be
//! resumed from the last checkpoint with [`Ingester::resume`].

pub mod merge;
pub mod progress;
pub mod strategy;
pub mod swap;
pub mod writer;

#[cfg(test)]
mod tests;

use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use self::merge::MergePlan;
use self::progress::{CheckpointGate, ProgressReporter};
use self::swap::{drop_table_quietly, swap_into_place};
use self::writer::BatchWriter;
use crate::config::DiagnosticPolicy;
use crate::error::{IngestError, Result};
use crate::models::{IngestRunState, ResumeRequest, TableNames};
use crate::parser::EpfParser;
use crate::store::{DiagnosticClass, StoreError, TargetStore};

pub use self::strategy::LoadStrategy;
pub use crate::config::IngestOptions;

/// Receiver of run state at checkpoints and on abort
pub trait CheckpointSink {
    fn checkpoint(&mut self, state: &IngestRunState) -> Result<()>;
}

/// Sink that discards checkpoints
impl CheckpointSink for () {
    fn checkpoint(&mut self, _state: &IngestRunState) -> Result<()> {
        Ok(())
    }
}

/// How an ingest ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Completed,
    /// Nothing was written
    Skipped { reason: String },
}

/// Summary of one file's ingest
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub table: String,
    pub strategy: LoadStrategy,
    pub outcome: IngestOutcome,
    /// High-water mark at the end of the run
    pub records_written: u64,
    /// Records dropped for colliding on the primary key in this run
    pub records_rejected: u64,
    /// Checkpoints the sink failed to record; the saved resume point may
    /// lag behind `records_written`
    pub checkpoint_failures: u64,
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, IngestOutcome::Skipped { .. })
    }
}

/// Log a store notice at the level the policy allows
pub(crate) fn log_store_warning(policy: &DiagnosticPolicy, class: DiagnosticClass, message: &str) {
    if policy.is_allowed(class) {
        debug!("Store notice ({}): {}", class, message);
    } else {
        warn!("Store warning ({}): {}", class, message);
    }
}

fn fatal_write(table: &str, last_record: u64, source: StoreError) -> IngestError {
    IngestError::FatalWrite {
        table: table.to_string(),
        last_record,
        source,
    }
}

/// Counters from writing one file's records
#[derive(Debug, Default)]
struct Populated {
    rejected: u64,
    checkpoint_failures: u64,
}

/// Loads export files into a target store
pub struct Ingester<'a, S: TargetStore + ?Sized> {
    store: &'a mut S,
    options: &'a IngestOptions,
    show_progress: bool,
}

impl<'a, S: TargetStore + ?Sized> Ingester<'a, S> {
    pub fn new(store: &'a mut S, options: &'a IngestOptions) -> Self {
        Self {
            store,
            options,
            show_progress: false,
        }
    }

    /// Draw a progress bar while records are written
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Load a freshly opened file from its first record
    pub fn ingest(
        &mut self,
        parser: EpfParser,
        tables: &TableNames,
        sink: &mut dyn CheckpointSink,
    ) -> Result<IngestReport> {
        let state = IngestRunState::new(parser.path(), tables.clone());
        self.drive(parser, state, false, sink)
    }

    /// Continue an interrupted load from its high-water mark.
    ///
    /// The tables of the interrupted run are written into as they are; if
    /// the table to continue into no longer exists the file is loaded again
    /// from the start.
    pub fn resume(
        &mut self,
        request: &ResumeRequest,
        tables: &TableNames,
        sink: &mut dyn CheckpointSink,
    ) -> Result<IngestReport> {
        let parser = EpfParser::open(
            &request.file_path,
            request.record_delim.as_bytes(),
            request.field_delim.as_bytes(),
            &self.options.type_map,
        )?;
        let mut state = IngestRunState::new(&request.file_path, tables.clone());
        state.last_record_ingested = request.last_record_ingested;
        self.drive(parser, state, true, sink)
    }

    fn drive(
        &mut self,
        parser: EpfParser,
        mut state: IngestRunState,
        resume: bool,
        sink: &mut dyn CheckpointSink,
    ) -> Result<IngestReport> {
        self.options.validate()?;
        match self.run(parser, &mut state, resume, sink) {
            Ok(report) => Ok(report),
            Err(err) if err.is_fail_closed() => Err(err),
            Err(err) => {
                state.mark_aborted();
                error!(
                    "Aborting ingest of {} after {} records: {}",
                    state.file_name, state.last_record_ingested, err
                );
                if let Err(sink_err) = sink.checkpoint(&state) {
                    error!(
                        "Could not record aborted run state of {}; resume point is stale: {}",
                        state.file_name, sink_err
                    );
                }
                Err(err)
            }
        }
    }

    fn run(
        &mut self,
        mut parser: EpfParser,
        state: &mut IngestRunState,
        resume: bool,
        sink: &mut dyn CheckpointSink,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        let tables = state.tables.clone();
        let strategy =
            LoadStrategy::select(parser.header(), self.options.large_incremental_threshold);
        state.mark_started();

        info!(
            "Ingesting {} into {} ({} load, {} records expected)",
            state.file_name,
            tables.target,
            strategy,
            parser.header().records_expected
        );

        let write_table = match strategy {
            LoadStrategy::FullSwap => {
                if self.target_exists(&tables, state)? {
                    self.check_column_count(&tables.target, &parser, state)?;
                }
                self.prepare_build_table(&tables.temp, &parser, resume, state)?;
                tables.temp.clone()
            }
            LoadStrategy::IncrementalInPlace | LoadStrategy::IncrementalMerge => {
                if !self.target_exists(&tables, state)? {
                    let reason = format!("table {} does not exist", tables.target);
                    warn!(
                        "Skipping incremental file {}: {}",
                        state.file_name, reason
                    );
                    return Ok(IngestReport {
                        table: tables.target.clone(),
                        strategy,
                        outcome: IngestOutcome::Skipped { reason },
                        records_written: 0,
                        records_rejected: 0,
                        checkpoint_failures: 0,
                        elapsed: started.elapsed(),
                    });
                }
                let table_columns = self.check_column_count(&tables.target, &parser, state)?;
                if parser.header().column_count() > table_columns {
                    info!(
                        "{} declares {} columns; writing only the {} columns of {}",
                        state.file_name,
                        parser.header().column_count(),
                        table_columns,
                        tables.target
                    );
                    parser.restrict_columns(table_columns);
                }

                if strategy == LoadStrategy::IncrementalMerge {
                    if parser.header().column_index(&self.options.freshness_column).is_none() {
                        return Err(IngestError::MissingColumn {
                            table: tables.target.clone(),
                            column: self.options.freshness_column.clone(),
                        });
                    }
                    self.prepare_build_table(&tables.incremental, &parser, resume, state)?;
                    tables.incremental.clone()
                } else {
                    if !resume {
                        state.last_record_ingested = 0;
                    }
                    tables.target.clone()
                }
            }
        };

        let populated = self.populate(&mut parser, &write_table, strategy, state, sink)?;

        match strategy {
            LoadStrategy::FullSwap => {
                swap_into_place(
                    &mut *self.store,
                    &tables.temp,
                    &tables.target,
                    &tables.backup,
                    &self.options.diagnostics,
                )?;
            }
            LoadStrategy::IncrementalInPlace => {}
            LoadStrategy::IncrementalMerge => {
                self.merge_and_swap(&parser, &tables, state)?;
            }
        }

        state.mark_finished();
        if state.last_record_ingested != parser.header().records_expected {
            warn!(
                "{} declared {} records but {} were read",
                state.file_name,
                parser.header().records_expected,
                state.last_record_ingested
            );
        }

        let elapsed = started.elapsed();
        info!(
            "Finished {} into {}: {} records in {:.1}s",
            state.file_name,
            tables.target,
            state.last_record_ingested,
            elapsed.as_secs_f64()
        );

        Ok(IngestReport {
            table: tables.target.clone(),
            strategy,
            outcome: IngestOutcome::Completed,
            records_written: state.last_record_ingested,
            records_rejected: populated.rejected,
            checkpoint_failures: populated.checkpoint_failures,
            elapsed,
        })
    }

    fn target_exists(&mut self, tables: &TableNames, state: &IngestRunState) -> Result<bool> {
        self.store
            .table_exists(&tables.target)
            .map_err(|e| fatal_write(&tables.target, state.last_record_ingested, e))
    }

    /// Reject a file that declares fewer columns than the live table
    fn check_column_count(
        &mut self,
        table: &str,
        parser: &EpfParser,
        state: &IngestRunState,
    ) -> Result<usize> {
        let table_columns = self
            .store
            .column_count(table)
            .map_err(|e| fatal_write(table, state.last_record_ingested, e))?;
        let file_columns = parser.header().column_count();
        if table_columns > file_columns {
            return Err(IngestError::SchemaViolation {
                table: table.to_string(),
                table_columns,
                file_columns,
            });
        }
        Ok(table_columns)
    }

    /// Create the table a run writes into, or keep it when resuming
    fn prepare_build_table(
        &mut self,
        name: &str,
        parser: &EpfParser,
        resume: bool,
        state: &mut IngestRunState,
    ) -> Result<()> {
        let to_fatal = |e| fatal_write(name, 0, e);

        if resume && state.last_record_ingested > 0 {
            if self.store.table_exists(name).map_err(to_fatal)? {
                info!(
                    "Resuming {} into {} after record {}",
                    state.file_name, name, state.last_record_ingested
                );
                return Ok(());
            }
            warn!(
                "Table {} from the interrupted run is missing; restarting {} from the first record",
                name, state.file_name
            );
        }

        state.last_record_ingested = 0;
        let header = parser.header();
        drop_table_quietly(&mut *self.store, name, &self.options.diagnostics).map_err(to_fatal)?;
        self.store
            .create_table(
                name,
                &header.column_names,
                &header.data_types,
                &header.primary_key,
            )
            .map_err(to_fatal)?;
        debug!("Created {} with {} columns", name, header.column_count());
        Ok(())
    }

    /// Write every remaining record
    fn populate(
        &mut self,
        parser: &mut EpfParser,
        table: &str,
        strategy: LoadStrategy,
        state: &mut IngestRunState,
        sink: &mut dyn CheckpointSink,
    ) -> Result<Populated> {
        parser.seek_to_record(state.last_record_ingested)?;

        let writer = BatchWriter::new(
            &*self.store,
            table,
            &parser.header().column_names,
            parser.column_kinds(),
            strategy.write_mode(self.options.skip_key_violators),
        );
        let mut gate = CheckpointGate::new(self.options, state.last_record_ingested, Instant::now());
        let progress = if self.show_progress {
            ProgressReporter::new(
                table,
                parser.header().records_expected,
                state.last_record_ingested,
            )
        } else {
            ProgressReporter::hidden()
        };

        let mut populated = Populated::default();
        loop {
            let batch = parser.next_batch(self.options.batch_size)?;
            let Some(last) = batch.last().map(|r| r.number) else {
                break;
            };

            let outcome = match writer.write(&mut *self.store, &batch, &self.options.diagnostics) {
                Ok(outcome) => outcome,
                Err(source) => {
                    progress.finish_with_error(&source.to_string());
                    return Err(fatal_write(table, state.last_record_ingested, source));
                }
            };
            populated.rejected += outcome.rejected as u64;
            state.last_record_ingested = last;
            progress.set_position(last);

            let now = Instant::now();
            if gate.is_due(last, now) {
                debug!("Checkpoint for {} at record {}", state.file_name, last);
                if let Err(err) = sink.checkpoint(state) {
                    error!(
                        "Could not record checkpoint of {} at record {}: {}",
                        state.file_name, last, err
                    );
                    populated.checkpoint_failures += 1;
                }
                gate.mark(last, now);
            }
        }

        progress.finish(&format!("{} records", state.last_record_ingested));
        if populated.rejected > 0 {
            warn!(
                "{} records of {} collided on the primary key and were skipped",
                populated.rejected, state.file_name
            );
        }
        Ok(populated)
    }

    fn merge_and_swap(
        &mut self,
        parser: &EpfParser,
        tables: &TableNames,
        state: &IngestRunState,
    ) -> Result<()> {
        let header = parser.header();
        let policy = &self.options.diagnostics;
        let to_fatal = |e| fatal_write(&tables.merged, state.last_record_ingested, e);

        drop_table_quietly(&mut *self.store, &tables.merged, policy).map_err(to_fatal)?;
        self.store
            .create_table(&tables.merged, &header.column_names, &header.data_types, &[])
            .map_err(to_fatal)?;

        let plan = MergePlan {
            target: &tables.target,
            incremental: &tables.incremental,
            merged: &tables.merged,
            columns: &header.column_names,
            primary_key: &header.primary_key,
            freshness_column: &self.options.freshness_column,
        };
        let (surviving, incoming) = plan.execute(&mut *self.store).map_err(to_fatal)?;
        info!(
            "Merged {} existing and {} incoming rows for {}",
            surviving, incoming, tables.target
        );

        self.store
            .apply_primary_key(
                &tables.merged,
                &header.column_names,
                &header.data_types,
                &header.primary_key,
            )
            .map_err(to_fatal)?;

        swap_into_place(&mut *self.store, &tables.merged, &tables.target, &tables.backup, policy)?;

        if let Err(err) = drop_table_quietly(&mut *self.store, &tables.incremental, policy) {
            warn!("Could not drop {}: {}", tables.incremental, err);
        }
        Ok(())
    }
}
