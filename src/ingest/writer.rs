//! Batch statement assembly and execution
//!
//! Each batch becomes one multi-row insert. Field values are rendered as
//! literals by the store: Null uses the store's null literal, integer-looking
//! values in numeric columns are left unquoted, and everything else goes
//! through [`TargetStore::escape_literal`].

use tracing::{debug, error};

use super::log_store_warning;
use crate::config::DiagnosticPolicy;
use crate::models::{FieldValue, Record};
use crate::parser::ColumnKind;
use crate::store::{StoreError, StoreResult, TargetStore, WriteMode, quote_list};

/// Result of writing one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records accepted by the store
    pub accepted: usize,
    /// Records rejected for colliding on the primary key
    pub rejected: usize,
}

/// Writer for batches of records into one table
#[derive(Debug, Clone)]
pub struct BatchWriter {
    table: String,
    prefix: String,
    kinds: Vec<ColumnKind>,
    mode: WriteMode,
}

impl BatchWriter {
    pub fn new<S: TargetStore + ?Sized>(
        store: &S,
        table: &str,
        columns: &[String],
        kinds: &[ColumnKind],
        mode: WriteMode,
    ) -> Self {
        let prefix = format!(
            "{} {} ({}) VALUES ",
            store.write_verb(mode),
            store.quote_identifier(table),
            quote_list(store, columns)
        );
        Self {
            table: table.to_string(),
            prefix,
            kinds: kinds.to_vec(),
            mode,
        }
    }

    /// Multi-row insert statement for `records`
    pub fn statement<S: TargetStore + ?Sized>(&self, store: &S, records: &[Record]) -> String {
        let mut sql = String::with_capacity(self.prefix.len() + records.len() * self.kinds.len() * 8);
        sql.push_str(&self.prefix);
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (pos, (value, kind)) in record.fields.iter().zip(&self.kinds).enumerate() {
                if pos > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&render_value(store, value, *kind));
            }
            sql.push(')');
        }
        sql
    }

    /// Write one batch.
    ///
    /// When a plain insert is rejected for a key collision the batch is
    /// retried one record at a time; colliding records are logged and
    /// skipped.
    pub fn write<S: TargetStore + ?Sized>(
        &self,
        store: &mut S,
        records: &[Record],
        policy: &DiagnosticPolicy,
    ) -> StoreResult<BatchOutcome> {
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let statement = self.statement(&*store, records);
        match store.execute(&statement) {
            Ok(_) => Ok(BatchOutcome {
                accepted: records.len(),
                rejected: 0,
            }),
            Err(StoreError::Warning { class, message }) => {
                log_store_warning(policy, class, &message);
                Ok(BatchOutcome {
                    accepted: records.len(),
                    rejected: 0,
                })
            }
            Err(err) if err.is_integrity_violation() && self.mode == WriteMode::Insert => {
                debug!(
                    "Batch of {} records into {} hit a key collision, retrying per record",
                    records.len(),
                    self.table
                );
                self.write_individually(store, records, policy)
            }
            Err(err) => Err(err),
        }
    }

    fn write_individually<S: TargetStore + ?Sized>(
        &self,
        store: &mut S,
        records: &[Record],
        policy: &DiagnosticPolicy,
    ) -> StoreResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for record in records {
            let statement = self.statement(&*store, std::slice::from_ref(record));
            match store.execute(&statement) {
                Ok(_) => outcome.accepted += 1,
                Err(StoreError::Warning { class, message }) => {
                    log_store_warning(policy, class, &message);
                    outcome.accepted += 1;
                }
                Err(StoreError::IntegrityViolation { message }) => {
                    error!(
                        "Skipping record {} in {}: {}",
                        record.number, self.table, message
                    );
                    outcome.rejected += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }
}

fn render_value<S: TargetStore + ?Sized>(store: &S, value: &FieldValue, kind: ColumnKind) -> String {
    match value.as_bytes() {
        None => store.null_literal().to_string(),
        Some(bytes) if kind == ColumnKind::Number && is_integer_literal(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
        Some(bytes) => store.escape_literal(bytes),
    }
}

fn is_integer_literal(bytes: &[u8]) -> bool {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    !digits.is_empty() && digits.iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn record(number: u64, fields: &[Option<&str>]) -> Record {
        Record {
            number,
            fields: fields
                .iter()
                .map(|f| (*f).map_or(FieldValue::Null, FieldValue::from))
                .collect(),
        }
    }

    fn columns() -> Vec<String> {
        vec!["id".into(), "name".into()]
    }

    #[test]
    fn test_statement_rendering() {
        let store = SqliteStore::open_in_memory().unwrap();
        let writer = BatchWriter::new(
            &store,
            "app",
            &columns(),
            &[ColumnKind::Number, ColumnKind::Plain],
            WriteMode::Upsert,
        );

        let sql = writer.statement(
            &store,
            &[
                record(1, &[Some("1"), Some("O'Brien")]),
                record(2, &[Some("x2"), None]),
            ],
        );

        assert_eq!(
            sql,
            "INSERT OR REPLACE INTO \"app\" (\"id\", \"name\") VALUES (1, 'O''Brien'), ('x2', NULL)"
        );
    }

    #[test]
    fn test_null_is_distinct_from_text() {
        let store = SqliteStore::open_in_memory().unwrap();
        let writer = BatchWriter::new(
            &store,
            "app",
            &columns(),
            &[ColumnKind::Plain, ColumnKind::Plain],
            WriteMode::Insert,
        );
        let sql = writer.statement(&store, &[record(1, &[Some("NULL"), None])]);
        assert!(sql.ends_with("VALUES ('NULL', NULL)"));
    }

    #[test]
    fn test_integer_literal_detection() {
        assert!(is_integer_literal(b"20090101"));
        assert!(is_integer_literal(b"-5"));
        assert!(!is_integer_literal(b"-"));
        assert!(!is_integer_literal(b"1.5"));
        assert!(!is_integer_literal(b"1; DROP TABLE app"));
    }

    #[test]
    fn test_collisions_skipped_per_record() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .create_table("app", &columns(), &["INT".into(), "TEXT".into()], &["id".into()])
            .unwrap();
        let writer = BatchWriter::new(
            &store,
            "app",
            &columns(),
            &[ColumnKind::Number, ColumnKind::Plain],
            WriteMode::Insert,
        );

        let outcome = writer
            .write(
                &mut store,
                &[
                    record(1, &[Some("1"), Some("a")]),
                    record(2, &[Some("1"), Some("dup")]),
                    record(3, &[Some("2"), Some("b")]),
                ],
                &DiagnosticPolicy::default(),
            )
            .unwrap();

        assert_eq!(outcome, BatchOutcome { accepted: 2, rejected: 1 });
        let name: String = store
            .connection()
            .query_row("SELECT name FROM app WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "a");
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let writer = BatchWriter::new(
            &store,
            "nowhere",
            &columns(),
            &[ColumnKind::Number, ColumnKind::Plain],
            WriteMode::Upsert,
        );
        let err = writer
            .write(
                &mut store,
                &[record(1, &[Some("1"), Some("a")])],
                &DiagnosticPolicy::default(),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Fatal { .. }));
    }
}
