//! Test utilities for the ingest engine
//!
//! Provides a fault-injecting store wrapper, a recording checkpoint sink and
//! helpers for reading table contents back out of SQLite.

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::ingest::CheckpointSink;
use crate::models::IngestRunState;
use crate::store::{SqliteStore, StoreError, StoreResult, TargetStore, WriteMode};

mod swap_tests;

/// SQLite store that fails chosen operations on demand
pub struct FaultyStore {
    pub inner: SqliteStore,
    /// Renames (from, to) that fail
    pub fail_renames: Vec<(String, String)>,
    /// Fail every insert after this many have succeeded
    pub fail_inserts_after: Option<usize>,
    pub inserts: usize,
}

impl FaultyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_renames: Vec::new(),
            fail_inserts_after: None,
            inserts: 0,
        }
    }

    pub fn failing_rename(mut self, from: &str, to: &str) -> Self {
        self.fail_renames.push((from.to_string(), to.to_string()));
        self
    }

    pub fn failing_inserts_after(mut self, count: usize) -> Self {
        self.fail_inserts_after = Some(count);
        self
    }

    pub fn into_inner(self) -> SqliteStore {
        self.inner
    }
}

impl TargetStore for FaultyStore {
    fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        Ok(Self::new(SqliteStore::connect(config)?))
    }

    fn execute(&mut self, statement: &str) -> StoreResult<usize> {
        if statement.starts_with("INSERT") {
            if let Some(limit) = self.fail_inserts_after {
                if self.inserts >= limit {
                    return Err(StoreError::fatal("injected write failure"));
                }
            }
            self.inserts += 1;
        }
        self.inner.execute(statement)
    }

    fn table_exists(&mut self, name: &str) -> StoreResult<bool> {
        self.inner.table_exists(name)
    }

    fn column_count(&mut self, name: &str) -> StoreResult<usize> {
        self.inner.column_count(name)
    }

    fn escape_literal(&self, bytes: &[u8]) -> String {
        self.inner.escape_literal(bytes)
    }

    fn quote_identifier(&self, name: &str) -> String {
        self.inner.quote_identifier(name)
    }

    fn write_verb(&self, mode: WriteMode) -> &'static str {
        self.inner.write_verb(mode)
    }

    fn rename_table(&mut self, from: &str, to: &str) -> StoreResult<()> {
        if self
            .fail_renames
            .iter()
            .any(|(fail_from, fail_to)| fail_from == from && fail_to == to)
        {
            return Err(StoreError::fatal("injected rename failure"));
        }
        self.inner.rename_table(from, to)
    }

    fn drop_table_if_exists(&mut self, name: &str) -> StoreResult<()> {
        self.inner.drop_table_if_exists(name)
    }

    fn apply_primary_key(
        &mut self,
        name: &str,
        columns: &[String],
        types: &[String],
        primary_key: &[String],
    ) -> StoreResult<()> {
        self.inner
            .apply_primary_key(name, columns, types, primary_key)
    }
}

/// Sink keeping every state it is handed
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub states: Vec<IngestRunState>,
}

impl CheckpointSink for RecordingSink {
    fn checkpoint(&mut self, state: &IngestRunState) -> Result<()> {
        self.states.push(state.clone());
        Ok(())
    }
}

/// Sink whose every checkpoint fails
#[derive(Debug, Default)]
pub struct FailingSink {
    pub attempts: usize,
}

impl CheckpointSink for FailingSink {
    fn checkpoint(&mut self, _state: &IngestRunState) -> Result<()> {
        self.attempts += 1;
        Err(crate::error::IngestError::configuration("snapshot volume is read-only"))
    }
}

/// A row of the three-column application table
pub type AppRow = (i64, Option<String>, i64);

pub fn app_rows(store: &SqliteStore, table: &str) -> Vec<AppRow> {
    let conn = store.connection();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT id, name, export_date FROM \"{}\" ORDER BY id",
            table
        ))
        .unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<std::result::Result<Vec<AppRow>, _>>()
        .unwrap()
}

pub fn row(id: i64, name: &str, export_date: i64) -> AppRow {
    (id, Some(name.to_string()), export_date)
}

/// Create the application table and fill it with `rows`
pub fn seed_app_table(store: &mut SqliteStore, table: &str, rows: &[AppRow]) {
    store
        .create_table(
            table,
            &["id".into(), "name".into(), "export_date".into()],
            &["INT".into(), "VARCHAR(100)".into(), "BIGINT".into()],
            &["id".into()],
        )
        .unwrap();
    for (id, name, export_date) in rows {
        let name = name
            .as_deref()
            .map_or("NULL".to_string(), |n| format!("'{}'", n));
        store
            .execute(&format!(
                "INSERT INTO \"{}\" VALUES ({}, {}, {})",
                table, id, name, export_date
            ))
            .unwrap();
    }
}
