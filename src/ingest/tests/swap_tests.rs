//! Tests for rename-based swaps

use super::*;
use crate::config::{DiagnosticPolicy, IngestOptions};
use crate::error::IngestError;
use crate::ingest::Ingester;
use crate::ingest::swap::swap_into_place;
use crate::models::TableNames;
use crate::parser::EpfParser;
use crate::parser::tests::{EpfFixture, default_type_map};

#[test]
fn test_swap_without_existing_target() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    seed_app_table(&mut store, "app_tmp", &[row(1, "Alice", 20090101)]);

    swap_into_place(&mut store, "app_tmp", "app", "app_old", &DiagnosticPolicy::default())
        .unwrap();

    assert_eq!(app_rows(&store, "app"), vec![row(1, "Alice", 20090101)]);
    assert!(!store.table_exists("app_tmp").unwrap());
}

#[test]
fn test_swap_drops_stale_backup() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    seed_app_table(&mut store, "app", &[row(1, "Old", 20080101)]);
    seed_app_table(&mut store, "app_old", &[row(7, "Older", 20070101)]);
    seed_app_table(&mut store, "app_tmp", &[row(2, "New", 20090101)]);

    swap_into_place(&mut store, "app_tmp", "app", "app_old", &DiagnosticPolicy::strict())
        .unwrap();

    assert_eq!(app_rows(&store, "app"), vec![row(2, "New", 20090101)]);
    assert!(!store.table_exists("app_old").unwrap());
}

#[test]
fn test_failed_second_rename_restores_target() {
    let mut inner = SqliteStore::open_in_memory().unwrap();
    let before = vec![row(1, "Alice", 20090101), row(2, "Bob", 20090102)];
    seed_app_table(&mut inner, "app", &before);
    seed_app_table(&mut inner, "app_tmp", &[row(3, "Carol", 20090103)]);
    let mut store = FaultyStore::new(inner).failing_rename("app_tmp", "app");

    let err = swap_into_place(&mut store, "app_tmp", "app", "app_old", &DiagnosticPolicy::default())
        .unwrap_err();

    assert!(matches!(err, IngestError::Swap { .. }));
    let mut inner = store.into_inner();
    assert_eq!(app_rows(&inner, "app"), before);
    assert!(!inner.table_exists("app_old").unwrap());
}

#[test]
fn test_failed_rollback_leaves_previous_table_under_backup() {
    let mut inner = SqliteStore::open_in_memory().unwrap();
    let before = vec![row(1, "Alice", 20090101)];
    seed_app_table(&mut inner, "app", &before);
    seed_app_table(&mut inner, "app_tmp", &[row(3, "Carol", 20090103)]);
    let mut store = FaultyStore::new(inner)
        .failing_rename("app_tmp", "app")
        .failing_rename("app_old", "app");

    let err = swap_into_place(&mut store, "app_tmp", "app", "app_old", &DiagnosticPolicy::default())
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::SwapRollback { ref target, ref backup, .. } if target == "app" && backup == "app_old"
    ));
    assert!(!err.to_string().contains("left in place"));
    let mut inner = store.into_inner();
    assert!(!inner.table_exists("app").unwrap());
    assert_eq!(app_rows(&inner, "app_old"), before);
    assert_eq!(app_rows(&inner, "app_tmp"), vec![row(3, "Carol", 20090103)]);
}

#[test]
fn test_failed_swap_aborts_full_load() {
    let mut inner = SqliteStore::open_in_memory().unwrap();
    let before = vec![row(1, "Alice", 20090101)];
    seed_app_table(&mut inner, "app", &before);
    let mut store = FaultyStore::new(inner).failing_rename("app_tmp", "app");

    let fixture = EpfFixture::application()
        .row(&["5", "Eve", "20090105"])
        .row(&["6", "Frank", "20090106"]);
    let file = fixture.write();
    let parser = EpfParser::open(
        file.path(),
        &fixture.record_delim,
        &fixture.field_delim,
        &default_type_map(),
    )
    .unwrap();
    let options = IngestOptions::default();
    let mut sink = RecordingSink::default();

    let err = Ingester::new(&mut store, &options)
        .ingest(parser, &TableNames::from_target("app"), &mut sink)
        .unwrap_err();

    assert!(matches!(err, IngestError::Swap { .. }));
    let last = sink.states.last().unwrap();
    assert!(last.did_abort);
    assert!(last.abort_time.is_some());
    assert_eq!(last.last_record_ingested, 2);
    assert_eq!(app_rows(&store.into_inner(), "app"), before);
}
