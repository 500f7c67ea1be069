//! Importer scenarios against the mock backend and store.
//!
//! These drive `PrometheusImporter` directly through the production batch
//! writer, so the rows checked here are the exact tuples that would be
//! sent to ClickHouse.

use chrono::Duration;
use clickhouse_client::BatchWriter;
use integration_tests::fixtures::{at, importer_config};
use integration_tests::mocks::{samples_per_series, MockBackend, MockStore};
use metering_core::{Error, FixedClock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use worker::{ImportContext, PrometheusImporter};

const TABLE: &str = "datasource_pod_request_cpu";

fn importer_with(
    backend: &MockBackend,
    store: &MockStore,
    clock: &Arc<FixedClock>,
    writer: BatchWriter,
    chunk: Duration,
    max_range: Duration,
) -> PrometheusImporter {
    PrometheusImporter::new(
        "pod-request-cpu",
        importer_config(TABLE, chunk, max_range),
        ImportContext {
            backend: Arc::new(backend.clone()),
            store: Arc::new(store.clone()),
            writer,
            clock: clock.clone(),
        },
    )
}

/// Empty table with hour chunks: the first run starts two chunks back.
#[tokio::test]
async fn test_empty_table_starts_two_chunks_back() {
    let backend = MockBackend::new();
    let store = MockStore::new();
    let clock = Arc::new(FixedClock::new(at(12, 0)));
    let importer = importer_with(
        &backend,
        &store,
        &clock,
        BatchWriter::default(),
        Duration::hours(1),
        Duration::hours(2),
    );

    let summary = importer
        .import_from_cursor(&CancellationToken::new(), false)
        .await
        .unwrap();

    let windows = backend.windows();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].start, at(10, 0));
    assert_eq!(windows[0].end, at(11, 0));
    assert_eq!(
        summary.metrics_imported,
        2 * samples_per_series(&windows[0])
    );
    assert_eq!(store.rows_for(TABLE).len(), summary.metrics_imported);
    assert_eq!(importer.last_timestamp().await, Some(at(11, 0)));
}

/// A failure on window 2 of 3 aborts the run and forgets the cursor.
#[tokio::test]
async fn test_failure_on_second_of_three_windows() {
    let backend = MockBackend::new();
    backend.fail_call(1);
    let store = MockStore::new();
    store.set_newest(TABLE, at(11, 44));
    let clock = Arc::new(FixedClock::new(at(12, 2)));
    let importer = importer_with(
        &backend,
        &store,
        &clock,
        BatchWriter::default(),
        Duration::minutes(5),
        Duration::minutes(30),
    );

    // 11:45..12:02 plans 11:45-11:50, 11:51-11:56, 11:57-12:02.
    let err = importer
        .import_from_cursor(&CancellationToken::new(), false)
        .await
        .unwrap_err();

    assert_eq!(err.windows_processed, 1);
    assert!(matches!(err.source, Error::Backend(_)));
    let windows = backend.windows();
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[1].start, at(11, 51));
    assert_eq!(importer.last_timestamp().await, None);

    // The next run recovers from the table instead of trusting window 1.
    let summary = importer
        .import_from_cursor(&CancellationToken::new(), false)
        .await
        .unwrap();
    assert_eq!(summary.windows, 3);
    assert_eq!(backend.windows()[2].start, at(11, 45));
    assert_eq!(importer.last_timestamp().await, Some(at(12, 2)));
}

/// Importing a range in one run or in two adjacent runs lands the same rows.
#[tokio::test]
async fn test_split_resumption_matches_single_run() {
    let chunk = Duration::minutes(5);
    let range = Duration::minutes(60);

    let one_backend = MockBackend::new();
    let one_store = MockStore::new();
    one_store.set_newest(TABLE, at(10, 59));
    let one = importer_with(
        &one_backend,
        &one_store,
        &Arc::new(FixedClock::new(at(11, 23))),
        BatchWriter::default(),
        chunk,
        range,
    );
    one.import_from_cursor(&CancellationToken::new(), false)
        .await
        .unwrap();

    let two_backend = MockBackend::new();
    let two_store = MockStore::new();
    two_store.set_newest(TABLE, at(10, 59));
    let clock = Arc::new(FixedClock::new(at(11, 10)));
    let two = importer_with(
        &two_backend,
        &two_store,
        &clock,
        BatchWriter::default(),
        chunk,
        range,
    );
    two.import_from_cursor(&CancellationToken::new(), false)
        .await
        .unwrap();
    clock.set(at(11, 23));
    two.import_from_cursor(&CancellationToken::new(), false)
        .await
        .unwrap();

    assert_eq!(one.last_timestamp().await, two.last_timestamp().await);
    assert_eq!(one.last_timestamp().await, Some(at(11, 23)));
    assert_eq!(one_backend.windows(), two_backend.windows());

    let mut one_rows = one_store.rows();
    let mut two_rows = two_store.rows();
    one_rows.sort();
    two_rows.sort();
    assert_eq!(one_rows, two_rows);
}

/// A small statement cap splits each window into several inserts without
/// losing or duplicating rows.
#[tokio::test]
async fn test_statement_cap_splits_inserts() {
    let backend = MockBackend::new();
    backend.set_series(20);
    let store = MockStore::new();
    store.set_newest(TABLE, at(11, 0));
    let clock = Arc::new(FixedClock::new(at(11, 6)));
    let importer = importer_with(
        &backend,
        &store,
        &clock,
        BatchWriter::new(2_000),
        Duration::minutes(5),
        Duration::minutes(10),
    );

    let summary = importer
        .import_from_cursor(&CancellationToken::new(), false)
        .await
        .unwrap();

    let statements = store.statements();
    assert!(statements.len() > 1);
    assert!(statements.iter().all(|s| s.len() <= 2_000));
    let rows = store.rows();
    assert_eq!(rows.len(), summary.metrics_imported);
    assert_eq!(rows.len(), 20 * 6);

    let mut unique = rows.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), rows.len());
}

/// A record that cannot fit in one statement fails the run.
#[tokio::test]
async fn test_oversized_record_fails_run() {
    let backend = MockBackend::new();
    let store = MockStore::new();
    store.set_newest(TABLE, at(11, 0));
    let clock = Arc::new(FixedClock::new(at(11, 6)));
    let importer = importer_with(
        &backend,
        &store,
        &clock,
        BatchWriter::new(64),
        Duration::minutes(5),
        Duration::minutes(10),
    );

    let err = importer
        .import_from_cursor(&CancellationToken::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err.source, Error::RecordTooLarge { .. }));
    assert!(store.statements().is_empty());
    assert_eq!(importer.last_timestamp().await, None);
}

/// Cancelling before a run starts leaves the cursor alone.
#[tokio::test]
async fn test_cancelled_before_first_window() {
    let backend = MockBackend::new();
    let store = MockStore::new();
    store.set_newest(TABLE, at(11, 0));
    let clock = Arc::new(FixedClock::new(at(11, 30)));
    let importer = importer_with(
        &backend,
        &store,
        &clock,
        BatchWriter::default(),
        Duration::minutes(5),
        Duration::minutes(10),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = importer.import_from_cursor(&cancel, false).await.unwrap_err();

    assert!(err.source.is_cancelled());
    assert_eq!(err.windows_processed, 0);
    assert_eq!(backend.call_count(), 0);
    assert_eq!(importer.last_timestamp().await, Some(at(11, 0)));
}
