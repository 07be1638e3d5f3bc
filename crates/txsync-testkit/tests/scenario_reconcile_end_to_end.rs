//! Scenario: end-to-end reconciliation against in-memory stores.
//!
//! # Invariants under test
//!
//! - Every pending record with line items gets exactly one write.
//! - Empty / absent line items are skipped silently (no write, no counter).
//! - A streaming-buffer rejection is counted and the loop continues; the
//!   record's total stays null.
//! - The response text is the fixed summary format.
//!
//! All tests are pure in-process; no DB or network required.

use chrono::NaiveDate;
use txsync_core::{Reconciler, RecordId, RunPhase, StoreCoordinates};
use txsync_testkit::{decimal, line, pending, pending_without_items, FakeMirror, FakeTable};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
}

fn coords() -> StoreCoordinates {
    StoreCoordinates::new("acme", "sales", "transactions")
}

// ---------------------------------------------------------------------------
// Two records, both updates succeed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_valid_records_both_updated() {
    let table = FakeTable::new(vec![
        pending("T-1", today(), vec![line(2, "3.50"), line(1, "4.00")]),
        pending("T-2", today(), vec![line(5, "1.10")]),
    ]);
    let mirror = FakeMirror::new();
    let c = coords();

    let mut run = Reconciler::new(&c, &table)
        .with_mirror(Some(&mirror))
        .with_today(today());
    let summary = run.run().await.expect("run should succeed");

    assert_eq!(
        summary.to_string(),
        "Synchronization complete. Updated: 2, Skipped (streaming buffer): 0"
    );
    assert_eq!(run.phase(), RunPhase::Done);
    assert_eq!(table.total_of("T-1"), Some(decimal("11.00")));
    assert_eq!(table.total_of("T-2"), Some(decimal("5.50")));
    assert_eq!(mirror.keys(), vec!["T-1".to_string(), "T-2".to_string()]);
}

// ---------------------------------------------------------------------------
// Empty line items: record untouched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_line_items_leave_record_untouched() {
    let table = FakeTable::new(vec![pending("T-1", today(), vec![])]);
    let c = coords();

    let summary = Reconciler::new(&c, &table)
        .with_today(today())
        .run()
        .await
        .unwrap();

    assert_eq!(
        summary.to_string(),
        "Synchronization complete. Updated: 0, Skipped (streaming buffer): 0"
    );
    assert!(table.update_calls().is_empty());
    assert_eq!(table.total_of("T-1"), None);
}

#[tokio::test]
async fn null_line_items_are_skipped_like_empty() {
    let table = FakeTable::new(vec![
        pending_without_items(1_i64, today()),
        pending(2_i64, today(), vec![line(1, "9.99")]),
    ]);
    let c = coords();

    let summary = Reconciler::new(&c, &table)
        .with_today(today())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.updated_count, 1);
    assert_eq!(summary.skipped_empty_count, 1);
    assert_eq!(table.attempted_ids(), vec![RecordId::Int(2)]);
}

// ---------------------------------------------------------------------------
// Streaming buffer on the first record, second succeeds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streaming_buffer_skip_then_success() {
    let table = FakeTable::new(vec![
        pending("T-1", today(), vec![line(1, "2.00")]),
        pending("T-2", today(), vec![line(3, "1.00")]),
    ]);
    table.in_streaming_buffer("T-1");
    let mirror = FakeMirror::new();
    let c = coords();

    let summary = Reconciler::new(&c, &table)
        .with_mirror(Some(&mirror))
        .with_today(today())
        .run()
        .await
        .unwrap();

    assert_eq!(
        summary.to_string(),
        "Synchronization complete. Updated: 1, Skipped (streaming buffer): 1"
    );
    assert_eq!(table.total_of("T-1"), None, "skipped record stays null");
    assert_eq!(table.total_of("T-2"), Some(decimal("3.00")));
    // Skipped records are never mirrored.
    assert_eq!(mirror.keys(), vec!["T-2".to_string()]);
}

#[tokio::test]
async fn skipped_record_is_picked_up_by_a_later_invocation() {
    let table = FakeTable::new(vec![pending("T-1", today(), vec![line(1, "2.00")])]);
    table.in_streaming_buffer("T-1");
    let c = coords();

    let first = Reconciler::new(&c, &table)
        .with_today(today())
        .run()
        .await
        .unwrap();
    assert_eq!(first.skipped_streaming_count, 1);

    // Buffer flushed: a fresh table handle without the scripted error.
    let flushed = FakeTable::new(vec![pending("T-1", today(), vec![line(1, "2.00")])]);
    let second = Reconciler::new(&c, &flushed)
        .with_today(today())
        .run()
        .await
        .unwrap();
    assert_eq!(second.updated_count, 1);
    assert_eq!(flushed.total_of("T-1"), Some(decimal("2.00")));
}

// ---------------------------------------------------------------------------
// Records outside today's window are never fetched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn only_todays_records_are_processed() {
    let yesterday = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
    let table = FakeTable::new(vec![
        pending("old", yesterday, vec![line(1, "1.00")]),
        pending("new", today(), vec![line(1, "1.00")]),
    ]);
    let c = coords();

    let summary = Reconciler::new(&c, &table)
        .with_today(today())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.fetched_count, 1);
    assert_eq!(table.attempted_ids(), vec![RecordId::from("new")]);
    assert_eq!(table.total_of("old"), None);
}

// ---------------------------------------------------------------------------
// Rounding to the stored scale
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sub_scale_total_is_rounded_once_for_store_and_mirror() {
    let table = FakeTable::new(vec![pending(
        "T-9",
        today(),
        vec![line(1, "0.0000000015"), line(1, "1.00")],
    )]);
    let mirror = FakeMirror::new();

    let c = coords();
    Reconciler::new(&c, &table)
        .with_mirror(Some(&mirror))
        .with_today(today())
        .run()
        .await
        .unwrap();

    // Halfway at the ninth decimal rounds away from zero.
    let expected = decimal("1.000000002");
    assert_eq!(table.update_calls(), vec![(RecordId::from("T-9"), expected)]);
    assert_eq!(table.total_of("T-9"), Some(expected));
    assert_eq!(
        mirror.document("T-9").unwrap()["total_sale_price"],
        serde_json::json!(1.000000002)
    );
}
