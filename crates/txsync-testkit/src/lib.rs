//! In-memory stores for reconciliation scenarios.
//!
//! Deterministic, no network, no database. Both fakes are cheap `Clone`
//! handles over shared state, so a test can hand one copy to the code under
//! test and keep another to inspect afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use txsync_core::{LineItem, MirrorStore, PendingStore, Record, RecordId, StoreError};

/// Message text the live store uses for rows still in the streaming buffer.
pub const STREAMING_BUFFER_MESSAGE: &str =
    "Streaming buffer: UPDATE or DELETE statement over table would affect rows in the streaming buffer, which is not supported";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Line item from an integer quantity and a decimal price string.
pub fn line(quantity: i64, unit_price: &str) -> LineItem {
    LineItem::new(Decimal::from(quantity), decimal(unit_price))
}

/// Parse a decimal literal; panics on malformed test input.
pub fn decimal(s: &str) -> Decimal {
    s.parse()
        .unwrap_or_else(|e| panic!("bad decimal literal {s:?}: {e}"))
}

/// A pending record dated `date` with the given line items.
pub fn pending(id: impl Into<RecordId>, date: NaiveDate, items: Vec<LineItem>) -> Record {
    Record::new(id.into(), Some(date), Some(items))
}

/// A pending record whose line-item column is null.
pub fn pending_without_items(id: impl Into<RecordId>, date: NaiveDate) -> Record {
    Record::new(id.into(), Some(date), None)
}

// ---------------------------------------------------------------------------
// FakeTable
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TableState {
    rows: Vec<Record>,
    fetch_error: Option<StoreError>,
    update_errors: HashMap<RecordId, StoreError>,
    fetch_calls: usize,
    update_calls: Vec<(RecordId, Decimal)>,
}

/// Primary store fake. `fetch_pending` applies the real filter
/// (`date = today AND derived_total IS NULL`); `update_total` either fails
/// with a scripted error or sets the total on the matching row.
#[derive(Clone, Default)]
pub struct FakeTable {
    state: Arc<Mutex<TableState>>,
}

impl FakeTable {
    pub fn new(rows: Vec<Record>) -> Self {
        let table = Self::default();
        lock(&table.state).rows = rows;
        table
    }

    pub fn fail_fetch(&self, err: StoreError) {
        lock(&self.state).fetch_error = Some(err);
    }

    pub fn fail_update(&self, id: impl Into<RecordId>, err: StoreError) {
        lock(&self.state).update_errors.insert(id.into(), err);
    }

    /// Script the streaming-buffer rejection for `id`.
    pub fn in_streaming_buffer(&self, id: impl Into<RecordId>) {
        self.fail_update(id, StoreError::api(Some(400), STREAMING_BUFFER_MESSAGE));
    }

    pub fn fetch_calls(&self) -> usize {
        lock(&self.state).fetch_calls
    }

    /// Every update attempt, in call order, including failed ones.
    pub fn update_calls(&self) -> Vec<(RecordId, Decimal)> {
        lock(&self.state).update_calls.clone()
    }

    pub fn attempted_ids(&self) -> Vec<RecordId> {
        lock(&self.state)
            .update_calls
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Current stored total for `id`.
    pub fn total_of(&self, id: impl Into<RecordId>) -> Option<Decimal> {
        let id = id.into();
        lock(&self.state)
            .rows
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.derived_total)
    }

    /// True when nothing reached the store at all.
    pub fn untouched(&self) -> bool {
        let st = lock(&self.state);
        st.fetch_calls == 0 && st.update_calls.is_empty()
    }
}

#[async_trait::async_trait]
impl PendingStore for FakeTable {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_pending(&self, today: NaiveDate) -> Result<Vec<Record>, StoreError> {
        let mut st = lock(&self.state);
        st.fetch_calls += 1;
        if let Some(err) = st.fetch_error.clone() {
            return Err(err);
        }
        Ok(st
            .rows
            .iter()
            .filter(|r| r.date == Some(today) && r.derived_total.is_none())
            .cloned()
            .collect())
    }

    async fn update_total(&self, id: &RecordId, total: Decimal) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.update_calls.push((id.clone(), total));
        if let Some(err) = st.update_errors.get(id).cloned() {
            return Err(err);
        }
        if let Some(row) = st.rows.iter_mut().find(|r| &r.id == id) {
            row.set_derived_total(total);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeMirror
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MirrorState {
    documents: BTreeMap<String, Value>,
    writes: usize,
    failure: Option<StoreError>,
}

/// Document store fake keyed by the string form of the record id.
#[derive(Clone, Default)]
pub struct FakeMirror {
    state: Arc<Mutex<MirrorState>>,
}

impl FakeMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mirror whose every write fails with `err`.
    pub fn failing(err: StoreError) -> Self {
        let m = Self::default();
        lock(&m.state).failure = Some(err);
        m
    }

    pub fn document(&self, key: &str) -> Option<Value> {
        lock(&self.state).documents.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.state).documents.keys().cloned().collect()
    }

    /// Write attempts, including failed ones.
    pub fn writes(&self) -> usize {
        lock(&self.state).writes
    }
}

#[async_trait::async_trait]
impl MirrorStore for FakeMirror {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn log_transaction(&self, record: &Record) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.writes += 1;
        if let Some(err) = st.failure.clone() {
            return Err(err);
        }
        st.documents
            .insert(record.id.to_string(), record.to_document());
        Ok(())
    }
}
