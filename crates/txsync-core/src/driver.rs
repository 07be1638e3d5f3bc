//! Reconciliation driver.
//!
//! `Init -> Fetching -> Processing(i) -> Done`, with `Aborted` reachable from
//! every non-terminal phase. The per-record loop is an early-exit fold: the
//! first run-fatal error returns out of [`Reconciler::run`] and later records
//! are never touched.

use std::fmt;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::{
    aggregate_line_items, round_total, today_in_reporting_tz, MirrorLogger, MirrorStore,
    PendingStore, RecordId, RecordUpdater, StoreCoordinates, StreamingBufferPredicate, SyncError,
    UpdateOutcome,
};

// ---------------------------------------------------------------------------
// Phase / mode
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Fetching,
    /// Working on the record at `index` in fetch order.
    Processing { index: usize },
    Done,
    Aborted,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Aborted)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Apply,
    /// Fetch and aggregate only; record the planned writes.
    DryRun,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub id: RecordId,
    pub total: Decimal,
}

/// Counters for one invocation. Only `updated_count` and
/// `skipped_streaming_count` appear in the response text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched_count: usize,
    pub updated_count: usize,
    pub skipped_streaming_count: usize,
    /// Records with absent/empty line items.
    pub skipped_empty_count: usize,
    /// Dry-run only.
    pub planned: Vec<PlannedUpdate>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Synchronization complete. Updated: {}, Skipped (streaming buffer): {}",
            self.updated_count, self.skipped_streaming_count
        )
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a> {
    coordinates: &'a StoreCoordinates,
    store: &'a dyn PendingStore,
    updater: RecordUpdater<'a>,
    mirror: MirrorLogger<'a>,
    mode: RunMode,
    today: Option<NaiveDate>,
    phase: RunPhase,
}

impl<'a> Reconciler<'a> {
    pub fn new(coordinates: &'a StoreCoordinates, store: &'a dyn PendingStore) -> Self {
        Self {
            coordinates,
            store,
            updater: RecordUpdater::new(store, StreamingBufferPredicate::default()),
            mirror: MirrorLogger::disabled(),
            mode: RunMode::Apply,
            today: None,
            phase: RunPhase::Init,
        }
    }

    pub fn with_mirror(mut self, mirror: Option<&'a dyn MirrorStore>) -> Self {
        self.mirror = MirrorLogger::new(mirror);
        self
    }

    pub fn with_predicate(mut self, predicate: StreamingBufferPredicate) -> Self {
        self.updater = RecordUpdater::new(self.store, predicate);
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Pin the calendar day instead of deriving it from the wall clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Execute the run once. The phase ends in `Done` on `Ok`, `Aborted` on
    /// `Err`.
    pub async fn run(&mut self) -> Result<RunSummary, SyncError> {
        match self.drive().await {
            Ok(summary) => {
                self.phase = RunPhase::Done;
                info!(
                    fetched = summary.fetched_count,
                    updated = summary.updated_count,
                    skipped_streaming = summary.skipped_streaming_count,
                    skipped_empty = summary.skipped_empty_count,
                    "all transactions processed"
                );
                Ok(summary)
            }
            Err(err) => {
                let at = self.phase;
                self.phase = RunPhase::Aborted;
                error!(phase = ?at, error = %err, "synchronization aborted");
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<RunSummary, SyncError> {
        self.phase = RunPhase::Init;
        self.coordinates.validate()?;

        self.phase = RunPhase::Fetching;
        let today = self
            .today
            .unwrap_or_else(|| today_in_reporting_tz(Utc::now()));
        let records = self
            .store
            .fetch_pending(today)
            .await
            .map_err(SyncError::Fetch)?;
        info!(
            count = records.len(),
            %today,
            table = %self.coordinates,
            backend = self.store.backend_name(),
            "retrieved pending transactions"
        );

        let mut summary = RunSummary {
            fetched_count: records.len(),
            ..RunSummary::default()
        };

        for (index, mut record) in records.into_iter().enumerate() {
            self.phase = RunPhase::Processing { index };

            let total = match aggregate_line_items(record.line_items.as_deref()) {
                Ok(Some(total)) => round_total(total),
                Ok(None) => {
                    debug!(record_id = %record.id, "no line items; skipping");
                    summary.skipped_empty_count += 1;
                    continue;
                }
                Err(source) => {
                    return Err(SyncError::Aggregation {
                        record_id: record.id,
                        source,
                    })
                }
            };

            if self.mode == RunMode::DryRun {
                summary.planned.push(PlannedUpdate {
                    id: record.id,
                    total,
                });
                continue;
            }

            match self.updater.update_total(&record.id, total).await {
                Ok(UpdateOutcome::Success) => {
                    summary.updated_count += 1;
                    info!(record_id = %record.id, %total, "updated transaction total");
                    record.set_derived_total(total);
                    self.mirror.log_transaction(&record).await;
                }
                Ok(UpdateOutcome::TransientSkip { .. }) => {
                    summary.skipped_streaming_count += 1;
                }
                Err(source) => {
                    return Err(SyncError::UpdateFatal {
                        record_id: record.id,
                        source,
                    });
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LineItem, Record, StoreError};
    use std::sync::Mutex;

    struct ScriptStore {
        fetch: Result<Vec<Record>, StoreError>,
        fail_on: Option<RecordId>,
        writes: Mutex<Vec<RecordId>>,
    }

    #[async_trait::async_trait]
    impl PendingStore for ScriptStore {
        fn backend_name(&self) -> &'static str {
            "script"
        }

        async fn fetch_pending(&self, _today: NaiveDate) -> Result<Vec<Record>, StoreError> {
            self.fetch.clone()
        }

        async fn update_total(&self, id: &RecordId, _total: Decimal) -> Result<(), StoreError> {
            self.writes.lock().unwrap().push(id.clone());
            if self.fail_on.as_ref() == Some(id) {
                return Err(StoreError::api(Some(403), "permission denied"));
            }
            Ok(())
        }
    }

    fn rec(id: i64) -> Record {
        Record::new(
            RecordId::Int(id),
            None,
            Some(vec![LineItem::new(Decimal::ONE, Decimal::TEN)]),
        )
    }

    fn coords() -> StoreCoordinates {
        StoreCoordinates::new("p", "d", "t")
    }

    #[tokio::test]
    async fn phase_ends_done_after_clean_run() {
        let store = ScriptStore {
            fetch: Ok(vec![rec(1)]),
            fail_on: None,
            writes: Mutex::new(Vec::new()),
        };
        let c = coords();
        let mut r = Reconciler::new(&c, &store);
        assert_eq!(r.phase(), RunPhase::Init);
        let summary = r.run().await.unwrap();
        assert_eq!(r.phase(), RunPhase::Done);
        assert_eq!(summary.updated_count, 1);
    }

    #[tokio::test]
    async fn blank_coordinates_abort_before_fetch() {
        let store = ScriptStore {
            fetch: Err(StoreError::transport("must not be called")),
            fail_on: None,
            writes: Mutex::new(Vec::new()),
        };
        let c = StoreCoordinates::new("", "d", "t");
        let mut r = Reconciler::new(&c, &store);
        let err = r.run().await.unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        assert_eq!(r.phase(), RunPhase::Aborted);
    }

    #[tokio::test]
    async fn fatal_update_stops_the_loop() {
        let store = ScriptStore {
            fetch: Ok(vec![rec(1), rec(2), rec(3)]),
            fail_on: Some(RecordId::Int(2)),
            writes: Mutex::new(Vec::new()),
        };
        let c = coords();
        let mut r = Reconciler::new(&c, &store);
        let err = r.run().await.unwrap_err();
        assert_eq!(err.record_id(), Some(&RecordId::Int(2)));
        assert_eq!(
            err.to_string(),
            "Error updating transaction 2: 403 permission denied"
        );
        assert_eq!(
            *store.writes.lock().unwrap(),
            vec![RecordId::Int(1), RecordId::Int(2)]
        );
    }

    #[tokio::test]
    async fn dry_run_plans_without_writing() {
        let store = ScriptStore {
            fetch: Ok(vec![rec(1), Record::new(RecordId::Int(2), None, None)]),
            fail_on: None,
            writes: Mutex::new(Vec::new()),
        };
        let c = coords();
        let mut r = Reconciler::new(&c, &store).with_mode(RunMode::DryRun);
        let summary = r.run().await.unwrap();
        assert!(store.writes.lock().unwrap().is_empty());
        assert_eq!(
            summary.planned,
            vec![PlannedUpdate {
                id: RecordId::Int(1),
                total: Decimal::TEN
            }]
        );
        assert_eq!(summary.skipped_empty_count, 1);
        assert_eq!(summary.updated_count, 0);
    }

    #[test]
    fn summary_text_matches_response_contract() {
        let s = RunSummary {
            updated_count: 2,
            skipped_streaming_count: 1,
            ..RunSummary::default()
        };
        assert_eq!(
            s.to_string(),
            "Synchronization complete. Updated: 2, Skipped (streaming buffer): 1"
        );
    }
}
