//! txsync-core
//!
//! Reconciliation core for the daily `total_sale_price` backfill.
//!
//! - Fetch today's pending records (America/El_Salvador calendar day).
//! - Aggregate `quantity * unit_price` over each record's line items.
//! - Write the total back; a streaming-buffer rejection is a transient skip,
//!   any other write error aborts the run.
//! - Mirror successfully updated records into a best-effort audit sink.
//!
//! Deterministic, pure logic apart from the store traits. No HTTP, no SQL.

mod aggregate;
mod calendar;
mod driver;
mod error;
mod mirror;
mod model;
mod store;
mod updater;

pub use aggregate::{aggregate_line_items, round_total, AggregationError, TOTAL_SCALE};
pub use calendar::{today_in_reporting_tz, REPORTING_TZ};
pub use driver::{PlannedUpdate, Reconciler, RunMode, RunPhase, RunSummary};
pub use error::SyncError;
pub use mirror::MirrorLogger;
pub use model::{
    decimal_from_json, decimal_to_json, is_plain_identifier, LineItem, Record, RecordId,
    TableSchema,
};
pub use store::{
    MirrorStore, PendingStore, StoreCoordinates, StoreError, StoreErrorKind, MIRROR_COLLECTION,
};
pub use updater::{
    RecordUpdater, SkipReason, StreamingBufferPredicate, UpdateOutcome,
    DEFAULT_STREAMING_BUFFER_MARKER,
};
