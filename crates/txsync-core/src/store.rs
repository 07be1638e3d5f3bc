//! Store boundaries.
//!
//! The primary store holds the transactions table; the mirror store is the
//! document collection that receives a copy of every successfully updated
//! record. Implementations live in `txsync-gcp` (BigQuery / Firestore),
//! `txsync-db` (Postgres) and `txsync-testkit` (in-memory fakes).

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::{Record, RecordId, SyncError};

/// Mirror collection receiving updated records.
pub const MIRROR_COLLECTION: &str = "transactions_to_check";

// ---------------------------------------------------------------------------
// StoreCoordinates
// ---------------------------------------------------------------------------

/// project / dataset / table of the primary store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCoordinates {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl StoreCoordinates {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        for (name, value) in [
            ("project", &self.project),
            ("dataset", &self.dataset),
            ("table", &self.table),
        ] {
            if value.trim().is_empty() {
                return Err(SyncError::Configuration(format!(
                    "store {name} identifier is empty"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for StoreCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Network / connection failure.
    Transport,
    /// The store answered with an error (HTTP status or SQL error).
    Api,
    /// A response or row could not be decoded.
    Decode,
}

/// Error surfaced by a store call. `message` carries the store's own text;
/// the streaming-buffer predicate matches against it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl StoreError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Transport,
            status: None,
            message: message.into(),
        }
    }

    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Api,
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Decode,
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "{code} {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Primary (tabular) store contract.
#[async_trait::async_trait]
pub trait PendingStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Every record with `date = today` and a null derived total, in store
    /// order. Read-only.
    async fn fetch_pending(&self, today: NaiveDate) -> Result<Vec<Record>, StoreError>;

    /// Set the derived total on the single record matching `id`. Returns once
    /// the statement has completed, not merely been submitted.
    async fn update_total(&self, id: &RecordId, total: Decimal) -> Result<(), StoreError>;
}

/// Secondary (document) store contract: keyed full-replace upsert.
#[async_trait::async_trait]
pub trait MirrorStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Write `record` under the key `record.id.to_string()`, replacing any
    /// prior document.
    async fn log_transaction(&self, record: &Record) -> Result<(), StoreError>;
}
