use crate::{AggregationError, RecordId, StoreError};

/// Run-aborting failures. Each maps to exactly one failure response.
///
/// Streaming-buffer skips and mirror failures are recovered inside the run
/// and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Required setting absent or invalid; raised before any store contact.
    #[error("{0}")]
    Configuration(String),

    /// Store client construction failed.
    #[error("Error initializing store client: {0}")]
    Connect(String),

    /// Pending-record query failed; no partial list is used.
    #[error("Error executing query: {0}")]
    Fetch(#[source] StoreError),

    #[error("Error aggregating transaction {record_id}: {source}")]
    Aggregation {
        record_id: RecordId,
        source: AggregationError,
    },

    /// Non-transient write failure; the run stops at this record.
    #[error("Error updating transaction {record_id}: {source}")]
    UpdateFatal {
        record_id: RecordId,
        source: StoreError,
    },
}

impl SyncError {
    /// The record the run stopped at, if the failure is record-scoped.
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            SyncError::Aggregation { record_id, .. } | SyncError::UpdateFatal { record_id, .. } => {
                Some(record_id)
            }
            _ => None,
        }
    }
}
