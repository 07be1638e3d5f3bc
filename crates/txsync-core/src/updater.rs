//! Record updater: one write, one classified outcome.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::{PendingStore, RecordId, StoreError};

/// Substring the primary store uses when a row is still in the append-only
/// ingestion buffer.
pub const DEFAULT_STREAMING_BUFFER_MARKER: &str = "Streaming buffer";

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    StreamingBuffer,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::StreamingBuffer => "streaming_buffer",
        }
    }
}

/// Non-fatal result of an update attempt. Fatal errors are `Err`, never a
/// variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Success,
    TransientSkip { reason: SkipReason },
}

// ---------------------------------------------------------------------------
// StreamingBufferPredicate
// ---------------------------------------------------------------------------

/// Decides whether a store error means "row is in the streaming buffer".
///
/// The store exposes no structured code for this condition, so the check is
/// a substring match over the error text. Case-insensitive by default: the
/// live BigQuery message reads "...would affect rows in the streaming
/// buffer...".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingBufferPredicate {
    marker: String,
    match_case: bool,
}

impl Default for StreamingBufferPredicate {
    fn default() -> Self {
        Self::new(DEFAULT_STREAMING_BUFFER_MARKER, false)
    }
}

impl StreamingBufferPredicate {
    pub fn new(marker: impl Into<String>, match_case: bool) -> Self {
        Self {
            marker: marker.into(),
            match_case,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn match_case(&self) -> bool {
        self.match_case
    }

    pub fn matches(&self, message: &str) -> bool {
        if self.marker.is_empty() {
            return false;
        }
        if self.match_case {
            message.contains(&self.marker)
        } else {
            message
                .to_lowercase()
                .contains(&self.marker.to_lowercase())
        }
    }

    pub fn matches_error(&self, err: &StoreError) -> bool {
        self.matches(&err.message)
    }
}

// ---------------------------------------------------------------------------
// RecordUpdater
// ---------------------------------------------------------------------------

pub struct RecordUpdater<'a> {
    store: &'a dyn PendingStore,
    predicate: StreamingBufferPredicate,
}

impl<'a> RecordUpdater<'a> {
    pub fn new(store: &'a dyn PendingStore, predicate: StreamingBufferPredicate) -> Self {
        Self { store, predicate }
    }

    /// Write `total` to record `id`.
    ///
    /// A streaming-buffer rejection is logged and returned as
    /// `TransientSkip`; it is not retried. Every other error is returned
    /// unchanged.
    pub async fn update_total(
        &self,
        id: &RecordId,
        total: Decimal,
    ) -> Result<UpdateOutcome, StoreError> {
        match self.store.update_total(id, total).await {
            Ok(()) => {
                debug!(record_id = %id, %total, "update applied");
                Ok(UpdateOutcome::Success)
            }
            Err(err) if self.predicate.matches_error(&err) => {
                warn!(
                    record_id = %id,
                    error = %err,
                    "transaction is in the streaming buffer; skipping update"
                );
                Ok(UpdateOutcome::TransientSkip {
                    reason: SkipReason::StreamingBuffer,
                })
            }
            Err(err) => Err(err),
        }
    }
}
