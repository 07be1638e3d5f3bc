//! Best-effort mirror of updated records.

use tracing::{debug, error};

use crate::{MirrorStore, Record};

/// Wraps an optional [`MirrorStore`] and swallows its failures.
///
/// Nothing this type does can abort a run or change its counters.
#[derive(Clone, Copy)]
pub struct MirrorLogger<'a> {
    sink: Option<&'a dyn MirrorStore>,
}

impl<'a> MirrorLogger<'a> {
    pub fn new(sink: Option<&'a dyn MirrorStore>) -> Self {
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub async fn log_transaction(&self, record: &Record) {
        let Some(sink) = self.sink else {
            return;
        };
        match sink.log_transaction(record).await {
            Ok(()) => debug!(
                record_id = %record.id,
                backend = sink.backend_name(),
                "mirrored transaction"
            ),
            Err(err) => error!(
                record_id = %record.id,
                backend = sink.backend_name(),
                error = %err,
                "mirror write failed; continuing"
            ),
        }
    }
}
