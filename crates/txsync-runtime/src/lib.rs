//! txsync-runtime
//!
//! One invocation of the synchronization job, end to end:
//! configuration -> store clients -> [`Reconciler`] -> response.
//!
//! Nothing survives between invocations. Configuration is resolved by the
//! caller per invocation and passed in as a `Result`, so a configuration
//! failure is answered without any store client ever being built.

mod connect;

pub use connect::{LiveConnector, StoreConnector, Stores};

use chrono::NaiveDate;
use tracing::{error, info, info_span, Instrument};
use txsync_config::{ConfigError, SyncConfig};
use txsync_core::{Reconciler, RunMode, RunSummary, SyncError};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct InvocationOptions {
    pub mode: RunMode,
    /// Override the reporting-zone calendar day.
    pub today: Option<NaiveDate>,
}

/// The HTTP-shaped answer: status code plus plain-text body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug)]
pub struct Invocation {
    pub invocation_id: Uuid,
    pub result: Result<RunSummary, SyncError>,
}

impl Invocation {
    /// 200 with the summary text, or 500 with the error text.
    pub fn response(&self) -> InvocationResponse {
        match &self.result {
            Ok(summary) => InvocationResponse {
                status: 200,
                body: summary.to_string(),
            },
            Err(err) => InvocationResponse {
                status: 500,
                body: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one synchronization. Every outcome, including configuration and
/// connection failures, comes back as exactly one [`Invocation`].
pub async fn synchronize_transactions(
    config: Result<SyncConfig, ConfigError>,
    connector: &dyn StoreConnector,
    options: InvocationOptions,
) -> Invocation {
    let invocation_id = Uuid::new_v4();
    let span = info_span!("synchronize_transactions", %invocation_id);
    let result = run_once(config, connector, options).instrument(span).await;
    Invocation {
        invocation_id,
        result,
    }
}

async fn run_once(
    config: Result<SyncConfig, ConfigError>,
    connector: &dyn StoreConnector,
    options: InvocationOptions,
) -> Result<RunSummary, SyncError> {
    let config = config.map_err(|e| {
        error!(error = %e, "configuration invalid; no store contacted");
        SyncError::from(e)
    })?;
    info!(
        table = %config.coordinates,
        backend = config.backend.as_str(),
        mirror = config.mirror.as_str(),
        mode = ?options.mode,
        "synchronization started"
    );

    let stores = connector.connect(&config).await.map_err(|e| {
        error!(error = %e, "store client construction failed");
        e
    })?;

    let mut run = Reconciler::new(&config.coordinates, &*stores.primary)
        .with_mirror(stores.mirror.as_deref())
        .with_predicate(config.predicate.clone())
        .with_mode(options.mode);
    if let Some(today) = options.today {
        run = run.with_today(today);
    }
    run.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use txsync_core::{RecordId, StoreError};

    #[test]
    fn response_maps_outcome_to_status() {
        let ok = Invocation {
            invocation_id: Uuid::nil(),
            result: Ok(RunSummary {
                updated_count: 3,
                ..RunSummary::default()
            }),
        };
        assert_eq!(
            ok.response(),
            InvocationResponse {
                status: 200,
                body: "Synchronization complete. Updated: 3, Skipped (streaming buffer): 0"
                    .to_string()
            }
        );

        let failed = Invocation {
            invocation_id: Uuid::nil(),
            result: Err(SyncError::UpdateFatal {
                record_id: RecordId::from("T-7"),
                source: StoreError::transport("connection reset"),
            }),
        };
        let resp = failed.response();
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, "Error updating transaction T-7: connection reset");
        assert!(!failed.is_success());
    }
}
