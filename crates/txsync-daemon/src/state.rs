//! Shared state for txsync-daemon.
//!
//! Handlers receive `State<Arc<AppState>>`. Nothing here feeds one
//! invocation's result into the next: `status` is observational only.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use txsync_config::{ConfigError, SyncConfig};
use txsync_runtime::{Invocation, LiveConnector, StoreConnector};
use uuid::Uuid;

/// Resolves configuration at the start of every invocation.
pub type ConfigSource = Arc<dyn Fn() -> Result<SyncConfig, ConfigError> + Send + Sync>;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LastRun {
    pub invocation_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub status: u16,
    pub updated: usize,
    pub skipped_streaming: usize,
    pub error: Option<String>,
}

impl LastRun {
    pub fn from_invocation(inv: &Invocation) -> Self {
        let (updated, skipped_streaming, error) = match &inv.result {
            Ok(s) => (s.updated_count, s.skipped_streaming_count, None),
            Err(e) => (0, 0, Some(e.to_string())),
        };
        Self {
            invocation_id: inv.invocation_id,
            finished_at: Utc::now(),
            status: inv.response().status,
            updated,
            skipped_streaming,
            error,
        }
    }
}

/// Returned by GET /v1/status.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub runs_started: u64,
    pub runs_failed: u64,
    pub last_run: Option<LastRun>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub connector: Arc<dyn StoreConnector>,
    pub config_source: ConfigSource,
    pub status: Arc<RwLock<StatusSnapshot>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Live stores, configuration from the process environment.
    pub fn new() -> Self {
        Self::with_sources(
            Arc::new(LiveConnector),
            Arc::new(txsync_config::resolve_from_env),
        )
    }

    pub fn with_sources(connector: Arc<dyn StoreConnector>, config_source: ConfigSource) -> Self {
        Self {
            build: BuildInfo {
                service: "txsync-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            connector,
            config_source,
            status: Arc::new(RwLock::new(StatusSnapshot {
                daemon_uptime_secs: uptime_secs(),
                ..StatusSnapshot::default()
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
