//! OAuth2 bearer tokens for Google APIs.
//!
//! Two sources: a fixed token from the environment (local runs, CI) and the
//! instance metadata server (Cloud Functions / Cloud Run / GCE). The token
//! value is never logged.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use txsync_core::StoreError;

use crate::wire::{check_status, endpoint, transport_error};

pub const DEFAULT_METADATA_BASE_URL: &str = "http://metadata.google.internal";

/// Refresh this long before the server-reported expiry.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, StoreError>;
}

// ---------------------------------------------------------------------------
// StaticToken
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken").field(&"<redacted>").finish()
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, StoreError> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// MetadataServerToken
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Default service-account token from the metadata server, cached until
/// shortly before it expires.
pub struct MetadataServerToken {
    http: reqwest::Client,
    base_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServerToken {
    pub fn new() -> Self {
        Self::new_with_base_url(DEFAULT_METADATA_BASE_URL.to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<MetadataTokenResponse, StoreError> {
        let url = endpoint(
            &self.base_url,
            &[
                "computeMetadata",
                "v1",
                "instance",
                "service-accounts",
                "default",
                "token",
            ],
        )?;
        let resp = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| transport_error("metadata", e))?;
        let resp = check_status("metadata", resp).await?;
        resp.json()
            .await
            .map_err(|e| StoreError::decode(format!("metadata token decode failed: {e}")))
    }
}

impl Default for MetadataServerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetadataServerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataServerToken")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TokenSource for MetadataServerToken {
    async fn token(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.refresh_at {
                return Ok(c.value.clone());
            }
        }

        let fresh = self.fetch().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_SLACK);
        debug!(expires_in = fresh.expires_in, "fetched metadata server token");
        // An expiry past what Instant can represent is not cached.
        *cached = Instant::now()
            .checked_add(lifetime)
            .map(|refresh_at| CachedToken {
                value: fresh.access_token.clone(),
                refresh_at,
            });
        Ok(fresh.access_token)
    }
}
