//! Store client construction.

use std::sync::Arc;

use sqlx::PgPool;
use txsync_config::{MirrorBackend, PrimaryBackend, SyncConfig};
use txsync_core::{MirrorStore, PendingStore, SyncError};
use txsync_db::{PgMirror, PgPendingStore};
use txsync_gcp::{
    BigQueryStore, FirestoreMirror, MetadataServerToken, StaticToken, TokenSource,
    DEFAULT_BIGQUERY_BASE_URL, DEFAULT_FIRESTORE_BASE_URL,
};

/// Store clients for one invocation. Dropped when the invocation ends.
pub struct Stores {
    pub primary: Box<dyn PendingStore>,
    pub mirror: Option<Box<dyn MirrorStore>>,
}

/// Builds store clients from a validated config. Called at most once per
/// invocation, and only after configuration resolved cleanly.
#[async_trait::async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, config: &SyncConfig) -> Result<Stores, SyncError>;
}

/// Production connector: BigQuery / Firestore over REST, or Postgres.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiveConnector;

fn token_source(config: &SyncConfig) -> Arc<dyn TokenSource> {
    match (&config.gcp.access_token, &config.gcp.metadata_base_url) {
        (Some(token), _) => Arc::new(StaticToken::new(token.clone())),
        (None, Some(base)) => Arc::new(MetadataServerToken::new_with_base_url(base.clone())),
        (None, None) => Arc::new(MetadataServerToken::new()),
    }
}

async fn pg_pool(config: &SyncConfig) -> Result<PgPool, SyncError> {
    let url = config.database_url.as_deref().ok_or_else(|| {
        SyncError::Configuration("TXSYNC_DATABASE_URL environment variable is not set.".to_string())
    })?;
    txsync_db::connect(url)
        .await
        .map_err(|e| SyncError::Connect(format!("{e:#}")))
}

#[async_trait::async_trait]
impl StoreConnector for LiveConnector {
    async fn connect(&self, config: &SyncConfig) -> Result<Stores, SyncError> {
        let mut pool: Option<PgPool> = None;
        let mut cached_token: Option<Arc<dyn TokenSource>> = None;
        let mut token = || cached_token.get_or_insert_with(|| token_source(config)).clone();

        let primary: Box<dyn PendingStore> = match config.backend {
            PrimaryBackend::BigQuery => Box::new(BigQueryStore::new_with_base_url(
                config.coordinates.clone(),
                config.schema.clone(),
                token(),
                config
                    .gcp
                    .bigquery_base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BIGQUERY_BASE_URL.to_string()),
            )?),
            PrimaryBackend::Postgres => {
                let p = pg_pool(config).await?;
                pool = Some(p.clone());
                Box::new(PgPendingStore::new(p, &config.coordinates, config.schema.clone())?)
            }
        };

        let mirror: Option<Box<dyn MirrorStore>> = match config.mirror {
            MirrorBackend::Off => None,
            MirrorBackend::Firestore => Some(Box::new(FirestoreMirror::new_with_base_url(
                config.gcp.firestore_project.clone(),
                config.gcp.firestore_database.clone(),
                token(),
                config
                    .gcp
                    .firestore_base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FIRESTORE_BASE_URL.to_string()),
            ))),
            MirrorBackend::Postgres => {
                let p = match pool {
                    Some(p) => p,
                    None => pg_pool(config).await?,
                };
                Some(Box::new(PgMirror::new(p)))
            }
        };

        Ok(Stores { primary, mirror })
    }
}
