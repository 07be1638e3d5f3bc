//! txsync-db
//!
//! Postgres backends for self-hosted deployments and local development.
//! `dataset` maps to a Postgres schema and `table` to a table in it; the
//! project coordinate is informational only (the database comes from the URL).

mod mirror;
mod pending;

pub use mirror::PgMirror;
pub use pending::PgPendingStore;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use txsync_core::{StoreError, MIRROR_COLLECTION};

pub const ENV_DB_URL: &str = "TXSYNC_DATABASE_URL";

/// Connect to Postgres at `url`.
pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Connect to Postgres using TXSYNC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_mirror_table: bool,
}

/// Connectivity + mirror table presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = current_schema() and table_name = $1
        )
        "#,
    )
    .bind(MIRROR_COLLECTION)
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_mirror_table: exists,
    })
}

/// `"name"`. Callers only pass names that passed `is_plain_identifier`.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => {
            let message = match db.code() {
                Some(code) => format!("{} (sqlstate {code})", db.message()),
                None => db.message().to_string(),
            };
            StoreError::api(None, message)
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::decode(err.to_string())
        }
        other => StoreError::transport(other.to_string()),
    }
}
