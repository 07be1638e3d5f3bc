use sqlx::PgPool;
use txsync_core::{MirrorStore, Record, StoreError};

use crate::store_error;

/// `transactions_to_check` table (see migrations). Upsert by doc id, so a
/// repeat write replaces the stored document.
pub struct PgMirror {
    pool: PgPool,
}

impl PgMirror {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MirrorStore for PgMirror {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn log_transaction(&self, record: &Record) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            insert into transactions_to_check (doc_id, document, written_at)
            values ($1, $2, now())
            on conflict (doc_id) do update
              set document = excluded.document,
                  written_at = excluded.written_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.to_document())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}
