use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use txsync_core::{
    is_plain_identifier, PendingStore, Record, RecordId, StoreCoordinates, StoreError, SyncError,
    TableSchema,
};

use crate::{quote_ident, store_error};

/// Transactions table in Postgres. Rows are read through `to_jsonb(t)` so
/// the decoded record keeps every column for the mirror.
pub struct PgPendingStore {
    pool: PgPool,
    schema: TableSchema,
    select_sql: String,
    update_sql: String,
}

impl PgPendingStore {
    pub fn new(
        pool: PgPool,
        coordinates: &StoreCoordinates,
        schema: TableSchema,
    ) -> Result<Self, SyncError> {
        coordinates.validate()?;
        for name in [&coordinates.dataset, &coordinates.table] {
            if !is_plain_identifier(name) {
                return Err(SyncError::Configuration(format!(
                    "'{name}' is not a plain Postgres identifier"
                )));
            }
        }
        if let Some(bad) = schema.first_invalid_name() {
            return Err(SyncError::Configuration(format!(
                "column name '{bad}' is not a plain identifier"
            )));
        }

        let table = format!(
            "{}.{}",
            quote_ident(&coordinates.dataset),
            quote_ident(&coordinates.table)
        );
        let select_sql = format!(
            "select to_jsonb(t) from {table} t where t.{} = $1 and t.{} is null",
            quote_ident(&schema.date_column),
            quote_ident(&schema.total_column)
        );
        let update_sql = format!(
            "update {table} set {} = $1 where {} = $2",
            quote_ident(&schema.total_column),
            quote_ident(&schema.id_column)
        );

        Ok(Self {
            pool,
            schema,
            select_sql,
            update_sql,
        })
    }
}

#[async_trait::async_trait]
impl PendingStore for PgPendingStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn fetch_pending(&self, today: NaiveDate) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query_scalar::<_, Value>(&self.select_sql)
            .bind(today)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.into_iter()
            .map(|row| match row {
                Value::Object(obj) => Record::from_row(obj, &self.schema),
                other => Err(StoreError::decode(format!("row is not an object: {other}"))),
            })
            .collect()
    }

    async fn update_total(&self, id: &RecordId, total: Decimal) -> Result<(), StoreError> {
        let q = sqlx::query(&self.update_sql).bind(total);
        let q = match id {
            RecordId::Text(s) => q.bind(s.clone()),
            RecordId::Int(n) => q.bind(*n),
        };
        let done = q.execute(&self.pool).await.map_err(store_error)?;
        if done.rows_affected() == 0 {
            warn!(record_id = %id, "update matched no rows");
        }
        Ok(())
    }
}
