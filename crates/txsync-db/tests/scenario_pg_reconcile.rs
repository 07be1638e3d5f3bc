//! Scenario: full reconciliation against a real Postgres.
//!
//! DB-backed; run with `TXSYNC_DATABASE_URL` set and `--ignored`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use txsync_core::{Reconciler, StoreCoordinates, TableSchema};
use txsync_db::{PgMirror, PgPendingStore};

async fn pool() -> anyhow::Result<PgPool> {
    let url = std::env::var(txsync_db::ENV_DB_URL)?;
    let pool = txsync_db::connect(&url).await?;
    txsync_db::migrate(&pool).await?;
    Ok(pool)
}

async fn seed(pool: &PgPool, schema: &str) -> anyhow::Result<()> {
    sqlx::query(&format!("create schema {schema}"))
        .execute(pool)
        .await?;
    sqlx::query(&format!(
        "create table {schema}.transactions (
            transaction_id text primary key,
            date date not null,
            total_sale_price numeric,
            sales jsonb
        )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        r#"insert into {schema}.transactions values
            ('T-1', '2026-10-15', null, '[{{"quantity": 2, "unit_price": 3.5}}, {{"quantity": 1, "unit_price": 4}}]'),
            ('T-2', '2026-10-15', null, '[]'),
            ('T-3', '2026-10-14', null, '[{{"quantity": 1, "unit_price": 1}}]'),
            ('T-4', '2026-10-15', 9.99,  '[{{"quantity": 1, "unit_price": 1}}]')"#
    ))
    .execute(pool)
    .await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires TXSYNC_DATABASE_URL"]
async fn reconcile_updates_todays_null_totals_and_mirrors() -> anyhow::Result<()> {
    let pool = pool().await?;
    let schema = format!("txsync_it_{}", uuid::Uuid::new_v4().simple());
    seed(&pool, &schema).await?;

    let coords = StoreCoordinates::new("local", schema.clone(), "transactions");
    let store = PgPendingStore::new(pool.clone(), &coords, TableSchema::default())?;
    let mirror = PgMirror::new(pool.clone());

    let summary = Reconciler::new(&coords, &store)
        .with_mirror(Some(&mirror))
        .with_today(NaiveDate::from_ymd_opt(2026, 10, 15).unwrap())
        .run()
        .await?;

    assert_eq!(
        summary.to_string(),
        "Synchronization complete. Updated: 1, Skipped (streaming buffer): 0"
    );
    assert_eq!(summary.fetched_count, 2);

    let total: Option<Decimal> = sqlx::query_scalar(&format!(
        "select total_sale_price from {schema}.transactions where transaction_id = 'T-1'"
    ))
    .fetch_one(&pool)
    .await?;
    assert_eq!(total, Some(Decimal::new(110, 1)));

    let untouched: Option<Decimal> = sqlx::query_scalar(&format!(
        "select total_sale_price from {schema}.transactions where transaction_id = 'T-3'"
    ))
    .fetch_one(&pool)
    .await?;
    assert_eq!(untouched, None);

    let doc: serde_json::Value =
        sqlx::query_scalar("select document from transactions_to_check where doc_id = 'T-1'")
            .fetch_one(&pool)
            .await?;
    assert_eq!(doc["transaction_id"], "T-1");
    assert_eq!(doc["total_sale_price"], 11);

    sqlx::query(&format!("drop schema {schema} cascade"))
        .execute(&pool)
        .await?;
    sqlx::query("delete from transactions_to_check where doc_id = 'T-1'")
        .execute(&pool)
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires TXSYNC_DATABASE_URL"]
async fn migrate_twice_is_idempotent() -> anyhow::Result<()> {
    let pool = pool().await?;
    txsync_db::migrate(&pool).await?;
    let st = txsync_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_mirror_table);
    Ok(())
}
