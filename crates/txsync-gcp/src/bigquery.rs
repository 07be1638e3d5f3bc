//! BigQuery primary store.
//!
//! Statements go through `jobs.query` with named parameters; only the
//! table path and column names are spliced into the SQL text, and those are
//! checked up front. A response with `jobComplete = false` is polled through
//! `getQueryResults` until the job finishes, so `update_total` returns only
//! after the DML statement has completed.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use txsync_core::{
    PendingStore, Record, RecordId, StoreCoordinates, StoreError, SyncError, TableSchema,
    TOTAL_SCALE,
};

use crate::auth::TokenSource;
use crate::wire::{check_status, decode_row, endpoint, transport_error, TableSchemaWire};

pub const DEFAULT_BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com";

const SERVICE: &str = "bigquery";

/// Server-side wait per `jobs.query` / `getQueryResults` call.
const SERVER_WAIT_MS: u64 = 10_000;
const MAX_POLLS: usize = 30;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    #[serde(default)]
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_reference: JobReference,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    schema: Option<TableSchemaWire>,
    #[serde(default)]
    rows: Vec<Value>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    num_dml_affected_rows: Option<String>,
}

struct QueryParam {
    name: &'static str,
    kind: &'static str,
    value: String,
}

impl QueryParam {
    fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "parameterType": {"type": self.kind},
            "parameterValue": {"value": self.value},
        })
    }
}

// ---------------------------------------------------------------------------
// BigQueryStore
// ---------------------------------------------------------------------------

pub struct BigQueryStore {
    http: reqwest::Client,
    base_url: String,
    coordinates: StoreCoordinates,
    schema: TableSchema,
    token: Arc<dyn TokenSource>,
    poll_interval: Duration,
}

impl BigQueryStore {
    pub fn new(
        coordinates: StoreCoordinates,
        schema: TableSchema,
        token: Arc<dyn TokenSource>,
    ) -> Result<Self, SyncError> {
        Self::new_with_base_url(
            coordinates,
            schema,
            token,
            DEFAULT_BIGQUERY_BASE_URL.to_string(),
        )
    }

    pub fn new_with_base_url(
        coordinates: StoreCoordinates,
        schema: TableSchema,
        token: Arc<dyn TokenSource>,
        base_url: String,
    ) -> Result<Self, SyncError> {
        coordinates.validate()?;
        if let Some(bad) = schema.first_invalid_name() {
            return Err(SyncError::Configuration(format!(
                "column name '{bad}' is not a plain identifier"
            )));
        }
        for part in [&coordinates.project, &coordinates.dataset, &coordinates.table] {
            if part.contains(['`', '\\', '\n', '\r']) {
                return Err(SyncError::Configuration(format!(
                    "table path component '{part}' contains a quoting character"
                )));
            }
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            coordinates,
            schema,
            token,
            poll_interval: Duration::from_millis(500),
        })
    }

    /// Delay between polls of an unfinished job.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn table_path(&self) -> String {
        format!(
            "`{}.{}.{}`",
            self.coordinates.project, self.coordinates.dataset, self.coordinates.table
        )
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT * FROM {} WHERE {} = @today AND {} IS NULL",
            self.table_path(),
            self.schema.date_column,
            self.schema.total_column
        )
    }

    fn update_sql(&self) -> String {
        format!(
            "UPDATE {} SET {} = @total WHERE {} = @id",
            self.table_path(),
            self.schema.total_column,
            self.schema.id_column
        )
    }

    async fn bearer(&self) -> Result<String, StoreError> {
        Ok(format!("Bearer {}", self.token.token().await?))
    }

    /// `jobs.query`, then poll until the job is complete. Returns the first
    /// complete response; later pages are fetched by the caller.
    async fn run_query(&self, sql: &str, params: &[QueryParam]) -> Result<QueryResponse, StoreError> {
        let url = endpoint(
            &self.base_url,
            &["bigquery", "v2", "projects", &self.coordinates.project, "queries"],
        )?;
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": params.iter().map(QueryParam::to_json).collect::<Vec<_>>(),
            "timeoutMs": SERVER_WAIT_MS,
        });
        debug!(sql, "bigquery jobs.query");

        let resp = self
            .http
            .post(url)
            .header("Authorization", self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let mut out = decode_response(check_status(SERVICE, resp).await?).await?;

        let mut polls = 0;
        while !out.job_complete {
            polls += 1;
            if polls > MAX_POLLS {
                return Err(StoreError::transport(format!(
                    "bigquery job {} did not complete after {MAX_POLLS} polls",
                    out.job_reference.job_id
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            let reference = std::mem::take(&mut out.job_reference);
            out = self.get_results(&reference, None).await?;
            if out.job_reference.job_id.is_empty() {
                out.job_reference = reference;
            }
        }
        Ok(out)
    }

    async fn get_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, StoreError> {
        if job.job_id.is_empty() {
            return Err(StoreError::decode("bigquery response has no jobReference.jobId"));
        }
        let mut url = endpoint(
            &self.base_url,
            &[
                "bigquery",
                "v2",
                "projects",
                &self.coordinates.project,
                "queries",
                &job.job_id,
            ],
        )?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("timeoutMs", &SERVER_WAIT_MS.to_string());
            if let Some(loc) = job.location.as_deref() {
                q.append_pair("location", loc);
            }
            if let Some(tok) = page_token {
                q.append_pair("pageToken", tok);
            }
        }

        let resp = self
            .http
            .get(url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        decode_response(check_status(SERVICE, resp).await?).await
    }
}

async fn decode_response(resp: reqwest::Response) -> Result<QueryResponse, StoreError> {
    resp.json()
        .await
        .map_err(|e| StoreError::decode(format!("bigquery response decode failed: {e}")))
}

/// NUMERIC parameter text. Halfway values round away from zero, matching
/// BigQuery's own coercion.
fn numeric_literal(total: Decimal) -> String {
    total
        .round_dp_with_strategy(TOTAL_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

fn id_param(id: &RecordId) -> QueryParam {
    match id {
        RecordId::Text(s) => QueryParam {
            name: "id",
            kind: "STRING",
            value: s.clone(),
        },
        RecordId::Int(n) => QueryParam {
            name: "id",
            kind: "INT64",
            value: n.to_string(),
        },
    }
}

#[async_trait::async_trait]
impl PendingStore for BigQueryStore {
    fn backend_name(&self) -> &'static str {
        "bigquery"
    }

    async fn fetch_pending(&self, today: NaiveDate) -> Result<Vec<Record>, StoreError> {
        let params = [QueryParam {
            name: "today",
            kind: "DATE",
            value: today.format("%Y-%m-%d").to_string(),
        }];
        let mut page = self.run_query(&self.select_sql(), &params).await?;
        let fields = page.schema.take().unwrap_or_default().fields;

        let mut records = Vec::new();
        loop {
            for row in &page.rows {
                let obj = decode_row(&fields, row)?;
                records.push(Record::from_row(obj, &self.schema)?);
            }
            let Some(token) = page.page_token.take() else {
                break;
            };
            let reference = std::mem::take(&mut page.job_reference);
            page = self.get_results(&reference, Some(&token)).await?;
            if page.job_reference.job_id.is_empty() {
                page.job_reference = reference;
            }
        }
        Ok(records)
    }

    async fn update_total(&self, id: &RecordId, total: Decimal) -> Result<(), StoreError> {
        let params = [
            QueryParam {
                name: "total",
                kind: "NUMERIC",
                value: numeric_literal(total),
            },
            id_param(id),
        ];
        let done = self.run_query(&self.update_sql(), &params).await?;
        match done.num_dml_affected_rows.as_deref() {
            Some("0") => warn!(record_id = %id, "update matched no rows"),
            Some(n) => debug!(record_id = %id, affected = n, "update applied"),
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticToken;

    fn store(schema: TableSchema) -> Result<BigQueryStore, SyncError> {
        BigQueryStore::new_with_base_url(
            StoreCoordinates::new("acme-prod", "sales", "transactions"),
            schema,
            Arc::new(StaticToken::new("t")),
            "http://127.0.0.1:1".to_string(),
        )
    }

    #[test]
    fn statements_use_parameters_and_configured_columns() {
        let s = store(TableSchema::default()).unwrap();
        assert_eq!(
            s.select_sql(),
            "SELECT * FROM `acme-prod.sales.transactions` WHERE date = @today AND total_sale_price IS NULL"
        );
        assert_eq!(
            s.update_sql(),
            "UPDATE `acme-prod.sales.transactions` SET total_sale_price = @total WHERE transaction_id = @id"
        );
    }

    #[test]
    fn rejects_non_identifier_columns() {
        let schema = TableSchema {
            id_column: "id; DROP TABLE x".to_string(),
            ..TableSchema::default()
        };
        assert!(matches!(store(schema), Err(SyncError::Configuration(_))));
    }

    #[test]
    fn rejects_backtick_in_table_path() {
        let err = BigQueryStore::new_with_base_url(
            StoreCoordinates::new("p", "d", "t` OR 1=1 --"),
            TableSchema::default(),
            Arc::new(StaticToken::new("t")),
            "http://127.0.0.1:1".to_string(),
        );
        assert!(matches!(err, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn numeric_literal_rounds_midpoints_away_from_zero() {
        assert_eq!(numeric_literal(Decimal::new(5, 10)), "0.000000001");
        assert_eq!(numeric_literal(Decimal::new(15, 10)), "0.000000002");
        assert_eq!(numeric_literal(Decimal::new(1100, 2)), "11");
    }

    #[test]
    fn id_param_types_follow_id_kind() {
        let p = id_param(&RecordId::Int(7));
        assert_eq!((p.kind, p.value.as_str()), ("INT64", "7"));
        let p = id_param(&RecordId::from("O'Neil"));
        assert_eq!((p.kind, p.value.as_str()), ("STRING", "O'Neil"));
    }
}
