//! Firestore mirror store.
//!
//! One document per updated record in [`MIRROR_COLLECTION`], keyed by the
//! string form of the record id. The PATCH carries no `updateMask`, so a
//! second write for the same id replaces the whole document.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use txsync_core::{MirrorStore, Record, StoreError, MIRROR_COLLECTION};

use crate::auth::TokenSource;
use crate::wire::{check_status, endpoint, transport_error};

pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";

const SERVICE: &str = "firestore";

pub struct FirestoreMirror {
    http: reqwest::Client,
    base_url: String,
    project: String,
    database: String,
    token: Arc<dyn TokenSource>,
}

impl FirestoreMirror {
    pub fn new(project: String, database: String, token: Arc<dyn TokenSource>) -> Self {
        Self::new_with_base_url(project, database, token, DEFAULT_FIRESTORE_BASE_URL.to_string())
    }

    pub fn new_with_base_url(
        project: String,
        database: String,
        token: Arc<dyn TokenSource>,
        base_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            project,
            database,
            token,
        }
    }
}

#[async_trait::async_trait]
impl MirrorStore for FirestoreMirror {
    fn backend_name(&self) -> &'static str {
        "firestore"
    }

    async fn log_transaction(&self, record: &Record) -> Result<(), StoreError> {
        let doc_id = record.id.to_string();
        if doc_id.is_empty() || doc_id == "." || doc_id == ".." || doc_id.contains('/') {
            return Err(StoreError::decode(format!(
                "'{doc_id}' is not a valid document id"
            )));
        }

        let url = endpoint(
            &self.base_url,
            &[
                "v1",
                "projects",
                &self.project,
                "databases",
                &self.database,
                "documents",
                MIRROR_COLLECTION,
                &doc_id,
            ],
        )?;
        let body = json!({ "fields": encode_fields(&record.row) });
        let token = self.token.token().await?;

        let resp = self
            .http
            .patch(url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        check_status(SERVICE, resp).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Value encoding
// ---------------------------------------------------------------------------

fn encode_fields(map: &Map<String, Value>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// JSON value -> Firestore REST `Value`.
pub fn encode_value(v: &Value) -> Value {
    match v {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalars() {
        assert_eq!(encode_value(&json!(null)), json!({"nullValue": null}));
        assert_eq!(encode_value(&json!(true)), json!({"booleanValue": true}));
        assert_eq!(encode_value(&json!(12)), json!({"integerValue": "12"}));
        assert_eq!(encode_value(&json!(-3)), json!({"integerValue": "-3"}));
        assert_eq!(encode_value(&json!(2.5)), json!({"doubleValue": 2.5}));
        assert_eq!(encode_value(&json!("x")), json!({"stringValue": "x"}));
    }

    #[test]
    fn encodes_nested_line_items() {
        let v = json!({"sales": [{"quantity": 2, "unit_price": "3.50"}]});
        assert_eq!(
            encode_value(&v),
            json!({"mapValue": {"fields": {
                "sales": {"arrayValue": {"values": [
                    {"mapValue": {"fields": {
                        "quantity": {"integerValue": "2"},
                        "unit_price": {"stringValue": "3.50"}
                    }}}
                ]}}
            }}})
        );
    }
}
