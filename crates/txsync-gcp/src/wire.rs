//! Shared REST plumbing: endpoint building, error bodies, BigQuery row decoding.

use reqwest::{Response, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use txsync_core::StoreError;

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// `base` plus percent-encoded path segments. Segments never carry `/`
/// through unescaped, so ids cannot walk the resource path.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = Url::parse(base)
        .map_err(|e| StoreError::transport(format!("invalid base url '{base}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::transport(format!("base url '{base}' cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Error bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> StoreError {
    StoreError::transport(format!("{service} request failed: {err}"))
}

/// Pass a 2xx response through; turn anything else into an `Api` error
/// carrying the service's own message text.
pub(crate) async fn check_status(service: &str, resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;
    let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(env) if !env.error.message.is_empty() => env.error.message,
        _ if text.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        _ => text,
    };
    Err(StoreError::api(Some(status.as_u16()), message))
}

// ---------------------------------------------------------------------------
// BigQuery f/v rows
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct TableSchemaWire {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct FieldSchema {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// Decode one `{"f":[{"v":..}, ..]}` row into a named object.
pub(crate) fn decode_row(fields: &[FieldSchema], row: &Value) -> Result<Map<String, Value>, StoreError> {
    let cells = row
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::decode("row is missing its 'f' cell list"))?;
    if cells.len() != fields.len() {
        return Err(StoreError::decode(format!(
            "row has {} cells but schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }
    let mut out = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(cells) {
        let v = cell.get("v").unwrap_or(&Value::Null);
        out.insert(field.name.clone(), decode_cell(field, v)?);
    }
    Ok(out)
}

fn decode_cell(field: &FieldSchema, v: &Value) -> Result<Value, StoreError> {
    if field.mode.as_deref() == Some("REPEATED") {
        return match v {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(items) => items
                .iter()
                .map(|item| decode_scalar(field, item.get("v").unwrap_or(&Value::Null)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(StoreError::decode(format!(
                "repeated field '{}' is not an array: {other}",
                field.name
            ))),
        };
    }
    decode_scalar(field, v)
}

fn decode_scalar(field: &FieldSchema, v: &Value) -> Result<Value, StoreError> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => Ok(Value::Object(decode_row(&field.fields, v)?)),
        "INTEGER" | "INT64" => Ok(parse_number(v).unwrap_or_else(|| v.clone())),
        "FLOAT" | "FLOAT64" => Ok(parse_number(v).unwrap_or_else(|| v.clone())),
        "BOOLEAN" | "BOOL" => Ok(match v.as_str() {
            Some("true") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => v.clone(),
        }),
        // NUMERIC / BIGNUMERIC stay strings: exact decimals, no f64 detour.
        _ => Ok(v.clone()),
    }
}

fn parse_number(v: &Value) -> Option<Value> {
    v.as_str()?.parse::<serde_json::Number>().ok().map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<FieldSchema> {
        serde_json::from_value(json!([
            {"name": "transaction_id", "type": "STRING", "mode": "NULLABLE"},
            {"name": "store_no", "type": "INTEGER"},
            {"name": "date", "type": "DATE"},
            {"name": "total_sale_price", "type": "NUMERIC"},
            {"name": "paid", "type": "BOOLEAN"},
            {"name": "sales", "type": "RECORD", "mode": "REPEATED", "fields": [
                {"name": "quantity", "type": "INTEGER"},
                {"name": "unit_price", "type": "FLOAT"}
            ]}
        ]))
        .unwrap()
    }

    #[test]
    fn decodes_nested_repeated_rows() {
        let row = json!({"f": [
            {"v": "T-1"},
            {"v": "42"},
            {"v": "2026-10-15"},
            {"v": null},
            {"v": "true"},
            {"v": [
                {"v": {"f": [{"v": "2"}, {"v": "3.5"}]}},
                {"v": {"f": [{"v": "1"}, {"v": "4"}]}}
            ]}
        ]});
        let got = Value::Object(decode_row(&schema(), &row).unwrap());
        assert_eq!(
            got,
            json!({
                "transaction_id": "T-1",
                "store_no": 42,
                "date": "2026-10-15",
                "total_sale_price": null,
                "paid": true,
                "sales": [
                    {"quantity": 2, "unit_price": 3.5},
                    {"quantity": 1, "unit_price": 4}
                ]
            })
        );
    }

    #[test]
    fn null_repeated_field_is_empty_array() {
        let row = json!({"f": [
            {"v": "T-2"}, {"v": null}, {"v": null}, {"v": "12.50"}, {"v": null}, {"v": null}
        ]});
        let got = decode_row(&schema(), &row).unwrap();
        assert_eq!(got["sales"], json!([]));
        assert_eq!(got["total_sale_price"], json!("12.50"));
    }

    #[test]
    fn cell_count_mismatch_is_decode_error() {
        let err = decode_row(&schema(), &json!({"f": [{"v": "x"}]})).unwrap_err();
        assert_eq!(err.kind, txsync_core::StoreErrorKind::Decode);
    }

    #[test]
    fn endpoint_escapes_segments() {
        let url = endpoint("http://localhost:9/", &["v1", "docs", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9/v1/docs/a%2Fb%20c");
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let url = endpoint("http://localhost:9/proxy", &["bigquery", "v2"]).unwrap();
        assert_eq!(url.path(), "/proxy/bigquery/v2");
    }
}
