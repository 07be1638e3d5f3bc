//! Record model shared by every store backend.
//!
//! Backends decode their rows into a JSON object first (BigQuery `f/v` rows,
//! Postgres `to_jsonb(t)`), then [`Record::from_row`] pulls out the typed
//! fields. The raw object is kept so the mirror can write the full record.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::store::StoreError;

// ---------------------------------------------------------------------------
// TableSchema
// ---------------------------------------------------------------------------

/// Physical column / field names of the transactions table.
///
/// Names are spliced into SQL as identifiers (values are always bound as
/// parameters), so every name must pass [`is_plain_identifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub id_column: String,
    pub date_column: String,
    pub total_column: String,
    /// Repeated record column holding the line items.
    pub line_items_column: String,
    pub quantity_field: String,
    pub unit_price_field: String,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            id_column: "transaction_id".to_string(),
            date_column: "date".to_string(),
            total_column: "total_sale_price".to_string(),
            line_items_column: "sales".to_string(),
            quantity_field: "quantity".to_string(),
            unit_price_field: "unit_price".to_string(),
        }
    }
}

impl TableSchema {
    /// Returns the first name that is not a plain identifier, if any.
    pub fn first_invalid_name(&self) -> Option<&str> {
        [
            &self.id_column,
            &self.date_column,
            &self.total_column,
            &self.line_items_column,
            &self.quantity_field,
            &self.unit_price_field,
        ]
        .into_iter()
        .find(|name| !is_plain_identifier(name))
        .map(String::as_str)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, at most 128 bytes.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// Store-defined record identifier. Comparison is type-appropriate: text ids
/// match as strings, integer ids as integers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordId {
    Text(String),
    Int(i64),
}

impl RecordId {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RecordId::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RecordId::Text(s) => Value::String(s.clone()),
            RecordId::Int(n) => Value::from(*n),
        }
    }

    /// SQL literal form, used only for human-readable statement previews.
    ///
    /// Text ids are single-quoted with `\` and `'` backslash-escaped
    /// (GoogleSQL string literal rules); integer ids are bare.
    pub fn sql_literal(&self) -> String {
        match self {
            RecordId::Int(n) => n.to_string(),
            RecordId::Text(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '\'' => out.push_str("\\'"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        other => out.push(other),
                    }
                }
                out.push('\'');
                out
            }
        }
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Text(s)
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Text(s) => f.write_str(s),
            RecordId::Int(n) => write!(f, "{n}"),
        }
    }
}

// ---------------------------------------------------------------------------
// LineItem
// ---------------------------------------------------------------------------

/// One sale entry. A field is `None` when it was absent or not numeric;
/// the aggregator reports that as a data-integrity failure.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LineItem {
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
}

impl LineItem {
    pub fn new(quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            quantity: Some(quantity),
            unit_price: Some(unit_price),
        }
    }

    fn from_json(value: &Value, schema: &TableSchema) -> Self {
        match value {
            Value::Object(obj) => Self {
                quantity: obj.get(&schema.quantity_field).and_then(decimal_from_json),
                unit_price: obj
                    .get(&schema.unit_price_field)
                    .and_then(decimal_from_json),
            },
            _ => Self::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One transaction pending aggregation.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub date: Option<NaiveDate>,
    pub derived_total: Option<Decimal>,
    /// `None` when the column was absent or null.
    pub line_items: Option<Vec<LineItem>>,
    /// Full decoded row, kept in sync with `derived_total`.
    pub row: Map<String, Value>,
    total_key: String,
}

impl Record {
    /// Decode a row object using the physical names in `schema`.
    pub fn from_row(row: Map<String, Value>, schema: &TableSchema) -> Result<Self, StoreError> {
        let id = row
            .get(&schema.id_column)
            .and_then(RecordId::from_json)
            .ok_or_else(|| {
                StoreError::decode(format!(
                    "row has no string or integer '{}' column",
                    schema.id_column
                ))
            })?;

        let date = row
            .get(&schema.date_column)
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

        let derived_total = row.get(&schema.total_column).and_then(decimal_from_json);

        let line_items = match row.get(&schema.line_items_column) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| LineItem::from_json(item, schema))
                    .collect(),
            ),
            Some(_) => {
                return Err(StoreError::decode(format!(
                    "transaction {id}: '{}' is not a repeated field",
                    schema.line_items_column
                )))
            }
        };

        Ok(Self {
            id,
            date,
            derived_total,
            line_items,
            row,
            total_key: schema.total_column.clone(),
        })
    }

    /// Build a record directly (tests, fakes). The row carries only the id,
    /// date and total columns from the default schema.
    pub fn new(id: RecordId, date: Option<NaiveDate>, line_items: Option<Vec<LineItem>>) -> Self {
        let schema = TableSchema::default();
        let mut row = Map::new();
        row.insert(schema.id_column.clone(), id.to_json());
        if let Some(d) = date {
            row.insert(
                schema.date_column.clone(),
                Value::String(d.format("%Y-%m-%d").to_string()),
            );
        }
        row.insert(schema.total_column.clone(), Value::Null);
        Self {
            id,
            date,
            derived_total: None,
            line_items,
            row,
            total_key: schema.total_column,
        }
    }

    /// Record the total written to the store, in both the typed field and
    /// the raw row that the mirror serializes.
    pub fn set_derived_total(&mut self, total: Decimal) {
        self.derived_total = Some(total);
        self.row.insert(self.total_key.clone(), decimal_to_json(total));
    }

    /// The full record as a JSON object.
    pub fn to_document(&self) -> Value {
        Value::Object(self.row.clone())
    }
}

// ---------------------------------------------------------------------------
// Decimal <-> JSON
// ---------------------------------------------------------------------------

/// Accepts JSON numbers and numeric strings (BigQuery REST encodes NUMERIC and
/// FLOAT64 as strings).
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// JSON number when representable, otherwise the decimal string.
pub fn decimal_to_json(value: Decimal) -> Value {
    let text = value.normalize().to_string();
    match text.parse::<serde_json::Number>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(text),
    }
}
