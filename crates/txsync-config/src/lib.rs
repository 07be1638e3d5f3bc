//! txsync-config
//!
//! Single source of truth for invocation settings.
//!
//! # Contract
//! - Settings come from environment variables only. Binaries may preload
//!   `.env.local` through `dotenvy`; this crate never touches files.
//! - Callers resolve once per invocation (`resolve_from_env`) and pass the
//!   resulting [`SyncConfig`] into constructors; no other crate reads
//!   `std::env` for these keys.
//! - `Debug` and [`SyncConfig::to_redacted_json`] never print the access
//!   token or the database URL.
//!
//! # Required
//! `BQ_PROJECT`, `BQ_DATASET`, `BQ_TABLE`. The first missing one is reported
//! as `"<NAME> environment variable is not set."`.

use serde_json::{json, Value};
use txsync_core::{StoreCoordinates, StreamingBufferPredicate, SyncError, TableSchema};

// ---------------------------------------------------------------------------
// Variable names
// ---------------------------------------------------------------------------

pub const ENV_PROJECT: &str = "BQ_PROJECT";
pub const ENV_DATASET: &str = "BQ_DATASET";
pub const ENV_TABLE: &str = "BQ_TABLE";

pub const ENV_BACKEND: &str = "TXSYNC_BACKEND";
pub const ENV_DATABASE_URL: &str = "TXSYNC_DATABASE_URL";
pub const ENV_MIRROR: &str = "TXSYNC_MIRROR";

pub const ENV_FIRESTORE_PROJECT: &str = "FIRESTORE_PROJECT";
pub const ENV_FIRESTORE_DATABASE: &str = "FIRESTORE_DATABASE";

pub const ENV_ACCESS_TOKEN: &str = "GCP_ACCESS_TOKEN";
pub const ENV_BIGQUERY_BASE_URL: &str = "BQ_API_BASE_URL";
pub const ENV_FIRESTORE_BASE_URL: &str = "FIRESTORE_API_BASE_URL";
pub const ENV_METADATA_BASE_URL: &str = "GCP_METADATA_BASE_URL";

pub const ENV_ID_COLUMN: &str = "TXSYNC_ID_COLUMN";
pub const ENV_DATE_COLUMN: &str = "TXSYNC_DATE_COLUMN";
pub const ENV_TOTAL_COLUMN: &str = "TXSYNC_TOTAL_COLUMN";
pub const ENV_LINE_ITEMS_COLUMN: &str = "TXSYNC_LINE_ITEMS_COLUMN";
pub const ENV_QUANTITY_FIELD: &str = "TXSYNC_QUANTITY_FIELD";
pub const ENV_UNIT_PRICE_FIELD: &str = "TXSYNC_UNIT_PRICE_FIELD";

pub const ENV_STREAMING_MARKER: &str = "TXSYNC_STREAMING_BUFFER_MARKER";
pub const ENV_STREAMING_MATCH_CASE: &str = "TXSYNC_STREAMING_BUFFER_MATCH_CASE";

pub const DEFAULT_FIRESTORE_DATABASE: &str = "(default)";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} environment variable is not set.")]
    Missing { name: &'static str },
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        SyncError::Configuration(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimaryBackend {
    BigQuery,
    Postgres,
}

impl PrimaryBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimaryBackend::BigQuery => "bigquery",
            PrimaryBackend::Postgres => "postgres",
        }
    }

    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bigquery" | "bq" => Ok(PrimaryBackend::BigQuery),
            "postgres" | "pg" => Ok(PrimaryBackend::Postgres),
            other => Err(ConfigError::Invalid {
                name: ENV_BACKEND,
                reason: format!("'{other}'; expected one of: bigquery | postgres"),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MirrorBackend {
    Off,
    Firestore,
    Postgres,
}

impl MirrorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorBackend::Off => "off",
            MirrorBackend::Firestore => "firestore",
            MirrorBackend::Postgres => "postgres",
        }
    }

    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "" => Ok(MirrorBackend::Off),
            "firestore" => Ok(MirrorBackend::Firestore),
            "postgres" | "pg" => Ok(MirrorBackend::Postgres),
            other => Err(ConfigError::Invalid {
                name: ENV_MIRROR,
                reason: format!("'{other}'; expected one of: off | firestore | postgres"),
            }),
        }
    }
}

/// Google Cloud endpoints and credentials.
#[derive(Clone, Default)]
pub struct GcpSettings {
    /// Static bearer token. `None` means "ask the metadata server".
    pub access_token: Option<String>,
    pub bigquery_base_url: Option<String>,
    pub firestore_base_url: Option<String>,
    pub metadata_base_url: Option<String>,
    pub firestore_project: String,
    pub firestore_database: String,
}

impl std::fmt::Debug for GcpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpSettings")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("bigquery_base_url", &self.bigquery_base_url)
            .field("firestore_base_url", &self.firestore_base_url)
            .field("metadata_base_url", &self.metadata_base_url)
            .field("firestore_project", &self.firestore_project)
            .field("firestore_database", &self.firestore_database)
            .finish()
    }
}

/// Everything one invocation needs. Built once, passed by reference.
#[derive(Clone)]
pub struct SyncConfig {
    pub coordinates: StoreCoordinates,
    pub schema: TableSchema,
    pub predicate: StreamingBufferPredicate,
    pub backend: PrimaryBackend,
    pub mirror: MirrorBackend,
    /// Required when either backend is Postgres.
    pub database_url: Option<String>,
    pub gcp: GcpSettings,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("coordinates", &self.coordinates)
            .field("schema", &self.schema)
            .field("predicate", &self.predicate)
            .field("backend", &self.backend)
            .field("mirror", &self.mirror)
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .field("gcp", &self.gcp)
            .finish()
    }
}

impl SyncConfig {
    /// Operator-facing view with secrets replaced by presence flags.
    pub fn to_redacted_json(&self) -> Value {
        json!({
            "coordinates": {
                "project": self.coordinates.project,
                "dataset": self.coordinates.dataset,
                "table": self.coordinates.table,
            },
            "schema": {
                "id_column": self.schema.id_column,
                "date_column": self.schema.date_column,
                "total_column": self.schema.total_column,
                "line_items_column": self.schema.line_items_column,
                "quantity_field": self.schema.quantity_field,
                "unit_price_field": self.schema.unit_price_field,
            },
            "streaming_buffer": {
                "marker": self.predicate.marker(),
                "match_case": self.predicate.match_case(),
            },
            "backend": self.backend.as_str(),
            "mirror": self.mirror.as_str(),
            "database_url_set": self.database_url.is_some(),
            "gcp": {
                "access_token_set": self.gcp.access_token.is_some(),
                "bigquery_base_url": self.gcp.bigquery_base_url,
                "firestore_base_url": self.gcp.firestore_base_url,
                "metadata_base_url": self.gcp.metadata_base_url,
                "firestore_project": self.gcp.firestore_project,
                "firestore_database": self.gcp.firestore_database,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve from the process environment.
pub fn resolve_from_env() -> Result<SyncConfig, ConfigError> {
    resolve_with(|name| std::env::var(name).ok())
}

/// Resolve through an arbitrary lookup. Blank values count as unset.
pub fn resolve_with<F>(lookup: F) -> Result<SyncConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| -> Option<String> {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let require = |name: &'static str| get(name).ok_or(ConfigError::Missing { name });

    let coordinates = StoreCoordinates::new(
        require(ENV_PROJECT)?,
        require(ENV_DATASET)?,
        require(ENV_TABLE)?,
    );

    let defaults = TableSchema::default();
    let column = |name: &'static str, default: &str| -> Result<String, ConfigError> {
        let value = get(name).unwrap_or_else(|| default.to_string());
        if txsync_core::is_plain_identifier(&value) {
            Ok(value)
        } else {
            Err(ConfigError::Invalid {
                name,
                reason: format!("'{value}' is not a plain identifier"),
            })
        }
    };
    let schema = TableSchema {
        id_column: column(ENV_ID_COLUMN, &defaults.id_column)?,
        date_column: column(ENV_DATE_COLUMN, &defaults.date_column)?,
        total_column: column(ENV_TOTAL_COLUMN, &defaults.total_column)?,
        line_items_column: column(ENV_LINE_ITEMS_COLUMN, &defaults.line_items_column)?,
        quantity_field: column(ENV_QUANTITY_FIELD, &defaults.quantity_field)?,
        unit_price_field: column(ENV_UNIT_PRICE_FIELD, &defaults.unit_price_field)?,
    };

    // The marker is not trimmed: surrounding spaces may be significant.
    let default_predicate = StreamingBufferPredicate::default();
    let marker = lookup(ENV_STREAMING_MARKER)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default_predicate.marker().to_string());
    let match_case = match get(ENV_STREAMING_MATCH_CASE) {
        None => default_predicate.match_case(),
        Some(v) => parse_bool(ENV_STREAMING_MATCH_CASE, &v)?,
    };
    let predicate = StreamingBufferPredicate::new(marker, match_case);

    let backend = match get(ENV_BACKEND) {
        None => PrimaryBackend::BigQuery,
        Some(v) => PrimaryBackend::parse(&v)?,
    };
    let mirror = match get(ENV_MIRROR) {
        None => MirrorBackend::Off,
        Some(v) => MirrorBackend::parse(&v)?,
    };

    let database_url = get(ENV_DATABASE_URL);
    let needs_db = backend == PrimaryBackend::Postgres || mirror == MirrorBackend::Postgres;
    if needs_db && database_url.is_none() {
        return Err(ConfigError::Missing {
            name: ENV_DATABASE_URL,
        });
    }

    let gcp = GcpSettings {
        access_token: get(ENV_ACCESS_TOKEN),
        bigquery_base_url: get(ENV_BIGQUERY_BASE_URL),
        firestore_base_url: get(ENV_FIRESTORE_BASE_URL),
        metadata_base_url: get(ENV_METADATA_BASE_URL),
        firestore_project: get(ENV_FIRESTORE_PROJECT)
            .unwrap_or_else(|| coordinates.project.clone()),
        firestore_database: get(ENV_FIRESTORE_DATABASE)
            .unwrap_or_else(|| DEFAULT_FIRESTORE_DATABASE.to_string()),
    };

    Ok(SyncConfig {
        coordinates,
        schema,
        predicate,
        backend,
        mirror,
        database_url,
        gcp,
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("'{other}' is not a boolean"),
        }),
    }
}
