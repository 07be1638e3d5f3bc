//! txsync-gcp
//!
//! Google Cloud backends over the public REST APIs:
//! - [`BigQueryStore`]: primary store (`jobs.query` / `getQueryResults`)
//! - [`FirestoreMirror`]: mirror store (`documents.patch`)
//!
//! Both speak plain HTTPS through `reqwest`; credentials come from a
//! [`TokenSource`]. Every base URL is overridable so tests can point the
//! clients at a local mock server.

pub mod auth;
pub mod bigquery;
pub mod firestore;
mod wire;

pub use auth::{MetadataServerToken, StaticToken, TokenSource};
pub use bigquery::{BigQueryStore, DEFAULT_BIGQUERY_BASE_URL};
pub use firestore::{encode_value, FirestoreMirror, DEFAULT_FIRESTORE_BASE_URL};
