//! Axum router and handlers for txsync-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers, so tests can use the bare router.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use txsync_runtime::{synchronize_transactions, InvocationOptions};

use crate::{
    api_types::HealthResponse,
    state::{uptime_secs, AppState, LastRun},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(trigger))
        .route("/synchronize_transactions", any(trigger))
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Trigger (any verb, body ignored)
// ---------------------------------------------------------------------------

pub(crate) async fn trigger(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    st.status.write().await.runs_started += 1;

    let config = (st.config_source)();
    let inv =
        synchronize_transactions(config, st.connector.as_ref(), InvocationOptions::default())
            .await;
    let resp = inv.response();

    {
        let mut snap = st.status.write().await;
        if !inv.is_success() {
            snap.runs_failed += 1;
        }
        snap.last_run = Some(LastRun::from_invocation(&inv));
    }

    let code = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, resp.body)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = uptime_secs();
    (StatusCode::OK, Json(snap))
}
