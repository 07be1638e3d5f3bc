//! txsync-daemon entry point.
//!
//! Thin on purpose: tracing, shared state, middleware, serve. Handlers live
//! in `routes.rs`; state types in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use txsync_daemon::{routes, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    // Configuration is resolved per request, not here: a bad environment
    // still boots and answers every trigger with the configuration error.
    let shared = Arc::new(state::AppState::new());

    let app = routes::build_router(Arc::clone(&shared)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = bind_addr_from_env();
    info!("txsync-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// TXSYNC_DAEMON_ADDR, else 0.0.0.0:$PORT, else 0.0.0.0:8080.
fn bind_addr_from_env() -> SocketAddr {
    if let Some(addr) = std::env::var("TXSYNC_DAEMON_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        return addr;
    }
    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// Ctrl-C, or SIGTERM from the container runtime.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
