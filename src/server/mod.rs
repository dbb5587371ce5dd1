// src/server/mod.rs

//! HTTP surface: JSON commands plus server-sent-event push channels.

mod error;
mod routes;

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use tokio::net::TcpListener;
use tracing::info;

use crate::engine::EngineHandle;

pub use error::ApiError;

/// Build the application router with all API routes.
pub fn router(handle: EngineHandle) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .with_state(handle)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(bind: SocketAddr, handle: EngineHandle, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    let local = listener.local_addr().unwrap_or(bind);
    info!(addr = %local, "HTTP API listening");

    axum::serve(listener, router(handle))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("HTTP API stopped");
    Ok(())
}
