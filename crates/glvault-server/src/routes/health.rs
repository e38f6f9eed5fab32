//! Health check route: `GET /health`.
//!
//! Unauthenticated. Probes the storage backend with a `list` call and
//! degrades to 503 if the backend is unreachable.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Server version, taken from the crate's own `Cargo.toml` at compile time.
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_ms: u128,
    storage: &'static str,
    keys_registered: usize,
}

/// Build the unauthenticated `/health` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let uptime_ms = state.started_at.elapsed().as_millis();

    match state.store.list().await {
        Ok(keys) => Json(HealthResponse {
            status: "ok",
            version: VERSION,
            uptime_ms,
            storage: "connected",
            keys_registered: keys.len(),
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check: storage backend unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    version: VERSION,
                    uptime_ms,
                    storage: "disconnected",
                    keys_registered: 0,
                }),
            )
                .into_response()
        }
    }
}
