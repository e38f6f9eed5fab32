//! Admin routes: `/keys/register`, `/keys/list`, `/keys/rotate`,
//! `/keys/audit`, `DELETE /keys/:alias`.
//!
//! Every route in this module is guarded by the admin bearer-token
//! middleware installed in [`crate::build_router`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use glvault_core::{AuditStats, CredentialMetadata, QueryWindow};

use crate::error::AppError;
use crate::middleware::admin_auth;
use crate::state::AppState;

/// Build the `/keys` router, wrapped in the admin auth middleware.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/keys/register", post(register))
        .route("/keys/list", get(list))
        .route("/keys/rotate", post(rotate))
        .route("/keys/audit", get(audit))
        .route("/keys/{alias}", delete(remove))
        .route_layer(from_fn_with_state(state, admin_auth))
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    alias: String,
    api_key: String,
    base_url: String,
    quota_limit: Option<u64>,
    owner: Option<String>,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<CredentialMetadata>), AppError> {
    let record = state
        .store
        .register(&body.alias, &body.api_key, &body.base_url, body.quota_limit, body.owner)
        .await?;
    Ok((StatusCode::CREATED, Json(CredentialMetadata::from(&record))))
}

#[derive(Debug, Serialize)]
struct ListResponse {
    count: usize,
    keys: Vec<CredentialMetadata>,
}

async fn list(State(state): State<Arc<AppState>>) -> Result<Json<ListResponse>, AppError> {
    let keys = state.store.list().await?;
    Ok(Json(ListResponse { count: keys.len(), keys }))
}

#[derive(Debug, Deserialize)]
struct RotateBody {
    alias: String,
    new_api_key: String,
}

#[derive(Debug, Serialize)]
struct RotateResponse {
    alias: String,
    rotated_at: i64,
}

async fn rotate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RotateBody>,
) -> Result<Json<RotateResponse>, AppError> {
    let record = state.store.rotate(&body.alias, &body.new_api_key).await?;
    let rotated_at = record.rotated_at.unwrap_or(record.created_at);
    Ok(Json(RotateResponse {
        alias: record.alias,
        rotated_at,
    }))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    alias: String,
    since: Option<i64>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AuditResponse {
    alias: String,
    stats: AuditStats,
    entries: Vec<glvault_core::AuditEntry>,
}

async fn audit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditResponse>, AppError> {
    let stats = state.audit.stats(&query.alias, query.since).await.map_err(|e| AppError::Internal(e.to_string()))?;
    let entries = state
        .audit
        .query(
            &query.alias,
            QueryWindow {
                since: query.since,
                until: None,
                limit: query.limit,
            },
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(AuditResponse {
        alias: query.alias,
        stats,
        entries,
    }))
}

#[derive(Debug, Serialize)]
struct RemoveResponse {
    alias: String,
    removed: bool,
}

async fn remove(State(state): State<Arc<AppState>>, Path(alias): Path<String>) -> Result<Json<RemoveResponse>, AppError> {
    let removed = state.store.remove(&alias).await?;
    if removed {
        Ok(Json(RemoveResponse { alias, removed: true }))
    } else {
        Err(AppError::NotFound(format!("alias not found: {alias}")))
    }
}
