//! Relay route: `POST /proxy`.
//!
//! Extracts the HMAC signature from the `Authorization: Signature <hex>`
//! header, parses the request body, and hands both to
//! [`glvault_core::RelayHandler::handle`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};

use glvault_core::RelayRequest;

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/proxy` router. Authenticated via HMAC signature inside the
/// relay handler, not via the admin bearer middleware.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/proxy", post(relay))
}

fn extract_signature(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Signature "))
        .map(str::to_owned)
}

async fn relay(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<glvault_core::RelayResponse>, AppError> {
    let mut req: RelayRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed request body: {e}")))?;
    req.signature_hex = extract_signature(&headers).unwrap_or_default();

    let response = state.relay.handle(req).await?;
    Ok(Json(response))
}
