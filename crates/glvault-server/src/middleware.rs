//! Admin authentication middleware for `glvault`.
//!
//! Validates the `Authorization: Bearer <token>` header on every admin
//! route against the configured admin token. Relay requests (`/proxy`)
//! carry their own HMAC signature and are verified inside the relay
//! handler instead — this middleware only guards `/keys/*`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use glvault_core::auth;

use crate::error::AppError;
use crate::state::AppState;

/// Middleware enforcing the admin bearer token on `/keys/*` routes.
pub async fn admin_auth(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth::verify_admin(header, &state.admin_token) {
        Ok(()) => next.run(req).await,
        Err(err) => AppError::from(err).into_response(),
    }
}
