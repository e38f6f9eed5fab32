//! Shared application state for the `glvault` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;
use std::time::Instant;

use glvault_core::{AuditLog, CredentialStore, RelayHandler};

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// The encrypted credential store.
    pub store: Arc<CredentialStore>,
    /// The append-only audit log.
    pub audit: Arc<AuditLog>,
    /// The relay handler driving `POST /proxy`.
    pub relay: Arc<RelayHandler>,
    /// The admin bearer token, checked on every `/keys/*` and admin route.
    pub admin_token: String,
    /// When the server process started, for `/health`'s `uptime_ms`.
    pub started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
