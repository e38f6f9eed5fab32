//! Shared scaffolding for `glvault-server` integration tests.
//!
//! Builds a full [`axum::Router`] over an in-memory storage backend so
//! tests can drive real HTTP requests through `tower::ServiceExt::oneshot`
//! without binding a socket.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glvault_core::auth::canonical_payload;
use glvault_core::crypto::{hex_encode, hmac_sign};
use glvault_core::relay::{default_param_map, RelayConfig};
use glvault_core::{AuditLog, CredentialStore, EncryptionKey, RelayHandler};
use glvault_storage::MemoryBackend;

use glvault_server::state::AppState;

pub const HMAC_SECRET: &[u8] = b"test-hmac-secret";
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Build a router backed by a fresh in-memory store, with `upstream_base_url`
/// (typically a `wiremock::MockServer` URI) reachable as every registered
/// credential's `base_url` default.
pub fn build_app() -> (axum::Router, Arc<AppState>) {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(CredentialStore::new(backend.clone(), test_key(), 60_000));
    let audit = Arc::new(AuditLog::new(backend));

    let relay_config = RelayConfig {
        hmac_secret: HMAC_SECRET.to_vec(),
        max_age_ms: 30_000,
        window_ms: 60_000,
        upstream_timeout: Duration::from_secs(5),
        param_map: default_param_map(),
        nonce_set: None,
    };
    let relay = Arc::new(RelayHandler::new(store.clone(), audit.clone(), relay_config));

    let state = Arc::new(AppState {
        store,
        audit,
        relay,
        admin_token: ADMIN_TOKEN.to_owned(),
        started_at: Instant::now(),
    });

    let router = glvault_server::build_router(state.clone());
    (router, state)
}

fn test_key() -> EncryptionKey {
    EncryptionKey::from_bytes([0u8; 32])
}

/// Sign a relay payload the way a well-behaved client would.
pub fn sign(alias: &str, method: &str, path: &str, timestamp: i64, nonce: &str) -> String {
    let payload = canonical_payload(alias, method, path, &timestamp.to_string(), nonce);
    hex_encode(&hmac_sign(HMAC_SECRET, payload.as_bytes()))
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
