//! Server configuration for `glvault`.
//!
//! Loaded once from environment variables at startup. Every required
//! variable is validated eagerly so misconfiguration fails loudly before
//! the listener binds, rather than surfacing as a mysterious 500 on the
//! first request.

use std::net::SocketAddr;
use std::time::Duration;

use glvault_core::EncryptionKey;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    Memory,
    Redis,
}

/// Server configuration, loaded once at startup via [`Config::from_env`].
pub struct Config {
    pub bind_addr: SocketAddr,
    pub master_key: EncryptionKey,
    pub hmac_secret: Vec<u8>,
    pub admin_token: String,
    pub rate_limit_window_ms: i64,
    pub max_request_age_ms: i64,
    pub log_level: String,
    pub storage: StorageBackendKind,
    pub redis_url: Option<String>,
    pub upstream_timeout: Duration,
    pub extra_param_map: Vec<(String, String)>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("rate_limit_window_ms", &self.rate_limit_window_ms)
            .field("max_request_age_ms", &self.max_request_age_ms)
            .field("log_level", &self.log_level)
            .field("storage", &self.storage)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Environment variables:
    /// - `MASTER_ENCRYPTION_KEY` — 64 hex chars (32 bytes), required
    /// - `HMAC_SECRET` — request-signing secret, required
    /// - `ADMIN_TOKEN` — admin bearer token, required
    /// - `RATE_LIMIT_WINDOW_MS` — quota window duration (default 60000)
    /// - `MAX_REQUEST_AGE_MS` — signature freshness window (default 30000)
    /// - `LOG_LEVEL` — tracing filter (default `info`)
    /// - `GLVAULT_STORAGE` — `memory` or `redis` (default `memory`)
    /// - `GLVAULT_REDIS_URL` — required when `GLVAULT_STORAGE=redis`
    /// - `GLVAULT_BIND_ADDR` — full bind address (overrides `PORT`, default `127.0.0.1:8200`)
    /// - `PORT` — Railway-style convenience override, binds `0.0.0.0:$PORT`
    /// - `UPSTREAM_TIMEOUT_MS` — upstream dispatch timeout (default 10000)
    /// - `EXTRA_PARAM_MAP_JSON` — optional JSON object extending the
    ///   host-suffix to query-param-name table
    ///
    /// # Errors
    ///
    /// Returns an error describing the first missing or malformed required
    /// variable.
    pub fn from_env() -> anyhow::Result<Self> {
        let master_key_hex = std::env::var("MASTER_ENCRYPTION_KEY")
            .map_err(|_| anyhow::anyhow!("MASTER_ENCRYPTION_KEY is required"))?;
        let master_key = parse_master_key(&master_key_hex)?;

        let hmac_secret = std::env::var("HMAC_SECRET")
            .map_err(|_| anyhow::anyhow!("HMAC_SECRET is required"))?
            .into_bytes();

        let admin_token =
            std::env::var("ADMIN_TOKEN").map_err(|_| anyhow::anyhow!("ADMIN_TOKEN is required"))?;

        let rate_limit_window_ms = env_i64("RATE_LIMIT_WINDOW_MS", 60_000);
        let max_request_age_ms = env_i64("MAX_REQUEST_AGE_MS", 30_000);
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        let storage = match std::env::var("GLVAULT_STORAGE")
            .unwrap_or_else(|_| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "redis" => StorageBackendKind::Redis,
            _ => StorageBackendKind::Memory,
        };

        let redis_url = std::env::var("GLVAULT_REDIS_URL").ok();
        if storage == StorageBackendKind::Redis && redis_url.is_none() {
            anyhow::bail!("GLVAULT_REDIS_URL is required when GLVAULT_STORAGE=redis");
        }

        let bind_addr = if let Ok(addr) = std::env::var("GLVAULT_BIND_ADDR") {
            addr.parse()
                .map_err(|e| anyhow::anyhow!("GLVAULT_BIND_ADDR is not a valid socket address: {e}"))?
        } else if let Ok(port_str) = std::env::var("PORT") {
            let port: u16 = port_str
                .parse()
                .map_err(|e| anyhow::anyhow!("PORT is not a valid port number: {e}"))?;
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8200))
        };

        let upstream_timeout = Duration::from_millis(env_u64("UPSTREAM_TIMEOUT_MS", 10_000));

        let extra_param_map = match std::env::var("EXTRA_PARAM_MAP_JSON") {
            Ok(raw) => {
                let parsed: std::collections::HashMap<String, String> = serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("EXTRA_PARAM_MAP_JSON is not valid JSON: {e}"))?;
                parsed.into_iter().collect()
            }
            Err(_) => Vec::new(),
        };

        Ok(Self {
            bind_addr,
            master_key,
            hmac_secret,
            admin_token,
            rate_limit_window_ms,
            max_request_age_ms,
            log_level,
            storage,
            redis_url,
            upstream_timeout,
            extra_param_map,
        })
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Decode `MASTER_ENCRYPTION_KEY` from hex, requiring exactly 32 bytes.
fn parse_master_key(hex_str: &str) -> anyhow::Result<EncryptionKey> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| anyhow::anyhow!("MASTER_ENCRYPTION_KEY is not valid hex: {e}"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("MASTER_ENCRYPTION_KEY must decode to 32 bytes, got {}", v.len()))?;
    Ok(EncryptionKey::from_bytes(bytes))
}
