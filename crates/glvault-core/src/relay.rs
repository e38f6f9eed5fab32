//! The relay handler: the `POST /proxy` state machine.
//!
//! `VERIFY -> RATE -> DECRYPT -> DISPATCH -> SANITIZE -> AUDIT`. Each step's
//! failure is a terminal state that determines both the response and the
//! audit outcome. VERIFY failures are never audited — they are
//! attributable only to the request signer. Every step at or after RATE
//! always produces exactly one audit entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditLog;
use crate::auth::{self, NonceSeenSet, RelayRequestAuth};
use crate::error::{AuthError, RelayError};
use crate::store::CredentialStore;

/// Default upstream dispatch timeout, in milliseconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 10_000;

const ALLOWED_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// The four host-suffix -> query-param-name entries every deployment must
/// provide, per the upstream credential-injection contract.
#[must_use]
pub fn default_param_map() -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(4);
    map.insert("openweathermap.org".to_owned(), "appid".to_owned());
    map.insert("newsapi.org".to_owned(), "apiKey".to_owned());
    map.insert("alphavantage.co".to_owned(), "apikey".to_owned());
    map.insert("googleapis.com".to_owned(), "key".to_owned());
    map
}

/// Fallback query parameter name when no host suffix in the map matches.
pub const DEFAULT_PARAM_NAME: &str = "api_key";

fn lookup_param_name(base_url: &str, map: &HashMap<String, String>) -> String {
    let host = url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default();

    map.iter()
        .find(|(suffix, _)| host == **suffix || host.ends_with(&format!(".{suffix}")))
        .map(|(_, param)| param.clone())
        .unwrap_or_else(|| DEFAULT_PARAM_NAME.to_owned())
}

/// An incoming relay request, as parsed by the HTTP layer from the
/// `POST /proxy` body and the `Authorization: Signature <hex>` header.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayRequest {
    pub alias: String,
    pub method: String,
    pub path: String,
    pub timestamp: i64,
    pub nonce: String,
    #[serde(skip)]
    pub signature_hex: String,
    /// Request body, forwarded as JSON when `method != GET`.
    pub body: Option<Value>,
    /// Extra headers to overlay on the base forwarded set.
    pub headers: Option<HashMap<String, String>>,
}

/// The sanitized response returned to the caller. Matches the caller-facing
/// contract exactly — no upstream header or credential ever appears here.
#[derive(Debug, Clone, Serialize)]
pub struct RelayResponse {
    pub status: u16,
    pub data: Value,
    pub cached: bool,
    pub latency_ms: i64,
    pub remaining_quota: u64,
}

/// Configuration for a [`RelayHandler`] instance.
pub struct RelayConfig {
    pub hmac_secret: Vec<u8>,
    pub max_age_ms: i64,
    pub window_ms: i64,
    pub upstream_timeout: Duration,
    pub param_map: HashMap<String, String>,
    pub nonce_set: Option<Arc<NonceSeenSet>>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            hmac_secret: Vec::new(),
            max_age_ms: auth::DEFAULT_MAX_REQUEST_AGE_MS,
            window_ms: crate::store::DEFAULT_WINDOW_MS,
            upstream_timeout: Duration::from_millis(DEFAULT_UPSTREAM_TIMEOUT_MS),
            param_map: default_param_map(),
            nonce_set: None,
        }
    }
}

/// Drives one `POST /proxy` request through the relay state machine.
pub struct RelayHandler {
    store: Arc<CredentialStore>,
    audit: Arc<AuditLog>,
    http: reqwest::Client,
    config: RelayConfig,
}

impl std::fmt::Debug for RelayHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHandler").finish_non_exhaustive()
    }
}

impl RelayHandler {
    /// Build a relay handler over the given store, audit log, and config.
    ///
    /// # Panics
    ///
    /// Never panics; the internal `reqwest::Client` is built with no
    /// fallible configuration.
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, audit: Arc<AuditLog>, config: RelayConfig) -> Self {
        let http = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            store,
            audit,
            http,
            config,
        }
    }

    /// Run the full VERIFY -> RATE -> DECRYPT -> DISPATCH -> SANITIZE ->
    /// AUDIT pipeline for one request.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] variant describing the terminal state; the
    /// HTTP layer maps each variant to its documented status code.
    pub async fn handle(&self, req: RelayRequest) -> Result<RelayResponse, RelayError> {
        let start = Instant::now();

        // VERIFY
        let timestamp_str = req.timestamp.to_string();
        let auth_req = RelayRequestAuth {
            alias: &req.alias,
            method: &req.method,
            path: &req.path,
            timestamp: &timestamp_str,
            nonce: &req.nonce,
            signature_hex: &req.signature_hex,
        };
        let now_ms = Utc::now().timestamp_millis();
        auth::verify_relay_request(&auth_req, &self.config.hmac_secret, now_ms, self.config.max_age_ms)
            .map_err(RelayError::Unauthenticated)?;

        if let Some(nonce_set) = &self.config.nonce_set {
            if !nonce_set.check_and_insert(&req.alias, &req.nonce) {
                return Err(RelayError::Unauthenticated(AuthError::BadSignature));
            }
        }

        // RATE
        let usage = match self.store.increment_usage(&req.alias).await {
            Ok(usage) => usage,
            Err(err) => {
                let relay_err: RelayError = err.into();
                self.audit_terminal(&req, &relay_err, start).await;
                return Err(relay_err);
            }
        };

        if !usage.allowed {
            let err = RelayError::RateLimited {
                retry_after_ms: self.config.window_ms,
            };
            self.audit_terminal(&req, &err, start).await;
            return Err(err);
        }

        // DECRYPT
        let record = match self.store.get_record(&req.alias).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let err = RelayError::UnknownAlias {
                    alias: req.alias.clone(),
                };
                self.audit_terminal(&req, &err, start).await;
                return Err(err);
            }
            Err(err) => {
                let relay_err: RelayError = err.into();
                self.audit_terminal(&req, &relay_err, start).await;
                return Err(relay_err);
            }
        };

        let credential = match self.store.get_plaintext(&req.alias).await {
            Ok(Some(plaintext)) => plaintext,
            Ok(None) => {
                let err = RelayError::UnknownAlias {
                    alias: req.alias.clone(),
                };
                self.audit_terminal(&req, &err, start).await;
                return Err(err);
            }
            Err(err) => {
                let relay_err: RelayError = err.into();
                self.audit_terminal(&req, &relay_err, start).await;
                return Err(relay_err);
            }
        };

        // DISPATCH
        let param_name = lookup_param_name(&record.base_url, &self.config.param_map);
        let dispatch = self
            .dispatch_upstream(&record.base_url, &req, &credential, &param_name)
            .await;

        let (upstream_status, data) = match dispatch {
            Ok(pair) => pair,
            Err(err) => {
                self.audit_terminal(&req, &err, start).await;
                return Err(err);
            }
        };

        // SANITIZE
        let latency_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
        let response = RelayResponse {
            status: upstream_status,
            data,
            cached: false,
            latency_ms,
            remaining_quota: usage.remaining,
        };

        // AUDIT
        let error = if upstream_status >= 400 {
            Some(format!("upstream returned status {upstream_status}"))
        } else {
            None
        };
        self.append_audit(&req.alias, &req.method, &req.path, upstream_status, error, latency_ms)
            .await;

        tracing::info!(
            alias = %req.alias,
            status = upstream_status,
            latency_ms,
            "relay completed"
        );

        Ok(response)
    }

    async fn dispatch_upstream(
        &self,
        base_url: &str,
        req: &RelayRequest,
        credential: &str,
        param_name: &str,
    ) -> Result<(u16, Value), RelayError> {
        let mut url = join_base_and_path(base_url, &req.path).map_err(|reason| RelayError::Internal { reason })?;
        url.query_pairs_mut().append_pair(param_name, credential);

        let method: reqwest::Method = req
            .method
            .parse()
            .map_err(|_| RelayError::Internal {
                reason: format!("unsupported method: {}", req.method),
            })?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::USER_AGENT, reqwest::header::HeaderValue::from_static("glvault-relay/1"));
        headers.insert(reqwest::header::ACCEPT, reqwest::header::HeaderValue::from_static("application/json"));

        if let Some(extra_headers) = &req.headers {
            for (name, value) in extra_headers {
                let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    RelayError::Internal {
                        reason: format!("invalid header name '{name}': {e}"),
                    }
                })?;
                let header_value = reqwest::header::HeaderValue::from_str(value).map_err(|e| RelayError::Internal {
                    reason: format!("invalid header value for '{name}': {e}"),
                })?;
                headers.insert(header_name, header_value);
            }
        }

        let mut builder = self
            .http
            .request(method, url)
            .timeout(self.config.upstream_timeout)
            .headers(headers);

        if req.method != "GET" {
            if let Some(body) = &req.body {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await.map_err(|e| RelayError::UpstreamFail {
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        let data = if is_json {
            response.json::<Value>().await.unwrap_or(Value::Null)
        } else {
            let text = response.text().await.unwrap_or_default();
            Value::String(text)
        };

        Ok((status, data))
    }

    async fn audit_terminal(&self, req: &RelayRequest, err: &RelayError, start: Instant) {
        let latency_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
        let (status, message) = terminal_status(err);

        if matches!(err, RelayError::IntegrityFail) {
            tracing::error!(alias = %req.alias, "credential integrity check failed on decrypt");
        } else {
            tracing::warn!(alias = %req.alias, status, "relay rejected: {message}");
        }

        self.append_audit(&req.alias, &req.method, &req.path, status, Some(message), latency_ms)
            .await;
    }

    async fn append_audit(&self, alias: &str, method: &str, path: &str, status: u16, error: Option<String>, latency_ms: i64) {
        if let Err(e) = self.audit.append(alias, method, path, status, error, latency_ms).await {
            tracing::warn!(alias, error = %e, "failed to write audit entry");
        }
    }
}

fn terminal_status(err: &RelayError) -> (u16, String) {
    match err {
        RelayError::Unauthenticated(_) => (401, err.to_string()),
        RelayError::UnknownAlias { .. } => (404, err.to_string()),
        RelayError::RateLimited { .. } => (429, "Rate limit exceeded".to_owned()),
        RelayError::IntegrityFail => (500, err.to_string()),
        RelayError::UpstreamFail { .. } => (502, err.to_string()),
        RelayError::Internal { .. } => (500, err.to_string()),
    }
}

fn join_base_and_path(base_url: &str, path: &str) -> Result<url::Url, String> {
    let base = url::Url::parse(base_url).map_err(|e| format!("invalid base_url: {e}"))?;
    let trimmed_base = base.as_str().trim_end_matches('/');
    let trimmed_path = path.strip_prefix('/').unwrap_or(path);
    let joined = format!("{trimmed_base}/{trimmed_path}");
    url::Url::parse(&joined).map_err(|e| format!("invalid joined url: {e}"))
}
