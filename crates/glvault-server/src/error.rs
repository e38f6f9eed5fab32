//! HTTP error types for the `glvault` server.
//!
//! Maps domain errors from `glvault-core` into the HTTP response contract.
//! Every error variant produces a JSON body with a machine-readable `error`
//! field and a human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use glvault_core::{AuthError, RelayError, StoreError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid input (bad JSON, failed alias regex, etc).
    BadRequest(String),
    /// Relay or admin authentication failed.
    Unauthenticated(String),
    /// Requested alias does not exist.
    NotFound(String),
    /// `register` was called with an alias that is already taken.
    AlreadyExists(String),
    /// The per-alias quota was exhausted for the current window.
    RateLimited { retry_after_ms: i64 },
    /// The upstream API could not be reached or timed out.
    UpstreamFail(String),
    /// A stored credential failed its integrity check on decryption.
    IntegrityFail,
    /// An unexpected internal or storage failure occurred.
    Internal(String),
}

/// Standard error body: `{error, message}`.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Error body for `RATE_LIMITED`, which additionally carries a retry hint.
#[derive(Serialize)]
struct RateLimitedBody {
    error: &'static str,
    message: String,
    retry_after_ms: i64,
    remaining: u64,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(msg) => error_response(StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
            Self::Unauthenticated(msg) => error_response(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg),
            Self::NotFound(msg) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::AlreadyExists(msg) => error_response(StatusCode::CONFLICT, "ALREADY_EXISTS", msg),
            Self::RateLimited { retry_after_ms } => {
                let body = RateLimitedBody {
                    error: "RATE_LIMITED",
                    message: "Rate limit exceeded".to_owned(),
                    retry_after_ms,
                    remaining: 0,
                };
                (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
            }
            Self::UpstreamFail(msg) => error_response(StatusCode::BAD_GATEWAY, "UPSTREAM_FAIL", msg),
            Self::IntegrityFail => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTEGRITY_FAIL",
                "credential integrity check failed".to_owned(),
            ),
            Self::Internal(msg) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "BACKEND_FAIL", msg),
        }
    }
}

fn error_response(status: StatusCode, error: &'static str, message: String) -> Response {
    (status, Json(ErrorBody { error, message })).into_response()
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        Self::Unauthenticated(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidAlias { .. } => Self::BadRequest(err.to_string()),
            StoreError::AlreadyExists { .. } => Self::AlreadyExists(err.to_string()),
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::Crypto(glvault_core::CryptoError::IntegrityFail) => Self::IntegrityFail,
            StoreError::Crypto(_) | StoreError::Storage(_) | StoreError::Serialization { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Unauthenticated(inner) => Self::Unauthenticated(inner.to_string()),
            RelayError::UnknownAlias { .. } => Self::NotFound(err.to_string()),
            RelayError::RateLimited { retry_after_ms } => Self::RateLimited { retry_after_ms },
            RelayError::IntegrityFail => Self::IntegrityFail,
            RelayError::UpstreamFail { reason } => Self::UpstreamFail(reason),
            RelayError::Internal { reason } => Self::Internal(reason),
        }
    }
}
