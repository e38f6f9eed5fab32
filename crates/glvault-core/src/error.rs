//! Error types for `glvault-core`.
//!
//! Each error variant carries enough context to diagnose the problem
//! without a debugger. Crypto errors never include key material or
//! plaintext credentials — only key identifiers or operation descriptions.

use glvault_storage::StorageError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption or tag verification failed — wrong key,
    /// corrupted ciphertext, or a tampered authentication tag.
    #[error("decryption failed: integrity check did not pass")]
    IntegrityFail,

    /// A ciphertext/iv/tag triple was malformed (wrong lengths, bad hex).
    #[error("malformed ciphertext: {reason}")]
    Malformed { reason: String },
}

/// Errors from credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The alias failed the `[A-Za-z0-9_-]{1,64}` validation regex.
    #[error("invalid alias '{alias}': must match [A-Za-z0-9_-]{{1,64}}")]
    InvalidAlias { alias: String },

    /// `register` was called with an alias that already exists.
    #[error("alias already exists: {alias}")]
    AlreadyExists { alias: String },

    /// The requested alias is not registered.
    #[error("alias not found: {alias}")]
    NotFound { alias: String },

    /// A cryptographic operation on the stored credential failed.
    #[error("store crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The underlying storage backend returned an error.
    #[error("store storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored record failed to (de)serialize.
    #[error("store serialization error: {reason}")]
    Serialization { reason: String },
}

/// Errors from relay-request authentication.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The request timestamp is outside the freshness window.
    #[error("request timestamp expired or not yet valid")]
    Stale,

    /// A required field (alias, path, method, nonce) was empty.
    #[error("missing required field")]
    MissingField,

    /// The method was not one of GET, POST, PUT, DELETE.
    #[error("unsupported method")]
    BadMethod,

    /// The signature did not match (length mismatch or value mismatch —
    /// intentionally not distinguished, per the HMAC verification contract).
    #[error("signature verification failed")]
    BadSignature,

    /// The admin `Authorization` header was absent entirely.
    #[error("Missing")]
    AdminMissing,

    /// The admin `Authorization` header was present but not `"Bearer " + token`.
    #[error("Invalid Authorization format")]
    AdminBadScheme,

    /// The admin bearer token did not match the configured token.
    #[error("Invalid admin token")]
    AdminDenied,
}

/// Errors from the relay handler pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Signature or freshness verification failed (terminal state: VERIFY).
    #[error("authentication failed: {0}")]
    Unauthenticated(#[from] AuthError),

    /// The alias is unknown to the credential store.
    #[error("unknown alias: {alias}")]
    UnknownAlias { alias: String },

    /// The per-alias quota has been exhausted for the current window.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Milliseconds until the quota window resets.
        retry_after_ms: i64,
    },

    /// Decryption of the stored credential failed its integrity check.
    #[error("credential integrity check failed")]
    IntegrityFail,

    /// The upstream API could not be reached, or the call timed out.
    #[error("upstream dispatch failed: {reason}")]
    UpstreamFail { reason: String },

    /// An unexpected storage or serialization failure occurred.
    #[error("internal relay error: {reason}")]
    Internal { reason: String },
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { alias } => Self::UnknownAlias { alias },
            StoreError::Crypto(CryptoError::IntegrityFail) => Self::IntegrityFail,
            other => Self::Internal {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors from audit log operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The audit entry failed to serialize.
    #[error("audit serialization failed: {reason}")]
    Serialization { reason: String },

    /// The underlying storage backend returned an error.
    #[error("audit storage error: {0}")]
    Storage(#[from] StorageError),
}
