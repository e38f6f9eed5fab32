//! Storage backend abstraction for `glvault`.
//!
//! This crate defines the [`StorageBackend`] trait — a pure key-value storage
//! interface that knows nothing about aliases, credentials, or encryption.
//! Everything it sees is already an opaque octet string; the credential
//! store and audit log in `glvault-core` are responsible for serializing
//! and encrypting whatever they hand to this layer.
//!
//! Two implementations are provided:
//!
//! - [`MemoryBackend`] — in-memory, for development and tests.
//! - [`RedisBackend`] — a networked key-value service, for production
//!   (feature `redis-backend`, enabled by default).

mod error;
mod memory;
#[cfg(feature = "redis-backend")]
mod redis_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisBackend;

/// Reserved key namespace for all `glvault` storage keys.
pub const NAMESPACE: &str = "glvault:";

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings under the reserved `glvault:` namespace (e.g.
/// `glvault:key:weather`, `glvault:audit:weather:<id>`). Values are opaque
/// byte arrays — in practice JSON-serialized records.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`)
/// and need not offer read-your-writes consistency across concurrent
/// callers beyond what their backing store provides.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, unconditionally overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. This is idempotent — deleting a non-existent key is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys that start with the given prefix.
    ///
    /// Need not be consistent with concurrent writes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Scan`] if the underlying backend fails.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
