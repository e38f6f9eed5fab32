//! Redis storage backend — the production default.
//!
//! Wraps an async multiplexed `redis` connection behind the
//! [`StorageBackend`] trait. Prefix scanning uses cursor-based `SCAN` rather
//! than `KEYS`, since `KEYS` blocks the server for the duration of the scan.
//!
//! Key namespacing and encryption happen above this layer (in the
//! credential store and audit log). This backend treats keys as opaque
//! UTF-8 strings and values as opaque bytes.

use redis::AsyncCommands;
use tracing::debug;

use crate::{StorageBackend, StorageError};

/// A storage backend backed by a Redis-compatible service.
///
/// Uses a single multiplexed connection internally, so it is cheap to clone
/// and safe to share across async tasks without an external pool.
#[derive(Clone)]
pub struct RedisBackend {
    conn: redis::aio::MultiplexedConnection,
    url: String,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("url", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connect to a Redis-compatible service at the given URL
    /// (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection cannot be
    /// established.
    pub async fn connect(url: impl Into<String>) -> Result<Self, StorageError> {
        let url = url.into();
        let client = redis::Client::open(url.clone()).map_err(|e| StorageError::Open {
            target: url.clone(),
            reason: e.to_string(),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StorageError::Open {
                target: url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { conn, url })
    }

    /// The Redis connection URL this backend was opened with.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| StorageError::Read {
            key: key.to_owned(),
            reason: e.to_string(),
        })
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let () = conn
            .set(key, value)
            .await
            .map_err(|e| StorageError::Write {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await.map_err(|e| StorageError::Delete {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Scan {
                    prefix: prefix.to_owned(),
                    reason: e.to_string(),
                })?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(prefix, count = keys.len(), "redis scan complete");
        Ok(keys)
    }
}
