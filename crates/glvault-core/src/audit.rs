//! Append-only audit log.
//!
//! Every relay attempt at or after the RATE state is recorded (VERIFY
//! failures are attributable only to the signer and are intentionally not
//! audited). Each alias keeps its own bounded, ordered index of entry ids
//! so that `query` and `stats` can read an alias's history without
//! scanning the whole backend.

use std::sync::Arc;

use chrono::Utc;
use glvault_storage::StorageBackend;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::AuditError;

/// Maximum number of audit entries retained per alias. Once full, the
/// oldest entry is dropped to make room for the newest.
pub const MAX_ENTRIES_PER_ALIAS: usize = 10_000;

/// Default lookback window for [`AuditLog::stats`] when the caller does not
/// specify `since`, in milliseconds (24 hours).
pub const DEFAULT_STATS_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Default page size for [`AuditLog::query`].
pub const DEFAULT_QUERY_LIMIT: usize = 100;

const INDEX_PREFIX: &str = "glvault:audit_index:";

/// A single recorded relay attempt, from RATE onward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Random hex id, unique per entry.
    pub id: String,
    /// The alias this attempt targeted.
    pub alias: String,
    /// Unix-ms of the attempt.
    pub timestamp: i64,
    /// The relayed (or attempted) HTTP method.
    pub method: String,
    /// The relayed (or attempted) upstream path.
    pub path: String,
    /// The outcome status: the upstream HTTP status on a completed dispatch,
    /// or a synthetic code (429 rate-limited, 502 dispatch failure, 500
    /// internal) for earlier terminal states.
    pub status: u16,
    /// A human-readable error description, present on any `status >= 400`.
    pub error: Option<String>,
    /// Elapsed wall time for the handler, in milliseconds.
    pub latency_ms: i64,
}

/// Optional filters for [`AuditLog::query`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    /// Inclusive lower bound on `timestamp`. Defaults to 0.
    pub since: Option<i64>,
    /// Inclusive upper bound on `timestamp`. Defaults to "now".
    pub until: Option<i64>,
    /// Maximum number of entries to return. Defaults to
    /// [`DEFAULT_QUERY_LIMIT`].
    pub limit: Option<usize>,
}

/// One entry in a per-alias [`AuditLog`] index: an entry id paired with its
/// creation timestamp. This is the wire shape persisted at
/// `glvault:audit_index:<alias>` — bit-exact per spec's interoperability
/// requirement, so a replacement implementation can read it without
/// consulting this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditIndexEntry {
    id: String,
    ts: i64,
}

/// Aggregate counters for an alias's audit history, over a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total_requests: u64,
    pub error_count: u64,
    pub avg_latency_ms: i64,
    /// Unix-ms of the most recent entry in the window, or `None` if empty.
    pub last_accessed: Option<i64>,
}

/// The append-only audit log.
pub struct AuditLog {
    backend: Arc<dyn StorageBackend>,
    max_per_alias: usize,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Build an audit log over the given storage backend, retaining up to
    /// [`MAX_ENTRIES_PER_ALIAS`] entries per alias.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_capacity(backend, MAX_ENTRIES_PER_ALIAS)
    }

    /// Build an audit log with a caller-chosen per-alias cap. Exposed for
    /// tests; production code should use [`AuditLog::new`].
    #[must_use]
    pub fn with_capacity(backend: Arc<dyn StorageBackend>, max_per_alias: usize) -> Self {
        Self {
            backend,
            max_per_alias,
        }
    }

    fn entry_key(alias: &str, id: &str) -> String {
        format!("glvault:audit:{alias}:{id}")
    }

    fn index_key(alias: &str) -> String {
        format!("{INDEX_PREFIX}{alias}")
    }

    async fn load_index(&self, alias: &str) -> Result<Vec<AuditIndexEntry>, AuditError> {
        let raw = self.backend.get(&Self::index_key(alias)).await?;
        match raw {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| AuditError::Serialization {
                reason: e.to_string(),
            }),
        }
    }

    async fn persist_index(&self, alias: &str, entries: &[AuditIndexEntry]) -> Result<(), AuditError> {
        let bytes = serde_json::to_vec(entries).map_err(|e| AuditError::Serialization {
            reason: e.to_string(),
        })?;
        self.backend.set(&Self::index_key(alias), &bytes).await?;
        Ok(())
    }

    async fn load_entries(&self, alias: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let index = self.load_index(alias).await?;
        let mut entries = Vec::with_capacity(index.len());
        for indexed in &index {
            if let Some(bytes) = self.backend.get(&Self::entry_key(alias, &indexed.id)).await? {
                let entry: AuditEntry = serde_json::from_slice(&bytes).map_err(|e| AuditError::Serialization {
                    reason: e.to_string(),
                })?;
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Append a new entry for `alias`, evicting the oldest entry for that
    /// alias if the per-alias cap is exceeded.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] on backend failure or
    /// [`AuditError::Serialization`] if the entry cannot be serialized.
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        alias: &str,
        method: &str,
        path: &str,
        status: u16,
        error: Option<String>,
        latency_ms: i64,
    ) -> Result<AuditEntry, AuditError> {
        let entry = AuditEntry {
            id: crypto::random_token_hex(16),
            alias: alias.to_owned(),
            timestamp: Utc::now().timestamp_millis(),
            method: method.to_owned(),
            path: path.to_owned(),
            status,
            error,
            latency_ms,
        };

        let bytes = serde_json::to_vec(&entry).map_err(|e| AuditError::Serialization {
            reason: e.to_string(),
        })?;
        self.backend.set(&Self::entry_key(alias, &entry.id), &bytes).await?;

        let mut index = self.load_index(alias).await?;
        index.push(AuditIndexEntry {
            id: entry.id.clone(),
            ts: entry.timestamp,
        });
        if index.len() > self.max_per_alias {
            let evicted = index.remove(0);
            self.backend.delete(&Self::entry_key(alias, &evicted.id)).await?;
        }
        self.persist_index(alias, &index).await?;

        Ok(entry)
    }

    /// Return entries for `alias` within `window`, most-recent-first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] or [`AuditError::Serialization`] on
    /// backend or deserialization failure.
    pub async fn query(&self, alias: &str, window: QueryWindow) -> Result<Vec<AuditEntry>, AuditError> {
        let since = window.since.unwrap_or(0);
        let until = window.until.unwrap_or_else(|| Utc::now().timestamp_millis());
        let limit = window.limit.unwrap_or(DEFAULT_QUERY_LIMIT);

        let mut entries = self.load_entries(alias).await?;
        entries.retain(|e| e.timestamp >= since && e.timestamp <= until);
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Compute aggregate counters for `alias` over `[since, now]`.
    ///
    /// `since` defaults to `now - `[`DEFAULT_STATS_WINDOW_MS`] when `None`.
    /// An entry counts as an error when `status >= 400`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] or [`AuditError::Serialization`] on
    /// backend or deserialization failure.
    pub async fn stats(&self, alias: &str, since: Option<i64>) -> Result<AuditStats, AuditError> {
        let now = Utc::now().timestamp_millis();
        let since = since.unwrap_or(now - DEFAULT_STATS_WINDOW_MS);

        let entries = self.load_entries(alias).await?;
        let windowed: Vec<&AuditEntry> = entries.iter().filter(|e| e.timestamp >= since && e.timestamp <= now).collect();

        if windowed.is_empty() {
            return Ok(AuditStats::default());
        }

        let total_requests = windowed.len() as u64;
        let error_count = windowed.iter().filter(|e| e.status >= 400).count() as u64;
        let latency_sum: i64 = windowed.iter().map(|e| e.latency_ms).sum();
        #[allow(clippy::cast_possible_wrap)]
        let avg_latency_ms = {
            let count = windowed.len() as i64;
            (latency_sum + count / 2) / count
        };
        let last_accessed = windowed.iter().map(|e| e.timestamp).max();

        Ok(AuditStats {
            total_requests,
            error_count,
            avg_latency_ms,
            last_accessed,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use glvault_storage::MemoryBackend;

    fn log() -> AuditLog {
        AuditLog::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn append_then_query_returns_newest_first() {
        let log = log();
        log.append("x", "GET", "/a", 200, None, 12).await.unwrap();
        log.append("x", "GET", "/b", 429, Some("Rate limit exceeded".into()), 1)
            .await
            .unwrap();

        let entries = log.query("x", QueryWindow::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/b");
        assert_eq!(entries[1].path, "/a");
    }

    #[tokio::test]
    async fn query_respects_limit() {
        let log = log();
        for i in 0..5 {
            log.append("x", "GET", &format!("/{i}"), 200, None, 1).await.unwrap();
        }
        let entries = log
            .query(
                "x",
                QueryWindow {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/4");
        assert_eq!(entries[1].path, "/3");
    }

    #[tokio::test]
    async fn query_filters_by_since_and_until() {
        let log = log();
        log.append("x", "GET", "/a", 200, None, 1).await.unwrap();
        let entries = log.query("x", QueryWindow::default()).await.unwrap();
        let mid = entries[0].timestamp;

        log.append("x", "GET", "/b", 200, None, 1).await.unwrap();

        let only_first = log
            .query(
                "x",
                QueryWindow {
                    until: Some(mid),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(only_first.len(), 1);
        assert_eq!(only_first[0].path, "/a");
    }

    #[tokio::test]
    async fn query_is_scoped_per_alias() {
        let log = log();
        log.append("x", "GET", "/a", 200, None, 1).await.unwrap();
        log.append("y", "GET", "/b", 200, None, 1).await.unwrap();

        assert_eq!(log.query("x", QueryWindow::default()).await.unwrap().len(), 1);
        assert_eq!(log.query("y", QueryWindow::default()).await.unwrap().len(), 1);
        assert_eq!(log.query("z", QueryWindow::default()).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn stats_counts_errors_and_averages_latency() {
        let log = log();
        log.append("x", "GET", "/a", 200, None, 10).await.unwrap();
        log.append("x", "GET", "/a", 200, None, 20).await.unwrap();
        log.append("x", "GET", "/a", 500, Some("boom".into()), 30).await.unwrap();

        let stats = log.stats("x", None).await.unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.avg_latency_ms, 20); // (10+20+30)/3 = 20
        assert!(stats.last_accessed.is_some());
    }

    #[tokio::test]
    async fn stats_on_empty_alias_is_all_zero() {
        let log = log();
        let stats = log.stats("nope", None).await.unwrap();
        assert_eq!(stats, AuditStats::default());
        assert!(stats.last_accessed.is_none());
    }

    #[tokio::test]
    async fn stats_since_excludes_older_entries() {
        let log = log();
        log.append("x", "GET", "/a", 200, None, 5).await.unwrap();
        let cutoff = Utc::now().timestamp_millis() + 1;
        log.append("x", "GET", "/b", 200, None, 5).await.unwrap();

        let stats = log.stats("x", Some(cutoff)).await.unwrap();
        assert_eq!(stats.total_requests, 1);
    }

    #[tokio::test]
    async fn append_beyond_cap_evicts_oldest() {
        let log = AuditLog::with_capacity(Arc::new(MemoryBackend::new()), 3);
        let alias = "capped";
        for i in 0..5 {
            log.append(alias, "GET", &format!("/{i}"), 200, None, 1).await.unwrap();
        }
        let ids = log.load_index(alias).await.unwrap();
        assert_eq!(ids.len(), 3);

        let entries = log
            .query(
                alias,
                QueryWindow {
                    limit: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(entries.first().unwrap().path, "/4");
        assert_eq!(entries.last().unwrap().path, "/2");
    }
}
