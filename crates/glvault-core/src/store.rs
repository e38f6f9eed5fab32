//! Encrypted credential store.
//!
//! Owns every [`CredentialRecord`] and the [`AliasIndex`] kept in the
//! storage backend. No other component reads or writes the `glvault:key:*`
//! or `glvault:index` keys directly — everything goes through the typed
//! methods on [`CredentialStore`].

use std::sync::Arc;

use chrono::Utc;
use glvault_storage::StorageBackend;
use serde::{Deserialize, Serialize};

use crate::crypto::{self, EncryptionKey, Sealed};
use crate::error::{CryptoError, StoreError};

const KEY_PREFIX: &str = "glvault:key:";
const INDEX_KEY: &str = "glvault:index";

/// Default quota ceiling applied when `register` omits `quota_limit`.
pub const DEFAULT_QUOTA_LIMIT: u64 = 1000;

/// Default owner label applied when `register` omits `owner`.
pub const DEFAULT_OWNER: &str = "admin";

/// Default rolling-window duration for quota accounting, in milliseconds.
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

/// The stored unit, one per alias.
///
/// `ciphertext`, `iv`, and `auth_tag` are the hex-encoded outputs of
/// authenticated encryption of the raw credential under the master key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// ASCII `[A-Za-z0-9_-]{1,64}` identifier, unique across the store.
    pub alias: String,
    /// Hex-encoded AES-256-GCM ciphertext.
    pub ciphertext: String,
    /// Hex-encoded 12-byte IV.
    pub iv: String,
    /// Hex-encoded 16-byte authentication tag.
    pub auth_tag: String,
    /// Absolute URL (scheme + host, optional path prefix) of the upstream API.
    pub base_url: String,
    /// Maximum number of permitted relays per rolling window.
    pub quota_limit: u64,
    /// Current window's relay count.
    pub quota_used: u64,
    /// Unix-ms of the current window's opening.
    pub quota_window_start: i64,
    /// Unix-ms of registration.
    pub created_at: i64,
    /// Unix-ms of the most recent rotation, if any.
    pub rotated_at: Option<i64>,
    /// Free-form provenance identifier; not used for authorization.
    pub owner: String,
}

impl CredentialRecord {
    fn sealed(&self) -> Result<Sealed, StoreError> {
        let ciphertext = hex::decode(&self.ciphertext).map_err(|e| StoreError::Serialization {
            reason: format!("bad ciphertext hex: {e}"),
        })?;
        let iv = hex::decode(&self.iv).map_err(|e| StoreError::Serialization {
            reason: format!("bad iv hex: {e}"),
        })?;
        let tag_bytes = hex::decode(&self.auth_tag).map_err(|e| StoreError::Serialization {
            reason: format!("bad auth_tag hex: {e}"),
        })?;
        let tag: [u8; crypto::TAG_LEN] =
            tag_bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Serialization {
                    reason: "auth_tag is not 16 bytes".to_owned(),
                })?;
        Ok(Sealed {
            ciphertext,
            iv,
            tag,
        })
    }
}

/// A projection of [`CredentialRecord`] with secret fields stripped, as
/// returned by [`CredentialStore::list`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialMetadata {
    pub alias: String,
    pub base_url: String,
    pub quota_limit: u64,
    pub quota_used: u64,
    pub quota_window_start: i64,
    pub created_at: i64,
    pub rotated_at: Option<i64>,
    pub owner: String,
}

impl From<&CredentialRecord> for CredentialMetadata {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            alias: record.alias.clone(),
            base_url: record.base_url.clone(),
            quota_limit: record.quota_limit,
            quota_used: record.quota_used,
            quota_window_start: record.quota_window_start,
            created_at: record.created_at,
            rotated_at: record.rotated_at,
            owner: record.owner.clone(),
        }
    }
}

/// Outcome of [`CredentialStore::increment_usage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDecision {
    /// Whether the relay is permitted to proceed.
    pub allowed: bool,
    /// Remaining relays permitted in the current window (0 if denied).
    pub remaining: u64,
}

/// Validate an alias against `[A-Za-z0-9_-]{1,64}`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidAlias`] if the alias is empty, longer than
/// 64 bytes, or contains a character outside the allowed set.
pub fn validate_alias(alias: &str) -> Result<(), StoreError> {
    let is_valid = !alias.is_empty()
        && alias.len() <= 64
        && alias
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');

    if is_valid {
        Ok(())
    } else {
        Err(StoreError::InvalidAlias {
            alias: alias.to_owned(),
        })
    }
}

/// The encrypted credential store.
///
/// Holds no in-process mutable state of its own: every read and write goes
/// through the storage backend, so multiple `CredentialStore` handles over
/// the same backend observe the same data.
pub struct CredentialStore {
    backend: Arc<dyn StorageBackend>,
    master_key: EncryptionKey,
    window_ms: i64,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("window_ms", &self.window_ms)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Build a credential store over `backend`, using `master_key` for all
    /// encryption and `window_ms` as the quota rolling-window duration.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, master_key: EncryptionKey, window_ms: i64) -> Self {
        Self {
            backend,
            master_key,
            window_ms,
        }
    }

    fn key_for(alias: &str) -> String {
        format!("{KEY_PREFIX}{alias}")
    }

    async fn load(&self, alias: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let raw = self.backend.get(&Self::key_for(alias)).await?;
        match raw {
            None => Ok(None),
            Some(bytes) => {
                let record: CredentialRecord =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
                        reason: e.to_string(),
                    })?;
                Ok(Some(record))
            }
        }
    }

    async fn persist(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        self.backend.set(&Self::key_for(&record.alias), &bytes).await?;
        Ok(())
    }

    async fn load_index(&self) -> Result<Vec<String>, StoreError> {
        let raw = self.backend.get(INDEX_KEY).await?;
        match raw {
            None => Ok(Vec::new()),
            Some(bytes) => {
                let aliases: Vec<String> =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
                        reason: e.to_string(),
                    })?;
                Ok(aliases)
            }
        }
    }

    async fn persist_index(&self, aliases: &[String]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(aliases).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        self.backend.set(INDEX_KEY, &bytes).await?;
        Ok(())
    }

    /// Register a new credential under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidAlias`] if the alias fails validation,
    /// or [`StoreError::AlreadyExists`] if the alias is already registered.
    pub async fn register(
        &self,
        alias: &str,
        plaintext_credential: &str,
        base_url: &str,
        quota_limit: Option<u64>,
        owner: Option<String>,
    ) -> Result<CredentialRecord, StoreError> {
        validate_alias(alias)?;

        if self.load(alias).await?.is_some() {
            return Err(StoreError::AlreadyExists {
                alias: alias.to_owned(),
            });
        }

        let sealed = crypto::encrypt(&self.master_key, plaintext_credential.as_bytes())?;
        let now = Utc::now().timestamp_millis();

        let record = CredentialRecord {
            alias: alias.to_owned(),
            ciphertext: hex::encode(&sealed.ciphertext),
            iv: hex::encode(&sealed.iv),
            auth_tag: hex::encode(sealed.tag),
            base_url: base_url.to_owned(),
            quota_limit: quota_limit.unwrap_or(DEFAULT_QUOTA_LIMIT),
            quota_used: 0,
            quota_window_start: now,
            created_at: now,
            rotated_at: None,
            owner: owner.unwrap_or_else(|| DEFAULT_OWNER.to_owned()),
        };

        self.persist(&record).await?;

        let mut aliases = self.load_index().await?;
        if !aliases.iter().any(|a| a == alias) {
            aliases.push(alias.to_owned());
            self.persist_index(&aliases).await?;
        }

        Ok(record)
    }

    /// Decrypt and return the plaintext credential for `alias`.
    ///
    /// Returns `Ok(None)` if the alias is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Crypto`] (wrapping [`CryptoError::IntegrityFail`])
    /// if the stored ciphertext fails to decrypt under the current master key.
    pub async fn get_plaintext(&self, alias: &str) -> Result<Option<String>, StoreError> {
        let Some(record) = self.load(alias).await? else {
            return Ok(None);
        };

        let sealed = record.sealed()?;
        let plaintext = crypto::decrypt(&self.master_key, &sealed)
            .map_err(|_| StoreError::Crypto(CryptoError::IntegrityFail))?;
        let plaintext = String::from_utf8(plaintext).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        Ok(Some(plaintext))
    }

    /// Return the record for `alias` without decrypting it.
    ///
    /// Used by the relay handler to read `base_url` and quota fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] or [`StoreError::Serialization`] on
    /// backend or deserialization failure.
    pub async fn get_record(&self, alias: &str) -> Result<Option<CredentialRecord>, StoreError> {
        self.load(alias).await
    }

    /// Re-encrypt `alias` with a fresh credential and IV.
    ///
    /// Preserves `quota_limit`, `quota_used`, `quota_window_start`,
    /// `created_at`, and `owner`; sets `rotated_at` to now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the alias does not exist.
    pub async fn rotate(
        &self,
        alias: &str,
        new_plaintext_credential: &str,
    ) -> Result<CredentialRecord, StoreError> {
        let mut record = self
            .load(alias)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                alias: alias.to_owned(),
            })?;

        let sealed = crypto::encrypt(&self.master_key, new_plaintext_credential.as_bytes())?;
        record.ciphertext = hex::encode(&sealed.ciphertext);
        record.iv = hex::encode(&sealed.iv);
        record.auth_tag = hex::encode(sealed.tag);
        record.rotated_at = Some(Utc::now().timestamp_millis());

        self.persist(&record).await?;
        Ok(record)
    }

    /// Remove a credential from the store and the alias index.
    ///
    /// Returns `true` if a record was present and deleted, `false` if the
    /// alias was unknown. This is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on backend failure.
    pub async fn remove(&self, alias: &str) -> Result<bool, StoreError> {
        let existed = self.load(alias).await?.is_some();
        if !existed {
            return Ok(false);
        }

        self.backend.delete(&Self::key_for(alias)).await?;

        let mut aliases = self.load_index().await?;
        aliases.retain(|a| a != alias);
        self.persist_index(&aliases).await?;

        Ok(true)
    }

    /// Return a snapshot of every registered credential's metadata, with
    /// secret fields stripped. Order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] or [`StoreError::Serialization`] on
    /// backend or deserialization failure.
    pub async fn list(&self) -> Result<Vec<CredentialMetadata>, StoreError> {
        let aliases = self.load_index().await?;
        let mut out = Vec::with_capacity(aliases.len());
        for alias in &aliases {
            if let Some(record) = self.load(alias).await? {
                out.push(CredentialMetadata::from(&record));
            }
        }
        Ok(out)
    }

    /// Apply a fixed-window quota check-and-increment for `alias`.
    ///
    /// If the current window has expired, resets `quota_used` to 0 and
    /// opens a new window starting now. If the quota is already exhausted,
    /// returns `{allowed: false, remaining: 0}` without mutating the
    /// record. Otherwise increments `quota_used` and persists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the alias is unknown.
    pub async fn increment_usage(&self, alias: &str) -> Result<UsageDecision, StoreError> {
        let mut record = self
            .load(alias)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                alias: alias.to_owned(),
            })?;

        let now = Utc::now().timestamp_millis();
        if now.saturating_sub(record.quota_window_start) > self.window_ms {
            record.quota_used = 0;
            record.quota_window_start = now;
        }

        if record.quota_used >= record.quota_limit {
            return Ok(UsageDecision {
                allowed: false,
                remaining: 0,
            });
        }

        record.quota_used += 1;
        self.persist(&record).await?;

        Ok(UsageDecision {
            allowed: true,
            remaining: record.quota_limit - record.quota_used,
        })
    }
}
