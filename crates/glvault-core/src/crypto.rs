//! Cryptographic primitives for `glvault`.
//!
//! Provides AES-256-GCM authenticated encryption with detached
//! ciphertext/iv/tag fields (so each can be stored and serialized
//! independently, per the credential record's data model), HMAC-SHA-256
//! signing and sub-key derivation, and constant-time comparison helpers.
//! All key material is zeroized on drop.
//!
//! # Security model
//!
//! - Every encryption generates a fresh 96-bit (12-byte) IV via `OsRng`.
//! - The authentication tag (16 bytes) is verified before any plaintext is
//!   released; on mismatch, decryption fails with [`CryptoError::IntegrityFail`].
//! - Sub-keys are derived as `HMAC-SHA-256(master_key, context)` — a plain
//!   keyed MAC, not HKDF, matching the derivation the credential store
//!   calls for.
//! - All secret comparisons (signature tag, admin token) use
//!   [`subtle::ConstantTimeEq`]; a length mismatch is reported as "not
//!   equal" without short-circuiting before the constant-time compare runs.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Length of the AES-256-GCM IV, in bytes (96 bits).
pub const IV_LEN: usize = 12;

/// Length of the AES-256-GCM authentication tag, in bytes.
pub const TAG_LEN: usize = 16;

/// A 256-bit symmetric key, zeroized on drop.
///
/// Used as the master encryption key and for derived sub-keys. The inner
/// bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Build a key from exactly 32 raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    ///
    /// Use with care — the caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The detached output of [`encrypt`]: ciphertext, IV, and authentication
/// tag stored as three independent byte buffers, matching the
/// `CredentialRecord` data model.
#[derive(Debug, Clone)]
pub struct Sealed {
    /// The encrypted payload (same length as the plaintext).
    pub ciphertext: Vec<u8>,
    /// The random IV used for this encryption.
    pub iv: Vec<u8>,
    /// The 16-byte authentication tag.
    pub tag: [u8; TAG_LEN],
}

/// Encrypt `plaintext` under `key` using AES-256-GCM with a fresh random IV.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Sealed, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut combined = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    // aes-gcm appends the 16-byte tag to the end of the ciphertext.
    if combined.len() < TAG_LEN {
        return Err(CryptoError::Encryption {
            reason: "ciphertext shorter than tag".to_owned(),
        });
    }
    let tag_bytes = combined.split_off(combined.len() - TAG_LEN);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);

    Ok(Sealed {
        ciphertext: combined,
        iv: nonce.to_vec(),
        tag,
    })
}

/// Decrypt a [`Sealed`] value produced by [`encrypt`].
///
/// The authentication tag is verified before any plaintext is released.
///
/// # Errors
///
/// Returns [`CryptoError::Malformed`] if the IV is not [`IV_LEN`] bytes.
///
/// Returns [`CryptoError::IntegrityFail`] if authentication fails (wrong
/// key, corrupted ciphertext, or a tampered tag).
pub fn decrypt(key: &EncryptionKey, sealed: &Sealed) -> Result<Vec<u8>, CryptoError> {
    if sealed.iv.len() != IV_LEN {
        return Err(CryptoError::Malformed {
            reason: format!("iv must be {IV_LEN} bytes, got {}", sealed.iv.len()),
        });
    }

    let nonce = Nonce::from_slice(&sealed.iv);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);

    cipher
        .decrypt(nonce, combined.as_slice())
        .map_err(|_| CryptoError::IntegrityFail)
}

/// Derive a deterministic 32-byte sub-key: `HMAC-SHA-256(master_key, context)`.
///
/// Used only where explicitly called for (e.g. operator-configured
/// per-alias key isolation); the default relay pipeline does not invoke
/// this.
///
/// # Errors
///
/// Never fails in practice — HMAC-SHA-256 accepts any key length — but
/// returns [`CryptoError::Encryption`] if key construction somehow fails,
/// so callers are not forced to `unwrap`.
pub fn derive_sub_key(
    master_key: &EncryptionKey,
    context: &[u8],
) -> Result<EncryptionKey, CryptoError> {
    let mut mac =
        HmacSha256::new_from_slice(master_key.as_bytes()).map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;
    mac.update(context);
    let result = mac.finalize().into_bytes();
    let mut derived = [0u8; 32];
    derived.copy_from_slice(&result);
    Ok(EncryptionKey::from_bytes(derived))
}

/// Compute the HMAC-SHA-256 tag of `payload` under `secret`, returned raw.
#[must_use]
pub fn hmac_sign(secret: &[u8], payload: &[u8]) -> [u8; 32] {
    #[allow(clippy::expect_used)]
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC-SHA-256 accepts any key length");
    mac.update(payload);
    let result = mac.finalize().into_bytes();
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&result);
    tag
}

/// Render a 32-byte MAC tag as 64 lowercase hex characters.
#[must_use]
pub fn hex_encode(tag: &[u8]) -> String {
    hex::encode(tag)
}

/// Constant-time equality check for secret-bearing byte strings.
///
/// A length mismatch is reported as "not equal" without short-circuiting:
/// both inputs are compared byte-for-byte against a fixed-size buffer so
/// that the comparison cost does not leak which input was shorter. This is
/// used for signature verification and admin-token comparison.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len_eq = (a.len() as u64).ct_eq(&(b.len() as u64));

    // Always run the byte comparison over equal-size padded buffers, even
    // when the lengths differ, so the rejection path does not short-circuit
    // before a constant-time compare has run.
    let max_len = a.len().max(b.len());
    let mut padded_a = vec![0u8; max_len];
    let mut padded_b = vec![0u8; max_len];
    padded_a[..a.len()].copy_from_slice(a);
    padded_b[..b.len()].copy_from_slice(b);
    let content_eq = padded_a.ct_eq(&padded_b);

    bool::from(len_eq & content_eq)
}

/// Generate a cryptographically random token, rendered as lowercase hex.
///
/// Used for audit entry IDs and nonces. `byte_len` of 16 yields 128 bits
/// of randomness (32 hex characters).
#[must_use]
pub fn random_token_hex(byte_len: usize) -> String {
    use rand::RngCore;
    let mut bytes = vec![0u8; byte_len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
