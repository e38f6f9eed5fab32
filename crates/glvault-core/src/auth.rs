//! Request authentication: HMAC signature verification for relay calls and
//! bearer-token verification for admin calls.
//!
//! Relay requests are signed over a canonical payload built from five
//! fields joined by `:`. Nothing here inspects the request body — only the
//! fields named in the canonical payload are authenticated.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::crypto;
use crate::error::AuthError;

/// Maximum age, in milliseconds, a `timestamp` may differ from "now" and
/// still be accepted. Applies in both directions (clock skew tolerance).
pub const DEFAULT_MAX_REQUEST_AGE_MS: i64 = 30_000;

const ALLOWED_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// The fields a relay request presents for authentication, as extracted
/// from request headers by the HTTP layer.
#[derive(Debug, Clone)]
pub struct RelayRequestAuth<'a> {
    pub alias: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub timestamp: &'a str,
    pub nonce: &'a str,
    pub signature_hex: &'a str,
}

/// Build the canonical payload `alias:method:path:timestamp:nonce` that a
/// client signs (and the server re-computes) for a relay request.
#[must_use]
pub fn canonical_payload(alias: &str, method: &str, path: &str, timestamp: &str, nonce: &str) -> String {
    format!("{alias}:{method}:{path}:{timestamp}:{nonce}")
}

/// Verify a relay request's HMAC signature and timestamp freshness against
/// `hmac_secret` and the given `now_ms`.
///
/// Checks run in the order the canonical payload is built in: freshness,
/// then field presence, then method, then signature.
///
/// # Errors
///
/// - [`AuthError::Stale`] if `timestamp` does not parse as an integer, or
///   parses but lies outside `now_ms +/- max_age_ms`.
/// - [`AuthError::MissingField`] if any of `alias`, `path`, `method`,
///   `nonce`, or `signature_hex` is empty.
/// - [`AuthError::BadMethod`] if `method` is not GET, POST, PUT, or DELETE.
/// - [`AuthError::BadSignature`] if the supplied signature does not match
///   the HMAC-SHA-256 tag of the canonical payload.
pub fn verify_relay_request(
    req: &RelayRequestAuth<'_>,
    hmac_secret: &[u8],
    now_ms: i64,
    max_age_ms: i64,
) -> Result<(), AuthError> {
    let timestamp: i64 = req.timestamp.parse().map_err(|_| AuthError::Stale)?;
    if (now_ms - timestamp).abs() > max_age_ms {
        return Err(AuthError::Stale);
    }

    if req.alias.is_empty()
        || req.path.is_empty()
        || req.method.is_empty()
        || req.nonce.is_empty()
        || req.signature_hex.is_empty()
    {
        return Err(AuthError::MissingField);
    }

    if !ALLOWED_METHODS.contains(&req.method) {
        return Err(AuthError::BadMethod);
    }

    let payload = canonical_payload(req.alias, req.method, req.path, req.timestamp, req.nonce);
    let expected = crypto::hmac_sign(hmac_secret, payload.as_bytes());
    let expected_hex = crypto::hex_encode(&expected);

    if crypto::constant_time_eq(expected_hex.as_bytes(), req.signature_hex.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::BadSignature)
    }
}

/// Verify an admin `Authorization` header against the configured
/// `admin_token`.
///
/// `header` is the raw header value, not yet stripped of its scheme — this
/// function distinguishes a missing header from a non-`Bearer` scheme from a
/// `Bearer` token that simply doesn't match, so each can be reported with
/// its own message.
///
/// # Errors
///
/// - [`AuthError::AdminMissing`] if `header` is absent.
/// - [`AuthError::AdminBadScheme`] if `header` is present but not of the
///   form `"Bearer " + token` (a single space after `Bearer`).
/// - [`AuthError::AdminDenied`] if the scheme is correct but the token does
///   not match `admin_token` under constant-time comparison.
pub fn verify_admin(header: Option<&str>, admin_token: &str) -> Result<(), AuthError> {
    let Some(header) = header else {
        return Err(AuthError::AdminMissing);
    };

    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err(AuthError::AdminBadScheme);
    };

    if crypto::constant_time_eq(token.as_bytes(), admin_token.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::AdminDenied)
    }
}

/// A bounded, in-memory record of recently seen `(alias, nonce)` pairs.
///
/// Opt-in replay defense: rejecting a reused nonce is a stronger guarantee
/// than timestamp freshness alone, at the cost of bounded false negatives
/// once the window fills. Capacity is fixed at construction; the oldest
/// entry is evicted once the set is full.
pub struct NonceSeenSet {
    seen: Mutex<(VecDeque<String>, std::collections::HashSet<String>)>,
    capacity: usize,
}

impl NonceSeenSet {
    /// Build a set retaining at most `capacity` recent nonces.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new((VecDeque::with_capacity(capacity), std::collections::HashSet::with_capacity(capacity))),
            capacity,
        }
    }

    fn key(alias: &str, nonce: &str) -> String {
        format!("{alias}\u{0}{nonce}")
    }

    /// Record `(alias, nonce)` if not already present.
    ///
    /// Returns `true` if this is the first time the pair has been seen
    /// (the caller should proceed), `false` if it was already recorded
    /// (the caller should reject as a replay).
    #[allow(clippy::unwrap_used)]
    pub fn check_and_insert(&self, alias: &str, nonce: &str) -> bool {
        let key = Self::key(alias, nonce);
        let mut guard = self.seen.lock().unwrap();
        let (order, set) = &mut *guard;

        if set.contains(&key) {
            return false;
        }

        if order.len() >= self.capacity {
            if let Some(evicted) = order.pop_front() {
                set.remove(&evicted);
            }
        }

        order.push_back(key.clone());
        set.insert(key);
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"hmac-secret";

    fn sign(alias: &str, method: &str, path: &str, timestamp: &str, nonce: &str) -> String {
        let payload = canonical_payload(alias, method, path, timestamp, nonce);
        crypto::hex_encode(&crypto::hmac_sign(SECRET, payload.as_bytes()))
    }

    #[test]
    fn valid_signature_and_fresh_timestamp_passes() {
        let now = 1_700_000_000_000;
        let ts = now.to_string();
        let sig = sign("weather", "GET", "/data", &ts, "nonce-1");
        let req = RelayRequestAuth {
            alias: "weather",
            method: "GET",
            path: "/data",
            timestamp: &ts,
            nonce: "nonce-1",
            signature_hex: &sig,
        };
        assert!(verify_relay_request(&req, SECRET, now, DEFAULT_MAX_REQUEST_AGE_MS).is_ok());
    }

    #[test]
    fn tampered_path_fails_signature() {
        let now = 1_700_000_000_000;
        let ts = now.to_string();
        let sig = sign("weather", "GET", "/data", &ts, "nonce-1");
        let req = RelayRequestAuth {
            alias: "weather",
            method: "GET",
            path: "/other",
            timestamp: &ts,
            nonce: "nonce-1",
            signature_hex: &sig,
        };
        let err = verify_relay_request(&req, SECRET, now, DEFAULT_MAX_REQUEST_AGE_MS).unwrap_err();
        assert_eq!(err, AuthError::BadSignature);
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let now = 1_700_000_000_000;
        let old_ts = (now - DEFAULT_MAX_REQUEST_AGE_MS - 1).to_string();
        let sig = sign("weather", "GET", "/data", &old_ts, "nonce-1");
        let req = RelayRequestAuth {
            alias: "weather",
            method: "GET",
            path: "/data",
            timestamp: &old_ts,
            nonce: "nonce-1",
            signature_hex: &sig,
        };
        let err = verify_relay_request(&req, SECRET, now, DEFAULT_MAX_REQUEST_AGE_MS).unwrap_err();
        assert_eq!(err, AuthError::Stale);
    }

    #[test]
    fn future_timestamp_within_skew_passes() {
        let now = 1_700_000_000_000;
        let ts = (now + DEFAULT_MAX_REQUEST_AGE_MS / 2).to_string();
        let sig = sign("weather", "GET", "/data", &ts, "nonce-1");
        let req = RelayRequestAuth {
            alias: "weather",
            method: "GET",
            path: "/data",
            timestamp: &ts,
            nonce: "nonce-1",
            signature_hex: &sig,
        };
        assert!(verify_relay_request(&req, SECRET, now, DEFAULT_MAX_REQUEST_AGE_MS).is_ok());
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let now = 1_700_000_000_000;
        let ts = now.to_string();
        let sig = sign("weather", "PATCH", "/data", &ts, "nonce-1");
        let req = RelayRequestAuth {
            alias: "weather",
            method: "PATCH",
            path: "/data",
            timestamp: &ts,
            nonce: "nonce-1",
            signature_hex: &sig,
        };
        let err = verify_relay_request(&req, SECRET, now, DEFAULT_MAX_REQUEST_AGE_MS).unwrap_err();
        assert_eq!(err, AuthError::BadMethod);
    }

    #[test]
    fn empty_nonce_is_missing_field() {
        let now = 1_700_000_000_000;
        let ts = now.to_string();
        let sig = sign("weather", "GET", "/data", &ts, "");
        let req = RelayRequestAuth {
            alias: "weather",
            method: "GET",
            path: "/data",
            timestamp: &ts,
            nonce: "",
            signature_hex: &sig,
        };
        let err = verify_relay_request(&req, SECRET, now, DEFAULT_MAX_REQUEST_AGE_MS).unwrap_err();
        assert_eq!(err, AuthError::MissingField);
    }

    #[test]
    fn empty_method_is_missing_field() {
        let now = 1_700_000_000_000;
        let ts = now.to_string();
        let sig = sign("weather", "", "/data", &ts, "nonce-1");
        let req = RelayRequestAuth {
            alias: "weather",
            method: "",
            path: "/data",
            timestamp: &ts,
            nonce: "nonce-1",
            signature_hex: &sig,
        };
        let err = verify_relay_request(&req, SECRET, now, DEFAULT_MAX_REQUEST_AGE_MS).unwrap_err();
        assert_eq!(err, AuthError::MissingField);
    }

    #[test]
    fn non_numeric_timestamp_is_stale() {
        let sig = sign("weather", "GET", "/data", "not-a-number", "nonce-1");
        let req = RelayRequestAuth {
            alias: "weather",
            method: "GET",
            path: "/data",
            timestamp: "not-a-number",
            nonce: "nonce-1",
            signature_hex: &sig,
        };
        let err = verify_relay_request(&req, SECRET, 1_700_000_000_000, DEFAULT_MAX_REQUEST_AGE_MS).unwrap_err();
        assert_eq!(err, AuthError::Stale);
    }

    #[test]
    fn admin_token_match_passes() {
        assert!(verify_admin(Some("Bearer s3cret"), "s3cret").is_ok());
    }

    #[test]
    fn admin_token_mismatch_fails() {
        assert_eq!(
            verify_admin(Some("Bearer wrong"), "s3cret").unwrap_err(),
            AuthError::AdminDenied
        );
    }

    #[test]
    fn admin_header_missing_fails() {
        assert_eq!(verify_admin(None, "s3cret").unwrap_err(), AuthError::AdminMissing);
    }

    #[test]
    fn admin_header_non_bearer_scheme_fails() {
        assert_eq!(
            verify_admin(Some("Basic xyz"), "s3cret").unwrap_err(),
            AuthError::AdminBadScheme
        );
    }

    #[test]
    fn nonce_set_rejects_replay() {
        let set = NonceSeenSet::new(4);
        assert!(set.check_and_insert("alias", "n1"));
        assert!(!set.check_and_insert("alias", "n1"));
        assert!(set.check_and_insert("other-alias", "n1"));
    }

    #[test]
    fn nonce_set_evicts_oldest_past_capacity() {
        let set = NonceSeenSet::new(2);
        assert!(set.check_and_insert("a", "n1"));
        assert!(set.check_and_insert("a", "n2"));
        assert!(set.check_and_insert("a", "n3"));
        // n1 was evicted to make room for n3, so it can be reused.
        assert!(set.check_and_insert("a", "n1"));
    }
}
