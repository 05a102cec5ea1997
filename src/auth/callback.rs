// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed machine-to-machine callbacks.
//!
//! A partner signs `timestamp || "." || raw_body` with HMAC-SHA256 under the
//! shared secret and sends the hex digest in `x-plugin-signature` next to the
//! timestamp in `x-plugin-timestamp`. The body is only parsed after the
//! signature checks out.

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use sha2::Sha256;

use crate::error::TrustError;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-plugin-timestamp";
pub const SIGNATURE_HEADER: &str = "x-plugin-signature";

/// Anti-replay window in either direction.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Timestamps below this are taken to be in seconds.
const MILLIS_THRESHOLD: f64 = 1_000_000_000_000.0;

/// Verifies timestamped HMAC envelopes on inbound partner calls.
#[derive(Clone)]
pub struct RequestAuthenticator {
    secret: Option<String>,
    max_skew: Duration,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("configured", &self.secret.is_some())
            .field("max_skew", &self.max_skew)
            .finish()
    }
}

impl RequestAuthenticator {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            max_skew: Duration::seconds(MAX_CLOCK_SKEW_SECS),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify one envelope. `timestamp` is used verbatim in the MAC input.
    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        raw_body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), TrustError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| TrustError::configuration("Plugin shared secret is not configured"))?;

        let timestamp = timestamp.unwrap_or_default();
        let timestamp_ms = parse_timestamp_ms(timestamp)
            .ok_or_else(|| TrustError::format("Missing or malformed plugin timestamp"))?;
        if (now.timestamp_millis() - timestamp_ms).abs() > self.max_skew.num_milliseconds() {
            return Err(TrustError::expired("Plugin timestamp is outside the accepted window"));
        }

        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| TrustError::mismatch("Missing plugin signature"))?;

        let expected = sign(secret, timestamp, raw_body);
        if !constant_time_eq(signature, &expected) {
            return Err(TrustError::mismatch("Invalid plugin signature"));
        }
        Ok(())
    }

    /// Verify using the standard callback headers.
    pub fn verify_headers(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), TrustError> {
        let timestamp = headers.get(TIMESTAMP_HEADER).and_then(|v| v.to_str().ok());
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        self.verify(timestamp, signature, raw_body, now)
    }

    /// Verify the envelope, then parse the body.
    pub fn verify_json<T: DeserializeOwned>(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<T, TrustError> {
        self.verify_headers(headers, raw_body, now)?;
        let body = if raw_body.iter().all(u8::is_ascii_whitespace) {
            b"{}".as_slice()
        } else {
            raw_body
        };
        serde_json::from_slice(body).map_err(|e| TrustError::format(format!("Invalid JSON body: {e}")))
    }
}

/// Parse a timestamp in seconds or milliseconds into milliseconds.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let n: f64 = raw.trim().parse().ok()?;
    if !n.is_finite() || n <= 0.0 {
        return None;
    }
    let ms = if n < MILLIS_THRESHOLD { n * 1000.0 } else { n };
    Some(ms.round() as i64)
}

/// Lowercase hex HMAC-SHA256 over `timestamp || "." || body`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    alloy::hex::encode(hmac_sha256(secret.as_bytes(), &[timestamp.as_bytes(), b".".as_slice(), body]))
}

pub(crate) fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    // HMAC accepts keys of any length; the error arm is unreachable.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return [0u8; 32],
    };
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Compare two hex digests without exiting early.
///
/// Both sides are trimmed and lowercased. Lengths must match; then every
/// byte pair is XORed into an accumulator regardless of earlier differences.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.trim().to_ascii_lowercase();
    let b = b.trim().to_ascii_lowercase();
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return false;
    }
    let diff = a
        .bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::TimeZone;
    use serde::Deserialize;

    const SECRET: &str = "plugin-secret";
    const NOW_MS: i64 = 1_700_000_000_000;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(NOW_MS).unwrap()
    }

    fn authenticator() -> RequestAuthenticator {
        RequestAuthenticator::new(Some(SECRET.to_string()))
    }

    #[test]
    fn valid_signature_passes() {
        let ts = NOW_MS.to_string();
        let body = br#"{"event":"credit"}"#;
        let sig = sign(SECRET, &ts, body);
        assert!(authenticator().verify(Some(&ts), Some(&sig), body, now()).is_ok());
    }

    #[test]
    fn seconds_timestamps_are_scaled() {
        assert_eq!(parse_timestamp_ms("1700000000"), Some(NOW_MS));
        assert_eq!(parse_timestamp_ms(" 1700000000000 "), Some(NOW_MS));
        assert_eq!(parse_timestamp_ms("0"), None);
        assert_eq!(parse_timestamp_ms("-5"), None);
        assert_eq!(parse_timestamp_ms("soon"), None);
        assert_eq!(parse_timestamp_ms(""), None);

        let ts = "1700000000";
        let sig = sign(SECRET, ts, b"{}");
        assert!(authenticator().verify(Some(ts), Some(&sig), b"{}", now()).is_ok());
    }

    #[test]
    fn correctly_signed_but_stale_is_expired() {
        let ts = (NOW_MS - 10 * 60 * 1000).to_string();
        let sig = sign(SECRET, &ts, b"{}");
        let err = authenticator().verify(Some(&ts), Some(&sig), b"{}", now()).unwrap_err();
        assert!(matches!(err, TrustError::Expired(_)));

        let future = (NOW_MS + 5 * 60 * 1000 + 1).to_string();
        let sig = sign(SECRET, &future, b"{}");
        assert!(matches!(
            authenticator().verify(Some(&future), Some(&sig), b"{}", now()),
            Err(TrustError::Expired(_))
        ));
    }

    #[test]
    fn edge_of_window_is_accepted() {
        let ts = (NOW_MS - 5 * 60 * 1000).to_string();
        let sig = sign(SECRET, &ts, b"{}");
        assert!(authenticator().verify(Some(&ts), Some(&sig), b"{}", now()).is_ok());
    }

    #[test]
    fn tampering_with_body_or_timestamp_fails() {
        let ts = NOW_MS.to_string();
        let body = br#"{"amount":10}"#;
        let sig = sign(SECRET, &ts, body);

        let err = authenticator()
            .verify(Some(&ts), Some(&sig), br#"{"amount":90}"#, now())
            .unwrap_err();
        assert!(matches!(err, TrustError::Mismatch(_)));

        let shifted = (NOW_MS + 1).to_string();
        assert!(matches!(
            authenticator().verify(Some(&shifted), Some(&sig), body, now()),
            Err(TrustError::Mismatch(_))
        ));
    }

    #[test]
    fn missing_pieces_are_classified() {
        let ts = NOW_MS.to_string();
        assert!(matches!(
            authenticator().verify(None, Some("ab"), b"{}", now()),
            Err(TrustError::Format(_))
        ));
        assert!(matches!(
            authenticator().verify(Some(&ts), None, b"{}", now()),
            Err(TrustError::Mismatch(_))
        ));
        assert!(matches!(
            authenticator().verify(Some(&ts), Some("  "), b"{}", now()),
            Err(TrustError::Mismatch(_))
        ));
    }

    #[test]
    fn unconfigured_secret_is_never_valid() {
        let ts = NOW_MS.to_string();
        let sig = sign("", &ts, b"{}");
        let err = RequestAuthenticator::new(Some("  ".into()))
            .verify(Some(&ts), Some(&sig), b"{}", now())
            .unwrap_err();
        assert_eq!(err.error_code(), "service_unavailable");
        assert!(!RequestAuthenticator::new(None).is_configured());
    }

    #[test]
    fn uppercase_signature_is_accepted() {
        let ts = NOW_MS.to_string();
        let sig = sign(SECRET, &ts, b"{}").to_uppercase();
        assert!(authenticator().verify(Some(&ts), Some(&sig), b"{}", now()).is_ok());
    }

    #[test]
    fn constant_time_eq_requires_equal_length() {
        assert!(constant_time_eq("abcd", "ABCD"));
        assert!(!constant_time_eq("abcd", "abce"));
        assert!(!constant_time_eq("abcd", "abc"));
        assert!(!constant_time_eq("", ""));
        // Differences in the first and last position are both detected.
        assert!(!constant_time_eq("0bcd", "abcd"));
        assert!(!constant_time_eq("abc0", "abcd"));
    }

    #[derive(Debug, Deserialize)]
    struct Event {
        event_type: String,
    }

    #[test]
    fn verify_json_parses_only_after_verification() {
        let ts = NOW_MS.to_string();
        let body = br#"{"event_type":"credit"}"#;
        let sig = sign(SECRET, &ts, body);

        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&ts).unwrap());
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());

        let event: Event = authenticator().verify_json(&headers, body, now()).unwrap();
        assert_eq!(event.event_type, "credit");

        // Unsigned garbage is rejected by the MAC, not the parser.
        let err = authenticator()
            .verify_json::<Event>(&headers, b"not json", now())
            .unwrap_err();
        assert!(matches!(err, TrustError::Mismatch(_)));

        // Signed garbage reaches the parser.
        let sig = sign(SECRET, &ts, b"not json");
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        let err = authenticator()
            .verify_json::<Event>(&headers, b"not json", now())
            .unwrap_err();
        assert!(matches!(err, TrustError::Format(_)));
    }
}
