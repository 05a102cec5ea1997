// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time wallet authentication challenges.
//!
//! A challenge binds a random nonce to a host, wallet provider and signature
//! protocol inside a canonical message. The message is built once at issuance
//! and stored; verification compares the submitted message byte-for-byte
//! against the stored one, so it is never regenerated.
//!
//! ## Lifecycle
//!
//! 1. `issue` stores the challenge with `used = false`
//! 2. `consume` marks the entry in flight, runs the signature verifier
//!    outside the lock, then flips `used` to `true` only if it succeeded
//! 3. expired entries are dropped on lookup, by the opportunistic sweep when
//!    the registry grows past its threshold, and by the background sweeper

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::error::TrustError;

/// Challenge lifetime (10 minutes).
pub const CHALLENGE_TTL_SECS: i64 = 600;

/// Registry size above which issuance sweeps expired entries.
pub const REGISTRY_SWEEP_THRESHOLD: usize = 10_000;

/// Random bytes per nonce.
const NONCE_BYTES: usize = 32;

/// Wallet application the user signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WalletProvider {
    Metamask,
    Coinbase,
    WalletConnect,
    Phantom,
    Solflare,
    Backpack,
}

impl WalletProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletProvider::Metamask => "metamask",
            WalletProvider::Coinbase => "coinbase",
            WalletProvider::WalletConnect => "wallet_connect",
            WalletProvider::Phantom => "phantom",
            WalletProvider::Solflare => "solflare",
            WalletProvider::Backpack => "backpack",
        }
    }
}

/// Signature family used to prove wallet control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignatureProtocol {
    /// secp256k1 personal-message signature with address recovery.
    Eip191,
    /// Detached ed25519 signature against a known public key.
    Ed25519,
}

impl SignatureProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureProtocol::Eip191 => "eip191",
            SignatureProtocol::Ed25519 => "ed25519",
        }
    }
}

/// An issued challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: String,
    pub provider: WalletProvider,
    pub protocol: SignatureProtocol,
    pub host: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub message: String,
    pub used: bool,
}

impl Challenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// The fields a client resubmits alongside its signature.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeClaim<'a> {
    pub provider: WalletProvider,
    pub protocol: SignatureProtocol,
    pub nonce: &'a str,
    pub message: &'a str,
}

#[derive(Debug)]
struct Slot {
    challenge: Challenge,
    /// A verifier is currently running for this nonce.
    in_flight: bool,
}

/// Process-wide store of outstanding challenges.
#[derive(Debug)]
pub struct ChallengeRegistry {
    challenges: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
    sweep_threshold: usize,
}

impl Default for ChallengeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeRegistry {
    pub fn new() -> Self {
        Self::with_limits(Duration::seconds(CHALLENGE_TTL_SECS), REGISTRY_SWEEP_THRESHOLD)
    }

    /// Create a registry with a custom TTL and sweep threshold.
    pub fn with_limits(ttl: Duration, sweep_threshold: usize) -> Self {
        Self {
            challenges: Mutex::new(HashMap::new()),
            ttl,
            sweep_threshold,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.challenges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue and store a new challenge.
    pub fn issue(
        &self,
        provider: WalletProvider,
        protocol: SignatureProtocol,
        host: &str,
        now: DateTime<Utc>,
    ) -> Result<Challenge, TrustError> {
        let host = normalize_host(host)?;
        let nonce = generate_nonce();
        let expires_at = now + self.ttl;
        let message = canonical_message(&host, provider, protocol, &nonce, now, expires_at);

        let challenge = Challenge {
            nonce: nonce.clone(),
            provider,
            protocol,
            host,
            issued_at: now,
            expires_at,
            message,
            used: false,
        };

        let mut challenges = self.lock();
        challenges.insert(
            nonce,
            Slot {
                challenge: challenge.clone(),
                in_flight: false,
            },
        );

        if challenges.len() > self.sweep_threshold {
            let removed = sweep_locked(&mut challenges, now);
            tracing::debug!(removed, remaining = challenges.len(), "Swept expired challenges");
        }

        Ok(challenge)
    }

    /// Check a claim against its stored challenge and, if `verify` accepts
    /// the signature, mark the challenge used.
    ///
    /// `verify` runs without the registry lock. While it runs the entry is
    /// in flight and any other submission for the same nonce fails with
    /// `AlreadyUsed`, so at most one submission succeeds. Any failure leaves
    /// `used` untouched so the client may retry before expiry.
    pub fn consume<F>(
        &self,
        claim: ChallengeClaim<'_>,
        now: DateTime<Utc>,
        verify: F,
    ) -> Result<Challenge, TrustError>
    where
        F: FnOnce(&Challenge) -> Result<(), TrustError>,
    {
        let candidate = {
            let mut challenges = self.lock();

            let slot = challenges
                .get(claim.nonce)
                .ok_or_else(|| TrustError::expired("Challenge expired or unknown"))?;

            if slot.challenge.used || slot.in_flight {
                return Err(TrustError::AlreadyUsed);
            }

            if slot.challenge.is_expired(now) {
                challenges.remove(claim.nonce);
                return Err(TrustError::expired("Challenge expired"));
            }

            if slot.challenge.message != claim.message {
                return Err(TrustError::mismatch("Signed message does not match the challenge"));
            }
            if slot.challenge.provider != claim.provider
                || slot.challenge.protocol != claim.protocol
            {
                return Err(TrustError::mismatch(
                    "Wallet provider or protocol does not match the challenge",
                ));
            }

            let slot = challenges
                .get_mut(claim.nonce)
                .ok_or_else(|| TrustError::expired("Challenge expired or unknown"))?;
            slot.in_flight = true;
            slot.challenge.clone()
        };

        let outcome = verify(&candidate);

        let mut challenges = self.lock();
        let slot = challenges
            .get_mut(claim.nonce)
            .ok_or_else(|| TrustError::expired("Challenge expired"))?;
        slot.in_flight = false;
        outcome?;

        slot.challenge.used = true;
        Ok(slot.challenge.clone())
    }

    /// Drop every expired challenge. Returns the number removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        sweep_locked(&mut self.lock(), now)
    }

    /// Snapshot of a stored challenge.
    pub fn get(&self, nonce: &str) -> Option<Challenge> {
        self.lock().get(nonce).map(|slot| slot.challenge.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep_locked(challenges: &mut HashMap<String, Slot>, now: DateTime<Utc>) -> usize {
    let before = challenges.len();
    challenges.retain(|_, slot| !slot.challenge.is_expired(now));
    before - challenges.len()
}

/// URL-safe nonce from 32 bytes of OS randomness.
fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Reduce a host or origin to `host[:port]`, rejecting anything that could
/// smuggle extra lines or paths into the signed message.
fn normalize_host(raw: &str) -> Result<String, TrustError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TrustError::format("host is required"));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(TrustError::format("host must not contain whitespace"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&candidate).map_err(|_| TrustError::format("host is not a valid domain"))?;

    if !url.username().is_empty()
        || url.password().is_some()
        || url.query().is_some()
        || url.fragment().is_some()
        || url.path() != "/"
    {
        return Err(TrustError::format("host must not contain credentials or a path"));
    }

    let host = url
        .host_str()
        .ok_or_else(|| TrustError::format("host is not a valid domain"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn canonical_message(
    host: &str,
    provider: WalletProvider,
    protocol: SignatureProtocol,
    nonce: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> String {
    format!(
        "{host} wants you to sign in with your {provider} wallet.\n\
         \n\
         Protocol: {protocol}\n\
         Nonce: {nonce}\n\
         Issued At: {issued}\n\
         Expiration Time: {expires}",
        provider = provider.as_str(),
        protocol = protocol.as_str(),
        issued = issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        expires = expires_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}
