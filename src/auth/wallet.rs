// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet signature verification against issued challenges.
//!
//! `WalletAuthenticator` owns the challenge registry and one
//! [`SignatureVerifier`] per protocol. Adding a wallet family means
//! registering another verifier; the dispatcher itself does not change.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::challenge::{ChallengeClaim, ChallengeRegistry, SignatureProtocol, WalletProvider};
use super::ed25519::Ed25519Verifier;
use super::evm::Eip191Verifier;
use crate::error::TrustError;

/// A protocol-specific signature check.
///
/// `verify` returns the canonical form of the signer identity (lowercase
/// address, or the public key as submitted) on success.
pub trait SignatureVerifier: Send + Sync {
    fn protocol(&self) -> SignatureProtocol;

    fn verify(&self, message: &str, signature: &str, address: &str) -> Result<String, TrustError>;
}

/// Chain id as clients send it: a JSON number or a decimal/hex string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ChainIdInput {
    Number(i64),
    Text(String),
}

impl ChainIdInput {
    /// Parse and clamp to `>= 1`.
    pub fn normalize(&self) -> Result<u64, TrustError> {
        let value = match self {
            ChainIdInput::Number(n) => *n,
            ChainIdInput::Text(text) => parse_chain_id_text(text)?,
        };
        Ok(value.max(1) as u64)
    }
}

fn parse_chain_id_text(text: &str) -> Result<i64, TrustError> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => trimmed.parse::<i64>().ok(),
    };
    parsed.ok_or_else(|| TrustError::format("chain_id must be a decimal or 0x-prefixed hex integer"))
}

/// Everything a client submits to prove control of a wallet.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WalletProof {
    pub provider: WalletProvider,
    pub protocol: SignatureProtocol,
    pub nonce: String,
    /// The challenge message exactly as issued.
    pub message: String,
    pub signature: String,
    /// EVM address, or base58 public key for ed25519 wallets.
    pub address: String,
    #[serde(default)]
    pub chain_id: Option<ChainIdInput>,
}

/// Proof that a caller controls `address` under `protocol`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VerifiedIdentity {
    pub protocol: SignatureProtocol,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub verified_at: DateTime<Utc>,
}

/// Verifies signed challenges and consumes their nonces.
pub struct WalletAuthenticator {
    registry: Arc<ChallengeRegistry>,
    verifiers: HashMap<SignatureProtocol, Arc<dyn SignatureVerifier>>,
}

impl WalletAuthenticator {
    /// Authenticator with no verifiers registered.
    pub fn new(registry: Arc<ChallengeRegistry>) -> Self {
        Self {
            registry,
            verifiers: HashMap::new(),
        }
    }

    /// Authenticator with the EIP-191 and ed25519 verifiers.
    pub fn with_default_verifiers(registry: Arc<ChallengeRegistry>) -> Self {
        let mut authenticator = Self::new(registry);
        authenticator.register(Arc::new(Eip191Verifier));
        authenticator.register(Arc::new(Ed25519Verifier::default()));
        authenticator
    }

    /// Register (or replace) the verifier for its protocol.
    pub fn register(&mut self, verifier: Arc<dyn SignatureVerifier>) {
        self.verifiers.insert(verifier.protocol(), verifier);
    }

    pub fn registry(&self) -> &Arc<ChallengeRegistry> {
        &self.registry
    }

    /// Verify `proof` against its challenge and consume the nonce.
    ///
    /// The nonce is only marked used when every check passes.
    pub fn verify(
        &self,
        proof: &WalletProof,
        now: DateTime<Utc>,
    ) -> Result<VerifiedIdentity, TrustError> {
        let chain_id = proof
            .chain_id
            .as_ref()
            .map(ChainIdInput::normalize)
            .transpose()?;

        let claim = ChallengeClaim {
            provider: proof.provider,
            protocol: proof.protocol,
            nonce: &proof.nonce,
            message: &proof.message,
        };

        let mut address = None;
        self.registry.consume(claim, now, |challenge| {
            let verifier = self.verifiers.get(&challenge.protocol).ok_or_else(|| {
                TrustError::configuration(format!(
                    "No verifier registered for protocol {}",
                    challenge.protocol.as_str()
                ))
            })?;
            address = Some(verifier.verify(&challenge.message, &proof.signature, &proof.address)?);
            Ok(())
        })?;

        let address = address.ok_or_else(|| TrustError::mismatch("Signature was not verified"))?;
        Ok(VerifiedIdentity {
            protocol: proof.protocol,
            address,
            chain_id,
            verified_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ed25519::tests::{dev_ed25519_key, sign_ed25519_base58};
    use crate::auth::evm::tests::{dev_signing_key, sign_personal};
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn authenticator() -> WalletAuthenticator {
        WalletAuthenticator::with_default_verifiers(Arc::new(ChallengeRegistry::new()))
    }

    fn evm_proof(auth: &WalletAuthenticator, now: DateTime<Utc>) -> WalletProof {
        let challenge = auth
            .registry()
            .issue(
                WalletProvider::Metamask,
                SignatureProtocol::Eip191,
                "app.example.com",
                now,
            )
            .unwrap();
        let key = dev_signing_key();
        WalletProof {
            provider: WalletProvider::Metamask,
            protocol: SignatureProtocol::Eip191,
            signature: sign_personal(&key, &challenge.message),
            nonce: challenge.nonce,
            message: challenge.message,
            address: "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            chain_id: Some(ChainIdInput::Text("0x89".to_string())),
        }
    }

    #[test]
    fn evm_proof_verifies_once() {
        let auth = authenticator();
        let proof = evm_proof(&auth, t(0));

        let identity = auth.verify(&proof, t(5_000)).unwrap();
        assert_eq!(identity.protocol, SignatureProtocol::Eip191);
        assert_eq!(identity.address, "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(identity.chain_id, Some(137));
        assert_eq!(identity.verified_at, t(5_000));

        let err = auth.verify(&proof, t(6_000)).unwrap_err();
        assert!(matches!(err, TrustError::AlreadyUsed));
    }

    #[test]
    fn racing_submissions_of_one_proof_verify_once() {
        const SUBMITTERS: usize = 6;
        let auth = authenticator();
        let proof = evm_proof(&auth, t(0));
        let start = std::sync::Barrier::new(SUBMITTERS);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..SUBMITTERS)
                .map(|_| {
                    scope.spawn(|| {
                        start.wait();
                        auth.verify(&proof, t(1))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(TrustError::AlreadyUsed))));
    }

    #[test]
    fn correctly_signed_proof_after_expiry_is_expired() {
        let auth = authenticator();
        let proof = evm_proof(&auth, t(0));

        let err = auth.verify(&proof, t(600_001)).unwrap_err();
        assert!(matches!(err, TrustError::Expired(_)));
    }

    #[test]
    fn bad_signature_does_not_consume_nonce() {
        let auth = authenticator();
        let good = evm_proof(&auth, t(0));
        let bad = WalletProof {
            address: "0x0000000000000000000000000000000000000001".to_string(),
            ..good.clone()
        };

        assert!(matches!(auth.verify(&bad, t(1)), Err(TrustError::Mismatch(_))));
        assert!(auth.verify(&good, t(2)).is_ok());
    }

    #[test]
    fn ed25519_proof_verifies() {
        let auth = authenticator();
        let challenge = auth
            .registry()
            .issue(
                WalletProvider::Phantom,
                SignatureProtocol::Ed25519,
                "app.example.com",
                t(0),
            )
            .unwrap();
        let key = dev_ed25519_key();
        let public_key = bs58::encode(key.verifying_key().as_bytes()).into_string();

        let proof = WalletProof {
            provider: WalletProvider::Phantom,
            protocol: SignatureProtocol::Ed25519,
            signature: sign_ed25519_base58(&key, &challenge.message),
            nonce: challenge.nonce,
            message: challenge.message,
            address: public_key.clone(),
            chain_id: None,
        };

        let identity = auth.verify(&proof, t(1)).unwrap();
        assert_eq!(identity.address, public_key);
        assert_eq!(identity.chain_id, None);
    }

    #[test]
    fn missing_verifier_is_a_configuration_error() {
        let auth = WalletAuthenticator::new(Arc::new(ChallengeRegistry::new()));
        let proof = evm_proof(&auth, t(0));

        let err = auth.verify(&proof, t(1)).unwrap_err();
        assert_eq!(err.error_code(), "service_unavailable");
        assert!(!auth.registry().get(&proof.nonce).unwrap().used);
    }

    #[test]
    fn invalid_chain_id_fails_before_consuming() {
        let auth = authenticator();
        let proof = WalletProof {
            chain_id: Some(ChainIdInput::Text("mainnet".to_string())),
            ..evm_proof(&auth, t(0))
        };

        assert!(matches!(auth.verify(&proof, t(1)), Err(TrustError::Format(_))));
        assert!(!auth.registry().get(&proof.nonce).unwrap().used);
    }

    #[test]
    fn chain_id_normalization() {
        assert_eq!(ChainIdInput::Number(1).normalize().unwrap(), 1);
        assert_eq!(ChainIdInput::Number(0).normalize().unwrap(), 1);
        assert_eq!(ChainIdInput::Number(-5).normalize().unwrap(), 1);
        assert_eq!(ChainIdInput::Text(" 137 ".into()).normalize().unwrap(), 137);
        assert_eq!(ChainIdInput::Text("0x2105".into()).normalize().unwrap(), 8453);
        assert_eq!(ChainIdInput::Text("0X0".into()).normalize().unwrap(), 1);
        assert!(ChainIdInput::Text("".into()).normalize().is_err());
        assert!(ChainIdInput::Text("0xzz".into()).normalize().is_err());
    }

    #[test]
    fn chain_id_deserializes_from_number_or_string() {
        let number: ChainIdInput = serde_json::from_str("8453").unwrap();
        assert_eq!(number, ChainIdInput::Number(8453));
        let text: ChainIdInput = serde_json::from_str("\"0x1\"").unwrap();
        assert_eq!(text, ChainIdInput::Text("0x1".into()));
    }
}
