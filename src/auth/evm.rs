// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account-chain (EVM) wallet signatures.
//!
//! Wallets sign the challenge with `personal_sign`: keccak256 over
//! `"\x19Ethereum Signed Message:\n" || len(message) || message`. The signer's
//! address is recovered from the 65-byte `r || s || v` signature and compared
//! with the claimed address.

use alloy::primitives::keccak256;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use super::challenge::SignatureProtocol;
use super::wallet::SignatureVerifier;
use crate::error::TrustError;

/// Length of a recoverable `r || s || v` signature.
const RECOVERABLE_SIGNATURE_LEN: usize = 65;

/// Verifies EIP-191 personal-message signatures by address recovery.
#[derive(Debug, Default, Clone, Copy)]
pub struct Eip191Verifier;

impl SignatureVerifier for Eip191Verifier {
    fn protocol(&self) -> SignatureProtocol {
        SignatureProtocol::Eip191
    }

    fn verify(&self, message: &str, signature: &str, address: &str) -> Result<String, TrustError> {
        let expected = normalize_evm_address(address).ok_or_else(|| {
            TrustError::format("Wallet address must be 0x followed by 40 hex characters")
        })?;

        let bytes = alloy::hex::decode(signature.trim())
            .map_err(|_| TrustError::format("Signature must be hex encoded"))?;
        if bytes.len() != RECOVERABLE_SIGNATURE_LEN {
            return Err(TrustError::format("Signature must decode to 65 bytes"));
        }

        let sig = Signature::try_from(&bytes[..64])
            .map_err(|_| TrustError::format("Signature bytes are not a valid ECDSA signature"))?;
        let recovery_id = normalize_recovery_id(bytes[64])?;

        let prehash = personal_message_hash(message);
        let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
            .map_err(|_| TrustError::mismatch("Signature does not match wallet address"))?;

        if address_from_verifying_key(&key) != expected {
            return Err(TrustError::mismatch("Signature does not match wallet address"));
        }
        Ok(expected)
    }
}

/// Accepts `v` as 0/1 or the legacy 27/28 form.
fn normalize_recovery_id(raw: u8) -> Result<RecoveryId, TrustError> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => {
            return Err(TrustError::format(
                "Signature recovery id must be 0/1 or 27/28",
            ))
        }
    };
    RecoveryId::try_from(id).map_err(|_| TrustError::format("Signature recovery id is invalid"))
}

/// Hash a message the way `personal_sign` does.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let mut data = format!("\x19Ethereum Signed Message:\n{}", bytes.len()).into_bytes();
    data.extend_from_slice(bytes);
    keccak256(&data).0
}

/// Derive the lowercase `0x` address for a secp256k1 public key.
pub fn address_from_verifying_key(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag.
    let hash = keccak256(&encoded.as_bytes()[1..]);
    format!("0x{}", alloy::hex::encode(&hash[12..]))
}

/// Lowercase a `0x` + 40 hex address, or `None` if it has another shape.
pub fn normalize_evm_address(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let hex = trimmed.strip_prefix("0x")?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}
