// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger-style (ed25519) wallet signatures.
//!
//! The address is the wallet's base58 public key. Wallets disagree on how
//! they encode the detached signature, so it is run through an ordered list
//! of decoders and the first one yielding exactly 64 bytes wins.

use base64ct::{Base64, Encoding};
use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

use super::challenge::SignatureProtocol;
use super::wallet::SignatureVerifier;
use crate::error::TrustError;

/// Decodes one text encoding into raw bytes, or `None` if it does not apply.
pub type Decoder = fn(&str) -> Option<Vec<u8>>;

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    Base64::decode_vec(value).ok()
}

fn decode_base58(value: &str) -> Option<Vec<u8>> {
    bs58::decode(value).into_vec().ok()
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    alloy::hex::decode(value).ok()
}

/// Signature decoders in the order they are tried.
pub const DEFAULT_SIGNATURE_DECODERS: [Decoder; 3] = [decode_base64, decode_base58, decode_hex];

/// Verifies detached ed25519 signatures over the UTF-8 message bytes.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    signature_decoders: Vec<Decoder>,
}

impl Default for Ed25519Verifier {
    fn default() -> Self {
        Self {
            signature_decoders: DEFAULT_SIGNATURE_DECODERS.to_vec(),
        }
    }
}

impl Ed25519Verifier {
    pub fn with_decoders(signature_decoders: Vec<Decoder>) -> Self {
        Self { signature_decoders }
    }

    fn decode_signature(&self, signature: &str) -> Option<[u8; SIGNATURE_LENGTH]> {
        self.signature_decoders
            .iter()
            .filter_map(|decode| decode(signature))
            .find_map(|bytes| <[u8; SIGNATURE_LENGTH]>::try_from(bytes.as_slice()).ok())
    }
}

fn decode_public_key(address: &str) -> Result<VerifyingKey, TrustError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|_| TrustError::format("Public key must be base58 encoded"))?;
    let bytes = <[u8; PUBLIC_KEY_LENGTH]>::try_from(bytes.as_slice())
        .map_err(|_| TrustError::format("Public key must decode to 32 bytes"))?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| TrustError::format("Public key is not a valid ed25519 point"))
}

impl SignatureVerifier for Ed25519Verifier {
    fn protocol(&self) -> SignatureProtocol {
        SignatureProtocol::Ed25519
    }

    fn verify(&self, message: &str, signature: &str, address: &str) -> Result<String, TrustError> {
        let address = address.trim();
        let key = decode_public_key(address)?;

        let bytes = self
            .decode_signature(signature.trim())
            .ok_or_else(|| TrustError::format("Signature must decode to 64 bytes"))?;
        let signature = Signature::from_bytes(&bytes);

        key.verify_strict(message.as_bytes(), &signature)
            .map_err(|_| TrustError::mismatch("Signature does not match public key"))?;
        Ok(address.to_string())
    }
}
