// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secret Vault
//!
//! Envelope encryption for third-party credentials at rest.
//!
//! ## Envelope Format
//!
//! ```text
//! base64(iv) "." base64(ciphertext || tag)
//! ```
//!
//! - Key: SHA-256 of the trimmed passphrase (AES-256-GCM)
//! - IV: 12 fresh random bytes per call
//! - Both parts use standard padded base64
//!
//! ## Key Rotation
//!
//! The vault holds an ordered candidate list: the primary passphrase first,
//! then legacy passphrases in configured order. New envelopes are always
//! written under the primary; decryption tries each candidate and returns the
//! first plaintext that authenticates. `rewrap` moves a legacy envelope onto
//! the primary key.

pub mod credentials;
pub mod service;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64ct::{Base64, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::TrustError;

pub use credentials::{CredentialVerifier, HttpCredentialVerifier, SecretType};
pub use service::{SecretUpload, UploadedSecret, VaultService};

/// AES-GCM nonce length.
const IV_LEN: usize = 12;

/// A decrypted secret and the candidate key that opened it.
pub struct Decrypted {
    pub plaintext: Zeroizing<String>,
    /// 0 is the primary key; anything else is a legacy key.
    pub key_index: usize,
}

impl Decrypted {
    pub fn used_legacy_key(&self) -> bool {
        self.key_index > 0
    }
}

/// AES-256-GCM envelope encryption over an ordered key list.
pub struct SecretVault {
    keys: Vec<Zeroizing<[u8; 32]>>,
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault")
            .field("keys", &self.keys.len())
            .finish()
    }
}

fn derive_key(passphrase: &str) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&Sha256::digest(passphrase.trim().as_bytes()));
    key
}

impl SecretVault {
    /// Build a vault from the primary passphrase and any legacy passphrases.
    ///
    /// Blank legacy entries are ignored; a blank primary is a configuration
    /// error.
    pub fn new(primary: &str, legacy: &[String]) -> Result<Self, TrustError> {
        if primary.trim().is_empty() {
            return Err(TrustError::configuration("Vault key is not configured"));
        }
        let keys = std::iter::once(primary)
            .chain(legacy.iter().map(String::as_str))
            .filter(|p| !p.trim().is_empty())
            .map(derive_key)
            .collect();
        Ok(Self { keys })
    }

    /// Number of candidate keys, primary included.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn primary(&self) -> Result<&Zeroizing<[u8; 32]>, TrustError> {
        self.keys
            .first()
            .ok_or_else(|| TrustError::configuration("Vault key is not configured"))
    }

    /// Encrypt under the primary key with a fresh IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, TrustError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.primary()?.as_slice()));

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| TrustError::configuration("Vault encryption failed"))?;

        Ok(format!(
            "{}.{}",
            Base64::encode_string(&iv),
            Base64::encode_string(&ciphertext)
        ))
    }

    /// Decrypt an envelope with the first candidate key that authenticates it.
    pub fn decrypt(&self, envelope: &str) -> Result<Zeroizing<String>, TrustError> {
        self.decrypt_detailed(envelope).map(|d| d.plaintext)
    }

    /// Like [`decrypt`](Self::decrypt), also reporting which key matched.
    pub fn decrypt_detailed(&self, envelope: &str) -> Result<Decrypted, TrustError> {
        let (iv, ciphertext) = parse_envelope(envelope)?;
        let nonce = Nonce::from_slice(&iv);

        for (key_index, key) in self.keys.iter().enumerate() {
            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
            let Ok(bytes) = cipher.decrypt(nonce, ciphertext.as_slice()) else {
                continue;
            };
            let plaintext = String::from_utf8(bytes).map_err(|_| TrustError::Decryption)?;
            if key_index > 0 {
                tracing::warn!(key_index, "Vault secret opened with a legacy key");
            }
            return Ok(Decrypted {
                plaintext: Zeroizing::new(plaintext),
                key_index,
            });
        }

        Err(TrustError::Decryption)
    }

    /// Re-encrypt an envelope under the primary key.
    ///
    /// Returns `None` when the envelope already uses the primary key.
    pub fn rewrap(&self, envelope: &str) -> Result<Option<String>, TrustError> {
        let decrypted = self.decrypt_detailed(envelope)?;
        if !decrypted.used_legacy_key() {
            return Ok(None);
        }
        self.encrypt(&decrypted.plaintext).map(Some)
    }
}

fn parse_envelope(envelope: &str) -> Result<([u8; IV_LEN], Vec<u8>), TrustError> {
    let mut parts = envelope.trim().split('.');
    let (Some(iv), Some(ciphertext), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TrustError::format("Invalid vault ciphertext"));
    };

    let iv = Base64::decode_vec(iv).map_err(|_| TrustError::format("Invalid vault IV encoding"))?;
    let iv = <[u8; IV_LEN]>::try_from(iv.as_slice())
        .map_err(|_| TrustError::format("Vault IV must be 12 bytes"))?;
    let ciphertext = Base64::decode_vec(ciphertext)
        .map_err(|_| TrustError::format("Invalid vault ciphertext encoding"))?;
    Ok((iv, ciphertext))
}

/// Fixed-shape redacted preview; `None` for an empty secret.
///
/// Up to 8 characters keep the first and last 2, longer secrets keep the
/// first and last 4.
pub fn mask(secret: &str) -> Option<String> {
    let chars: Vec<char> = secret.trim().chars().collect();
    let n = chars.len();
    if n == 0 {
        return None;
    }
    let (keep, joiner) = if n <= 8 { (2, "***") } else { (4, "...") };
    let head: String = chars.iter().take(keep).collect();
    let tail: String = chars[n.saturating_sub(keep)..].iter().collect();
    Some(format!("{head}{joiner}{tail}"))
}

/// Lowercase hex SHA-256 of the secret.
pub fn fingerprint(secret: &str) -> String {
    alloy::hex::encode(Sha256::digest(secret.as_bytes()))
}
