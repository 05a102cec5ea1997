// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault secret repository.
//!
//! Each secret is stored as a separate JSON file under `vault/`, keyed by an
//! opaque UUID. Records hold the encrypted envelope and one-way metadata
//! only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::{RecordStore, StorageError, StorageResult};
use crate::vault::SecretType;

/// Vault secret stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSecret {
    /// Opaque identifier (UUID)
    pub id: String,
    /// Onboarding session that owns the record
    #[serde(default)]
    pub session_id: String,
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    pub label: Option<String>,
    pub masked_preview: Option<String>,
    /// Lowercase hex SHA-256 of the plaintext
    pub fingerprint: String,
    /// `base64(iv).base64(ciphertext)`
    pub ciphertext_envelope: String,
    /// Account reported by the owning service, when verified
    #[serde(default)]
    pub verified_account: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Repository for vault secret records.
pub struct SecretRepository<'a> {
    store: &'a RecordStore,
}

impl<'a> SecretRepository<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    pub fn exists(&self, secret_id: &str) -> bool {
        self.store.exists(self.store.paths().vault_secret(secret_id))
    }

    /// Get a secret record by ID.
    pub fn get(&self, secret_id: &str) -> StorageResult<StoredSecret> {
        let path = self.store.paths().vault_secret(secret_id);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!("Vault secret {secret_id}")));
        }
        self.store.read_json(path)
    }

    /// Store a new record.
    pub fn create(&self, secret: &StoredSecret) -> StorageResult<()> {
        if self.exists(&secret.id) {
            return Err(StorageError::AlreadyExists(format!("Vault secret {}", secret.id)));
        }
        self.store
            .write_json(self.store.paths().vault_secret(&secret.id), secret)
    }

    /// Overwrite an existing record in full.
    pub fn replace(&self, secret: &StoredSecret) -> StorageResult<()> {
        if !self.exists(&secret.id) {
            return Err(StorageError::NotFound(format!("Vault secret {}", secret.id)));
        }
        self.store
            .write_json(self.store.paths().vault_secret(&secret.id), secret)
    }
}
