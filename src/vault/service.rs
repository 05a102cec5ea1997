// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault write path: verify, encrypt, persist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use super::credentials::{CredentialVerifier, SecretType};
use super::{fingerprint, mask, SecretVault};
use crate::error::TrustError;
use crate::storage::{RecordStore, SecretRepository, StorageError, StoredSecret};

/// Maximum label length in characters.
pub const MAX_LABEL_CHARS: usize = 120;

/// Maximum session id length in characters.
pub const MAX_SESSION_ID_CHARS: usize = 128;

/// Credential submitted for storage. The value is wiped on drop.
#[derive(Deserialize, ToSchema)]
pub struct SecretUpload {
    /// Onboarding session that owns the record
    #[serde(default)]
    pub session_id: String,
    pub secret_type: String,
    pub secret_value: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl Drop for SecretUpload {
    fn drop(&mut self) {
        self.secret_value.zeroize();
    }
}

impl std::fmt::Debug for SecretUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretUpload")
            .field("session_id", &self.session_id)
            .field("secret_type", &self.secret_type)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// What the caller gets back after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadedSecret {
    /// Opaque key under which the envelope is stored
    pub secret_id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    pub masked_preview: Option<String>,
    pub label: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_account: Option<String>,
}

impl From<&StoredSecret> for UploadedSecret {
    fn from(record: &StoredSecret) -> Self {
        Self {
            secret_id: record.id.clone(),
            session_id: record.session_id.clone(),
            secret_type: record.secret_type,
            masked_preview: record.masked_preview.clone(),
            label: record.label.clone(),
            uploaded_at: record.uploaded_at,
            verified_account: record.verified_account.clone(),
        }
    }
}

/// Orchestrates credential uploads.
#[derive(Clone)]
pub struct VaultService {
    vault: Option<Arc<SecretVault>>,
    verifier: Arc<dyn CredentialVerifier>,
    store: Arc<RecordStore>,
}

impl VaultService {
    pub fn new(
        vault: Option<Arc<SecretVault>>,
        verifier: Arc<dyn CredentialVerifier>,
        store: Arc<RecordStore>,
    ) -> Self {
        Self {
            vault,
            verifier,
            store,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.vault.is_some()
    }

    fn vault(&self) -> Result<&SecretVault, TrustError> {
        self.vault
            .as_deref()
            .ok_or_else(|| TrustError::configuration("Vault key is not configured"))
    }

    /// Verify, encrypt and store a new credential.
    pub async fn upload(
        &self,
        upload: &SecretUpload,
        now: DateTime<Utc>,
    ) -> Result<UploadedSecret, TrustError> {
        let id = Uuid::new_v4().to_string();
        let record = self.seal(id, upload, now).await?;
        SecretRepository::new(&self.store).create(&record)?;

        tracing::info!(
            secret_id = %record.id,
            session_id = %record.session_id,
            secret_type = record.secret_type.as_str(),
            fingerprint = &record.fingerprint[..8],
            "Vault secret stored"
        );
        Ok(UploadedSecret::from(&record))
    }

    /// Replace an existing credential record in full.
    ///
    /// Only the owning session may replace a record; a record owned by any
    /// other session is reported as not found.
    pub async fn replace(
        &self,
        secret_id: &str,
        upload: &SecretUpload,
        now: DateTime<Utc>,
    ) -> Result<UploadedSecret, TrustError> {
        let id = parse_secret_id(secret_id)?;
        let session_id = normalize_session_id(&upload.session_id)?;
        let repo = SecretRepository::new(&self.store);
        let owner = match repo.get(&id) {
            Ok(existing) => Some(existing.session_id),
            Err(StorageError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        if owner.as_deref() != Some(session_id.as_str()) {
            return Err(TrustError::NotFound(format!("Vault secret {id} not found")));
        }

        let record = self.seal(id, upload, now).await?;
        repo.replace(&record)?;

        tracing::info!(
            secret_id = %record.id,
            session_id = %record.session_id,
            secret_type = record.secret_type.as_str(),
            fingerprint = &record.fingerprint[..8],
            "Vault secret replaced"
        );
        Ok(UploadedSecret::from(&record))
    }

    /// Decrypt a stored credential for use by a trusted caller.
    ///
    /// Records still sealed under a legacy key are rewrapped under the
    /// primary key as a side effect.
    pub fn open(&self, secret_id: &str) -> Result<Zeroizing<String>, TrustError> {
        let vault = self.vault()?;
        let id = parse_secret_id(secret_id)?;
        let repo = SecretRepository::new(&self.store);
        let mut record = repo.get(&id)?;

        let decrypted = vault.decrypt_detailed(&record.ciphertext_envelope)?;
        if decrypted.used_legacy_key() {
            record.ciphertext_envelope = vault.encrypt(&decrypted.plaintext)?;
            repo.replace(&record)?;
            tracing::info!(secret_id = %id, "Vault secret rewrapped under primary key");
        }
        Ok(decrypted.plaintext)
    }

    /// Validate, verify with the owning service, then encrypt.
    async fn seal(
        &self,
        id: String,
        upload: &SecretUpload,
        now: DateTime<Utc>,
    ) -> Result<StoredSecret, TrustError> {
        let session_id = normalize_session_id(&upload.session_id)?;
        let secret_type = SecretType::parse(&upload.secret_type)?;
        let value = upload.secret_value.trim();
        if value.is_empty() {
            return Err(TrustError::format("secret_value required"));
        }
        let vault = self.vault()?;

        let verified_account = if secret_type.requires_live_verification() {
            self.verifier.verify(secret_type, value).await?
        } else {
            None
        };

        Ok(StoredSecret {
            id,
            session_id,
            secret_type,
            label: normalize_label(upload.label.as_deref()),
            masked_preview: mask(value),
            fingerprint: fingerprint(value),
            ciphertext_envelope: vault.encrypt(value)?,
            verified_account,
            uploaded_at: now,
        })
    }
}

fn parse_secret_id(raw: &str) -> Result<String, TrustError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| TrustError::format("secret_id must be a UUID"))
}

fn normalize_session_id(raw: &str) -> Result<String, TrustError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TrustError::format("session_id required"));
    }
    if trimmed.chars().count() > MAX_SESSION_ID_CHARS {
        return Err(TrustError::format("session_id is too long"));
    }
    Ok(trimmed.to_string())
}

/// Trim and cap a label; blank labels become `None`.
fn normalize_label(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_LABEL_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubVerifier {
        accept: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialVerifier for StubVerifier {
        async fn verify(
            &self,
            _secret_type: SecretType,
            _secret: &str,
        ) -> Result<Option<String>, TrustError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.accept {
                Ok(Some("octocat".to_string()))
            } else {
                Err(TrustError::gateway("GitHub token verification failed (401)"))
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<RecordStore>,
        verifier: Arc<StubVerifier>,
        service: VaultService,
    }

    fn fixture_with(vault: Option<SecretVault>, accept: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::new(StoragePaths::new(dir.path()));
        store.initialize().unwrap();
        let store = Arc::new(store);
        let verifier = Arc::new(StubVerifier {
            accept,
            calls: AtomicUsize::new(0),
        });
        let service = VaultService::new(vault.map(Arc::new), verifier.clone(), store.clone());
        Fixture {
            _dir: dir,
            store,
            verifier,
            service,
        }
    }

    fn stored_ids(store: &RecordStore) -> Vec<String> {
        store.list_files(store.paths().vault_dir(), "json").unwrap()
    }

    fn fixture(accept: bool) -> Fixture {
        fixture_with(Some(SecretVault::new("vault-key", &[]).unwrap()), accept)
    }

    const SESSION: &str = "sess-owner";

    fn upload(secret_type: &str, value: &str) -> SecretUpload {
        SecretUpload {
            session_id: SESSION.to_string(),
            secret_type: secret_type.to_string(),
            secret_value: value.to_string(),
            label: None,
        }
    }

    #[tokio::test]
    async fn api_key_is_encrypted_and_stored() {
        let f = fixture(true);
        let out = f
            .service
            .upload(&upload("api_key", "  sk_live_1234567890  "), Utc::now())
            .await
            .unwrap();

        assert_eq!(out.secret_type, SecretType::ApiKey);
        assert_eq!(out.masked_preview.as_deref(), Some("sk_l...7890"));
        assert_eq!(out.verified_account, None);
        assert_eq!(f.verifier.calls.load(Ordering::SeqCst), 0);

        let raw = std::fs::read_to_string(f.store.paths().vault_secret(&out.secret_id)).unwrap();
        assert!(!raw.contains("sk_live_1234567890"));

        assert_eq!(
            f.service.open(&out.secret_id).unwrap().as_str(),
            "sk_live_1234567890"
        );
    }

    #[tokio::test]
    async fn github_token_is_verified_before_storage() {
        let f = fixture(true);
        let out = f
            .service
            .upload(&upload("github_token", "ghp_abcdefghijklmnop"), Utc::now())
            .await
            .unwrap();
        assert_eq!(out.verified_account.as_deref(), Some("octocat"));
        assert_eq!(f.verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_token_is_never_persisted() {
        let f = fixture(false);
        let err = f
            .service
            .upload(&upload("github_token", "ghp_revoked"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::Gateway(_)));
        assert!(stored_ids(&f.store).is_empty());
    }

    #[tokio::test]
    async fn passwords_and_empty_values_are_refused() {
        let f = fixture(true);
        for (kind, value) in [("ftp_password", "hunter2"), ("api_key", "   ")] {
            let err = f
                .service
                .upload(&upload(kind, value), Utc::now())
                .await
                .unwrap_err();
            assert_eq!(err.error_code(), "format_error");
        }
        assert!(stored_ids(&f.store).is_empty());
    }

    #[tokio::test]
    async fn unconfigured_vault_skips_verification() {
        let f = fixture_with(None, true);
        let err = f
            .service
            .upload(&upload("github_token", "ghp_abc"), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "service_unavailable");
        assert_eq!(f.verifier.calls.load(Ordering::SeqCst), 0);
        assert!(!f.service.is_configured());
    }

    #[tokio::test]
    async fn labels_are_trimmed_and_capped() {
        let f = fixture(true);
        let mut req = upload("api_key", "key-value-123");
        req.label = Some(format!("  {}  ", "x".repeat(200)));
        let out = f.service.upload(&req, Utc::now()).await.unwrap();
        assert_eq!(out.label.unwrap().chars().count(), MAX_LABEL_CHARS);

        assert_eq!(normalize_label(Some("   ")), None);
        assert_eq!(normalize_label(None), None);
    }

    #[tokio::test]
    async fn replace_overwrites_whole_record() {
        let f = fixture(true);
        let mut first = upload("api_key", "first-key-value");
        first.label = Some("Primary".into());
        let created = f.service.upload(&first, Utc::now()).await.unwrap();

        let replaced = f
            .service
            .replace(
                &created.secret_id,
                &upload("hosting_api_token", "second-key-value"),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(replaced.secret_id, created.secret_id);
        assert_eq!(replaced.secret_type, SecretType::HostingApiToken);
        assert_eq!(replaced.label, None);
        assert_eq!(
            f.service.open(&created.secret_id).unwrap().as_str(),
            "second-key-value"
        );
    }

    #[tokio::test]
    async fn replace_requires_existing_uuid() {
        let f = fixture(true);
        let err = f
            .service
            .replace(&Uuid::new_v4().to_string(), &upload("api_key", "v"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::NotFound(_)));

        let err = f
            .service
            .replace("../../etc/passwd", &upload("api_key", "v"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::Format(_)));
    }

    #[tokio::test]
    async fn upload_requires_a_session() {
        let f = fixture(true);
        let mut req = upload("api_key", "key-value-123");
        req.session_id = "   ".to_string();
        let err = f.service.upload(&req, Utc::now()).await.unwrap_err();
        assert_eq!(err.error_code(), "format_error");
        assert!(stored_ids(&f.store).is_empty());

        let out = f
            .service
            .upload(&upload("api_key", "key-value-123"), Utc::now())
            .await
            .unwrap();
        assert_eq!(out.session_id, SESSION);
    }

    #[tokio::test]
    async fn other_sessions_cannot_replace_a_record() {
        let f = fixture(true);
        let created = f
            .service
            .upload(&upload("api_key", "owner-value-123"), Utc::now())
            .await
            .unwrap();

        let mut hijack = upload("api_key", "attacker-value-456");
        hijack.session_id = "sess-other".to_string();
        let err = f
            .service
            .replace(&created.secret_id, &hijack, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::NotFound(_)));
        assert_eq!(
            f.service.open(&created.secret_id).unwrap().as_str(),
            "owner-value-123"
        );
    }

    #[tokio::test]
    async fn open_rewraps_legacy_records() {
        let old = fixture_with(Some(SecretVault::new("K1", &[]).unwrap()), true);
        let created = old
            .service
            .upload(&upload("api_key", "legacy-secret"), Utc::now())
            .await
            .unwrap();
        let before = SecretRepository::new(&old.store).get(&created.secret_id).unwrap();

        let rotated = VaultService::new(
            Some(Arc::new(SecretVault::new("K2", &["K1".to_string()]).unwrap())),
            old.verifier.clone(),
            old.store.clone(),
        );
        assert_eq!(rotated.open(&created.secret_id).unwrap().as_str(), "legacy-secret");

        let after = SecretRepository::new(&old.store).get(&created.secret_id).unwrap();
        assert_ne!(before.ciphertext_envelope, after.ciphertext_envelope);
        let primary_only = SecretVault::new("K2", &[]).unwrap();
        assert_eq!(
            primary_only.decrypt(&after.ciphertext_envelope).unwrap().as_str(),
            "legacy-secret"
        );
    }
}
