// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::auth::{
    ChallengeRegistry, HttpWalletGateway, RequestAuthenticator, WalletAuthenticator,
    WalletGateway,
};
use crate::config::TrustConfig;
use crate::error::TrustError;
use crate::limiter::RateLimits;
use crate::storage::{RecordStore, StoragePaths};
use crate::vault::{CredentialVerifier, HttpCredentialVerifier, SecretVault, VaultService};

/// Buffered callbacks per subscriber before lagging receivers drop events.
pub const CALLBACK_CHANNEL_CAPACITY: usize = 256;

/// A plugin callback that passed envelope verification.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifiedCallback {
    pub event_id: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TrustConfig>,
    pub challenges: Arc<ChallengeRegistry>,
    pub wallet_auth: Arc<WalletAuthenticator>,
    pub callbacks: Arc<RequestAuthenticator>,
    pub vault: VaultService,
    pub gateway: Option<Arc<dyn WalletGateway>>,
    pub limits: Arc<RateLimits>,
    pub store: Arc<RecordStore>,
    pub events: broadcast::Sender<VerifiedCallback>,
}

impl AppState {
    /// Build state from configuration, creating the data directory layout.
    ///
    /// Missing secrets leave their component unconfigured; the affected
    /// operations then fail with a configuration error.
    pub fn from_config(config: TrustConfig) -> Result<Self, TrustError> {
        let mut store = RecordStore::new(StoragePaths::new(&config.data_dir));
        store.initialize()?;

        let verifier: Arc<dyn CredentialVerifier> =
            Arc::new(HttpCredentialVerifier::new(
                config.github_api_base_url.clone(),
                config.cloudflare_api_base_url.clone(),
            )?);

        let gateway = match config.wallet_gateway_url.as_deref() {
            Some(url) => Some(Arc::new(HttpWalletGateway::new(
                url,
                config.wallet_gateway_secret.clone(),
            )?) as Arc<dyn WalletGateway>),
            None => None,
        };

        Self::build(config, Arc::new(store), verifier, gateway)
    }

    /// Assemble state from already-constructed collaborators.
    pub fn build(
        config: TrustConfig,
        store: Arc<RecordStore>,
        verifier: Arc<dyn CredentialVerifier>,
        gateway: Option<Arc<dyn WalletGateway>>,
    ) -> Result<Self, TrustError> {
        let vault = match config.vault_key.as_deref() {
            Some(key) => Some(Arc::new(SecretVault::new(key, &config.vault_legacy_keys)?)),
            None => {
                tracing::warn!("VAULT_KEY not set; vault uploads are disabled");
                None
            }
        };

        let callbacks = RequestAuthenticator::new(config.plugin_shared_secret.clone());
        if !callbacks.is_configured() {
            tracing::warn!("PLUGIN_SHARED_SECRET not set; plugin callbacks will be refused");
        }

        let challenges = Arc::new(ChallengeRegistry::new());
        let wallet_auth = WalletAuthenticator::with_default_verifiers(challenges.clone());
        let (events, _) = broadcast::channel(CALLBACK_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            challenges,
            wallet_auth: Arc::new(wallet_auth),
            callbacks: Arc::new(callbacks),
            vault: VaultService::new(vault, verifier, store.clone()),
            gateway,
            limits: Arc::new(RateLimits::new()),
            store,
            events,
        })
    }

    /// Subscribe to verified plugin callbacks.
    pub fn subscribe(&self) -> broadcast::Receiver<VerifiedCallback> {
        self.events.subscribe()
    }
}
