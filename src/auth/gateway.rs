// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet verification delegated to an external gateway.
//!
//! Partner plugins that run their own wallet login report the signed
//! message here. The call itself arrives as a signed callback; this module
//! validates the reported fields and asks the gateway, in a single round
//! trip, whether the signature is genuine.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::callback::hmac_sha256;
use super::challenge::SignatureProtocol;
use super::evm::normalize_evm_address;
use super::wallet::{ChainIdInput, VerifiedIdentity};
use crate::error::TrustError;

/// Header carrying the hex HMAC of the request body.
pub const GATEWAY_SIGNATURE_HEADER: &str = "x-wallet-verify-signature";

/// Source reported when the gateway does not name one.
const DEFAULT_SOURCE: &str = "wallet_verify_gateway";

const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Wallet login reported by a partner plugin.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PluginWalletReport {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub wallet_signature: String,
    #[serde(default)]
    pub wallet_message: String,
    #[serde(default)]
    pub wallet_nonce: String,
    #[serde(default)]
    pub wallet_chain_id: Option<ChainIdInput>,
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_login: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Body sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub session_id: String,
    pub wallet_address: String,
    pub wallet_signature: String,
    pub wallet_message: String,
    pub wallet_nonce: String,
    pub wallet_chain_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// Gateway reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayVerdict {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of a gateway-delegated verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GatewayVerification {
    pub session_id: String,
    pub identity: VerifiedIdentity,
    pub source: String,
}

/// Something that can answer a wallet verification request.
#[async_trait]
pub trait WalletGateway: Send + Sync {
    /// Submit one request. Transport failures and non-`ok` replies are
    /// `Gateway` errors; the verdict is returned as-is otherwise.
    async fn submit(&self, request: &GatewayRequest) -> Result<GatewayVerdict, TrustError>;
}

/// Gateway reached over HTTPS with an optional HMAC-signed body.
#[derive(Clone)]
pub struct HttpWalletGateway {
    url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpWalletGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWalletGateway")
            .field("url", &self.url)
            .field("signed", &self.secret.is_some())
            .finish()
    }
}

impl HttpWalletGateway {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Result<Self, TrustError> {
        let client = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| TrustError::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            secret: secret.filter(|s| !s.trim().is_empty()),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WalletGateway for HttpWalletGateway {
    async fn submit(&self, request: &GatewayRequest) -> Result<GatewayVerdict, TrustError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| TrustError::gateway(format!("Failed to encode gateway request: {e}")))?;

        let mut builder = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            let signature = alloy::hex::encode(hmac_sha256(secret.as_bytes(), &[body.as_slice()]));
            builder = builder.header(GATEWAY_SIGNATURE_HEADER, signature);
        }

        let response = builder.body(body).send().await.map_err(|e| {
            tracing::warn!(error = %e, "Wallet verification gateway unreachable");
            TrustError::gateway("Wallet verification gateway request failed")
        })?;

        let status = response.status();
        let verdict = response.json::<GatewayVerdict>().await.ok();
        match verdict {
            Some(verdict) if status.is_success() && verdict.ok => Ok(verdict),
            other => Err(TrustError::gateway(
                other.and_then(|v| v.error).unwrap_or_else(|| {
                    format!("Wallet verification gateway failed ({})", status.as_u16())
                }),
            )),
        }
    }
}

fn required(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn optional(value: &Option<String>) -> Option<String> {
    value.as_deref().and_then(required)
}

/// Validate a plugin wallet report and ask the gateway to verify it.
pub async fn verify_with_gateway(
    gateway: &dyn WalletGateway,
    report: &PluginWalletReport,
    now: DateTime<Utc>,
) -> Result<GatewayVerification, TrustError> {
    let session_id =
        required(&report.session_id).ok_or_else(|| TrustError::format("session_id required"))?;

    let (address, signature, message, nonce) = match (
        required(&report.wallet_address),
        required(&report.wallet_signature),
        required(&report.wallet_message),
        required(&report.wallet_nonce),
    ) {
        (Some(a), Some(s), Some(m), Some(n)) => (a, s, m, n),
        _ => {
            return Err(TrustError::format(
                "wallet_address, wallet_signature, wallet_message, wallet_nonce required",
            ))
        }
    };

    let normalized = normalize_evm_address(&address)
        .ok_or_else(|| TrustError::format("Invalid wallet_address format"))?;
    if !message.contains(&nonce) {
        return Err(TrustError::mismatch("Wallet challenge nonce mismatch"));
    }

    let chain_id = match &report.wallet_chain_id {
        Some(input) => input.normalize()?,
        None => 1,
    };

    let request = GatewayRequest {
        session_id: session_id.clone(),
        wallet_address: address,
        wallet_signature: signature,
        wallet_message: message,
        wallet_nonce: nonce,
        wallet_chain_id: chain_id,
        site_url: optional(&report.site_url),
        user_id: report.user_id,
        user_login: optional(&report.user_login),
        user_email: optional(&report.user_email),
    };

    let verdict = gateway.submit(&request).await?;
    if !verdict.verified {
        return Err(TrustError::mismatch(
            verdict
                .error
                .unwrap_or_else(|| "Wallet signature not verified".to_string()),
        ));
    }

    let address = verdict
        .wallet_address
        .as_deref()
        .and_then(normalize_evm_address)
        .unwrap_or(normalized);

    Ok(GatewayVerification {
        session_id,
        identity: VerifiedIdentity {
            protocol: SignatureProtocol::Eip191,
            address,
            chain_id: Some(chain_id),
            verified_at: now,
        },
        source: verdict
            .source
            .and_then(|s| required(&s))
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
    })
}
