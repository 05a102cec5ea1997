// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential kinds accepted by the vault and their live verification.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::TrustError;

/// Kinds of values that are never stored.
pub const PASSWORD_TYPES: [&str; 7] = [
    "password",
    "panel_password",
    "hosting_password",
    "cpanel_password",
    "ftp_password",
    "sftp_password",
    "ssh_password",
];

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("onboarding-trust-server/", env!("CARGO_PKG_VERSION"));

/// Credential kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    /// GitHub personal access token, verified against the GitHub API.
    GithubToken,
    /// Cloudflare API token, verified with `user/tokens/verify`.
    CloudflareApiToken,
    HostingApiToken,
    ApiKey,
}

impl SecretType {
    /// Parse a client-supplied type, refusing password-like kinds.
    pub fn parse(raw: &str) -> Result<Self, TrustError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if PASSWORD_TYPES.contains(&normalized.as_str()) {
            return Err(TrustError::format(
                "Passwords are not accepted. Use an API token or key instead.",
            ));
        }
        match normalized.as_str() {
            "github_token" => Ok(SecretType::GithubToken),
            "cloudflare_api_token" => Ok(SecretType::CloudflareApiToken),
            "hosting_api_token" => Ok(SecretType::HostingApiToken),
            "api_key" => Ok(SecretType::ApiKey),
            _ => Err(TrustError::format(format!("Unsupported secret_type: {}", raw.trim()))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::GithubToken => "github_token",
            SecretType::CloudflareApiToken => "cloudflare_api_token",
            SecretType::HostingApiToken => "hosting_api_token",
            SecretType::ApiKey => "api_key",
        }
    }

    /// Whether the owning service must accept the value before it is stored.
    pub fn requires_live_verification(&self) -> bool {
        matches!(self, SecretType::GithubToken | SecretType::CloudflareApiToken)
    }
}

/// Return the first password-like field carrying a non-empty value.
pub fn find_password_field(body: &serde_json::Value) -> Option<&'static str> {
    PASSWORD_TYPES.into_iter().find(|field| {
        body.get(*field)
            .map(|v| match v {
                serde_json::Value::Null => false,
                serde_json::Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
            .unwrap_or(false)
    })
}

/// Checks a credential with the service that issued it.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns the account the credential belongs to, when the owning
    /// service reports one. Types without an owning service pass through.
    async fn verify(&self, secret_type: SecretType, secret: &str) -> Result<Option<String>, TrustError>;
}

/// Verifies GitHub tokens with `GET /user` and Cloudflare API tokens with
/// `GET /user/tokens/verify`.
#[derive(Debug, Clone)]
pub struct HttpCredentialVerifier {
    github_api_base_url: String,
    cloudflare_api_base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    #[serde(default)]
    login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CloudflareVerify {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<CloudflareToken>,
}

#[derive(Debug, Deserialize)]
struct CloudflareToken {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl HttpCredentialVerifier {
    pub fn new(
        github_api_base_url: impl Into<String>,
        cloudflare_api_base_url: impl Into<String>,
    ) -> Result<Self, TrustError> {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TrustError::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            github_api_base_url: github_api_base_url.into().trim_end_matches('/').to_string(),
            cloudflare_api_base_url: cloudflare_api_base_url
                .into()
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    async fn verify_github_token(&self, token: &str) -> Result<Option<String>, TrustError> {
        let response = self
            .client
            .get(format!("{}/user", self.github_api_base_url))
            .bearer_auth(token.trim())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "GitHub token verification request failed");
                TrustError::gateway("GitHub token verification failed")
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrustError::gateway(format!(
                "GitHub token verification failed ({})",
                status.as_u16()
            )));
        }

        let user = response.json::<GithubUser>().await.ok();
        Ok(user.and_then(|u| u.login))
    }

    /// Requires a 2xx reply with `success: true`; records `token:{id} ({status})`.
    async fn verify_cloudflare_token(&self, token: &str) -> Result<Option<String>, TrustError> {
        let response = self
            .client
            .get(format!("{}/user/tokens/verify", self.cloudflare_api_base_url))
            .bearer_auth(token.trim())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Cloudflare token verification request failed");
                TrustError::gateway("Cloudflare API token verification failed")
            })?;

        let status = response.status();
        let reply = response.json::<CloudflareVerify>().await.unwrap_or_default();
        if !status.is_success() || !reply.success {
            return Err(TrustError::gateway(format!(
                "Cloudflare API token could not be verified ({})",
                status.as_u16()
            )));
        }

        let token = reply.result.unwrap_or(CloudflareToken {
            id: None,
            status: None,
        });
        let token_status = token.status.unwrap_or_else(|| "active".to_string());
        Ok(Some(match token.id {
            Some(id) => format!("token:{id} ({token_status})"),
            None => format!("token ({token_status})"),
        }))
    }
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(&self, secret_type: SecretType, secret: &str) -> Result<Option<String>, TrustError> {
        match secret_type {
            SecretType::GithubToken => self.verify_github_token(secret).await,
            SecretType::CloudflareApiToken => self.verify_cloudflare_token(secret).await,
            SecretType::HostingApiToken | SecretType::ApiKey => Ok(None),
        }
    }
}
