// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! `TrustConfig` snapshot loaded once at startup. Components receive the
//! values they need at construction and never read the environment directly.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for vault records | `./data` |
//! | `PLUGIN_SHARED_SECRET` | HMAC secret for signed partner callbacks | Required for callbacks |
//! | `VAULT_KEY` | Primary vault passphrase | Required for vault writes |
//! | `VAULT_LEGACY_KEYS` | Comma-separated rotated vault passphrases | Empty |
//! | `WALLET_VERIFY_GATEWAY_URL` | External wallet verification gateway | Optional |
//! | `WALLET_VERIFY_GATEWAY_SECRET` | HMAC secret for gateway requests | Optional |
//! | `GITHUB_API_BASE_URL` | Owning service for GitHub tokens | `https://api.github.com` |
//! | `CLOUDFLARE_API_BASE_URL` | Owning service for Cloudflare API tokens | `https://api.cloudflare.com/client/v4` |
//! | `CORS_ALLOWED_ORIGINS` | Comma-separated browser origins | Empty (permissive) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the vault record directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const PLUGIN_SHARED_SECRET_ENV: &str = "PLUGIN_SHARED_SECRET";
pub const VAULT_KEY_ENV: &str = "VAULT_KEY";
pub const VAULT_LEGACY_KEYS_ENV: &str = "VAULT_LEGACY_KEYS";
pub const WALLET_GATEWAY_URL_ENV: &str = "WALLET_VERIFY_GATEWAY_URL";
pub const WALLET_GATEWAY_SECRET_ENV: &str = "WALLET_VERIFY_GATEWAY_SECRET";
pub const GITHUB_API_BASE_URL_ENV: &str = "GITHUB_API_BASE_URL";
pub const CLOUDFLARE_API_BASE_URL_ENV: &str = "CLOUDFLARE_API_BASE_URL";
pub const CORS_ALLOWED_ORIGINS_ENV: &str = "CORS_ALLOWED_ORIGINS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_GITHUB_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_CLOUDFLARE_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Immutable configuration snapshot.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Shared secret for partner callbacks; `None` means callbacks answer 503.
    pub plugin_shared_secret: Option<String>,
    /// Primary vault passphrase; `None` means vault writes answer 503.
    pub vault_key: Option<String>,
    /// Rotated passphrases, tried in order after the primary.
    pub vault_legacy_keys: Vec<String>,
    pub wallet_gateway_url: Option<String>,
    pub wallet_gateway_secret: Option<String>,
    pub github_api_base_url: String,
    pub cloudflare_api_base_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub json_logs: bool,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            plugin_shared_secret: None,
            vault_key: None,
            vault_legacy_keys: Vec::new(),
            wallet_gateway_url: None,
            wallet_gateway_secret: None,
            github_api_base_url: DEFAULT_GITHUB_API_BASE_URL.to_string(),
            cloudflare_api_base_url: DEFAULT_CLOUDFLARE_API_BASE_URL.to_string(),
            cors_allowed_origins: Vec::new(),
            json_logs: false,
        }
    }
}

impl TrustConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            host: env_or_default(HOST_ENV, DEFAULT_HOST),
            port: env_optional(PORT_ENV)
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            data_dir: PathBuf::from(env_or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            plugin_shared_secret: env_optional(PLUGIN_SHARED_SECRET_ENV),
            vault_key: env_optional(VAULT_KEY_ENV),
            vault_legacy_keys: env_list(VAULT_LEGACY_KEYS_ENV),
            wallet_gateway_url: env_optional(WALLET_GATEWAY_URL_ENV),
            wallet_gateway_secret: env_optional(WALLET_GATEWAY_SECRET_ENV),
            github_api_base_url: env_or_default(
                GITHUB_API_BASE_URL_ENV,
                DEFAULT_GITHUB_API_BASE_URL,
            ),
            cloudflare_api_base_url: env_or_default(
                CLOUDFLARE_API_BASE_URL_ENV,
                DEFAULT_CLOUDFLARE_API_BASE_URL,
            ),
            cors_allowed_origins: env_list(CORS_ALLOWED_ORIGINS_ENV),
            json_logs: env_optional(LOG_FORMAT_ENV)
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }

    /// `host:port` string suitable for `SocketAddr` parsing.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| non_empty(&v))
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_list(name: &str) -> Vec<String> {
    env_optional(name)
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split a comma-separated list, dropping blank entries.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value.split(',').filter_map(non_empty).collect()
}
