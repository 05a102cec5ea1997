// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error types surfaced by the trust subsystem.
//!
//! `TrustError` is the classified taxonomy every component returns. Each
//! variant maps to a stable `error_code` and an HTTP status so callers can
//! branch on the code without parsing messages. Unreadable JSON bodies are
//! folded into `Format` by the `ApiJson` extractor.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StorageError;

/// Classified failure of a trust operation.
///
/// Every failure is scoped to a single request; none is process-fatal.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// Malformed address, signature, timestamp, key or envelope encoding.
    #[error("{0}")]
    Format(String),

    /// Challenge unknown or past its expiry, or callback timestamp outside
    /// the accepted window.
    #[error("{0}")]
    Expired(String),

    /// Challenge nonce has already been consumed.
    #[error("Challenge has already been used")]
    AlreadyUsed,

    /// Message, provider, protocol or signature did not match.
    #[error("{0}")]
    Mismatch(String),

    /// A required secret (callback secret, vault key, gateway URL) is not configured.
    #[error("{0}")]
    Configuration(String),

    /// No candidate vault key authenticated the envelope.
    #[error("Secret could not be decrypted with any configured key")]
    Decryption,

    /// External verification call was unreachable or rejected the input.
    #[error("{0}")]
    Gateway(String),

    /// Admission control rejected the call.
    #[error("{0}")]
    RateLimited(String),

    /// Requested record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Persistent store failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Serialize)]
struct TrustErrorBody {
    error: String,
    error_code: String,
}

impl TrustError {
    pub fn format(message: impl Into<String>) -> Self {
        TrustError::Format(message.into())
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        TrustError::Mismatch(message.into())
    }

    pub fn expired(message: impl Into<String>) -> Self {
        TrustError::Expired(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        TrustError::Configuration(message.into())
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        TrustError::Gateway(message.into())
    }

    /// Get the stable error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            TrustError::Format(_) => "format_error",
            TrustError::Expired(_) => "expired",
            TrustError::AlreadyUsed => "already_used",
            TrustError::Mismatch(_) => "mismatch",
            TrustError::Configuration(_) => "service_unavailable",
            TrustError::Decryption => "decryption_error",
            TrustError::Gateway(_) => "gateway_error",
            TrustError::RateLimited(_) => "rate_limited",
            TrustError::NotFound(_) => "not_found",
            TrustError::Storage(_) => "storage_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TrustError::Format(_) => StatusCode::BAD_REQUEST,
            TrustError::Expired(_) | TrustError::AlreadyUsed | TrustError::Mismatch(_) => {
                StatusCode::UNAUTHORIZED
            }
            TrustError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            TrustError::Gateway(_) => StatusCode::BAD_GATEWAY,
            TrustError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            TrustError::NotFound(_) => StatusCode::NOT_FOUND,
            TrustError::Decryption | TrustError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for TrustError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(entity) => TrustError::NotFound(format!("{entity} not found")),
            other => TrustError::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for TrustError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(TrustErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
