// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{client_ip::ClientIp, json::ApiJson};
use crate::{
    auth::{SignatureProtocol, VerifiedIdentity, WalletProof, WalletProvider},
    error::TrustError,
    limiter::RatePolicy,
    state::AppState,
};

const WALLET_VERIFY_BUCKET: &str = "wallet_verify";
const WALLET_VERIFY_POLICY: RatePolicy = RatePolicy::per_minute(80);

/// Characters of a nonce that may appear in logs.
const NONCE_LOG_PREFIX_CHARS: usize = 8;

fn nonce_prefix(nonce: &str) -> &str {
    nonce
        .char_indices()
        .nth(NONCE_LOG_PREFIX_CHARS)
        .map_or(nonce, |(end, _)| &nonce[..end])
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    pub provider: WalletProvider,
    pub protocol: SignatureProtocol,
    /// Domain the user is signing in to, e.g. `app.example.com`.
    pub host: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub nonce: String,
    /// Exact text the wallet must sign.
    pub message: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/v1/auth/challenge",
    request_body = ChallengeRequest,
    tag = "Wallet Auth",
    responses(
        (status = 201, body = ChallengeResponse),
        (status = 400, description = "Malformed host or enum value"),
        (status = 429, description = "Too many challenge requests")
    )
)]
pub async fn issue_challenge(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(request): ApiJson<ChallengeRequest>,
) -> Result<(StatusCode, Json<ChallengeResponse>), TrustError> {
    let now = Utc::now();
    state.limits.admit_identity(&ip, now)?;

    let challenge = state
        .challenges
        .issue(request.provider, request.protocol, &request.host, now)?;

    tracing::info!(
        nonce_prefix = nonce_prefix(&challenge.nonce),
        provider = challenge.provider.as_str(),
        protocol = challenge.protocol.as_str(),
        host = %challenge.host,
        "Issued wallet challenge"
    );

    Ok((
        StatusCode::CREATED,
        Json(ChallengeResponse {
            nonce: challenge.nonce,
            message: challenge.message,
            issued_at: challenge.issued_at,
            expires_at: challenge.expires_at,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = WalletProof,
    tag = "Wallet Auth",
    responses(
        (status = 200, body = VerifiedIdentity),
        (status = 400, description = "Malformed address, signature or chain id"),
        (status = 401, description = "Expired, reused or mismatched challenge"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn verify_wallet(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(proof): ApiJson<WalletProof>,
) -> Result<Json<VerifiedIdentity>, TrustError> {
    let now = Utc::now();
    state
        .limits
        .admit_endpoint(WALLET_VERIFY_BUCKET, &ip, now, WALLET_VERIFY_POLICY)?;

    let identity = state.wallet_auth.verify(&proof, now).map_err(|e| {
        tracing::info!(
            error_code = e.error_code(),
            nonce_prefix = nonce_prefix(&proof.nonce),
            protocol = proof.protocol.as_str(),
            "Wallet verification rejected"
        );
        e
    })?;

    tracing::info!(
        protocol = identity.protocol.as_str(),
        address = %identity.address,
        "Wallet verified"
    );
    Ok(Json(identity))
}
