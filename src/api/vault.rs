// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential uploads from the partner plugin.
//!
//! Both routes are signed plugin calls: the envelope is checked against the
//! raw body before anything is parsed, and every record is bound to the
//! `session_id` that created it.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;

use super::{client_ip::ClientIp, plugin::verified_body};
use crate::{
    error::TrustError,
    limiter::RatePolicy,
    state::AppState,
    vault::{credentials::find_password_field, SecretUpload, UploadedSecret},
};

const VAULT_UPLOAD_BUCKET: &str = "vault_upload";
const VAULT_UPLOAD_POLICY: RatePolicy = RatePolicy::per_minute(60);

/// Refuse any password-like field before the body becomes a typed upload.
fn parse_upload(body: serde_json::Value) -> Result<SecretUpload, TrustError> {
    if let Some(field) = find_password_field(&body) {
        return Err(TrustError::format(format!(
            "Passwords are never stored; remove `{field}` and upload an API token instead"
        )));
    }
    serde_json::from_value(body).map_err(|e| TrustError::format(format!("Invalid upload: {e}")))
}

#[utoipa::path(
    post,
    path = "/v1/vault/secrets",
    request_body = SecretUpload,
    params(
        ("x-plugin-timestamp" = String, Header, description = "Unix time in seconds or milliseconds"),
        ("x-plugin-signature" = String, Header, description = "Hex HMAC-SHA256 of `timestamp.body`")
    ),
    tag = "Vault",
    responses(
        (status = 201, body = UploadedSecret),
        (status = 400, description = "Missing session, unknown or password type, empty value"),
        (status = 401, description = "Envelope rejected"),
        (status = 502, description = "Owning service rejected or could not be reached"),
        (status = 503, description = "Vault key or callback secret not configured")
    )
)]
pub async fn upload_secret(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadedSecret>), TrustError> {
    let now = Utc::now();
    state
        .limits
        .admit_endpoint(VAULT_UPLOAD_BUCKET, &ip, now, VAULT_UPLOAD_POLICY)?;

    let body = verified_body(&state, "vault_upload", &headers, &body, now)?;
    let upload = parse_upload(body)?;
    let uploaded = state.vault.upload(&upload, now).await?;
    Ok((StatusCode::CREATED, Json(uploaded)))
}

#[utoipa::path(
    put,
    path = "/v1/vault/secrets/{secret_id}",
    params(
        ("secret_id" = String, Path, description = "Identifier returned by the upload call"),
        ("x-plugin-timestamp" = String, Header, description = "Unix time in seconds or milliseconds"),
        ("x-plugin-signature" = String, Header, description = "Hex HMAC-SHA256 of `timestamp.body`")
    ),
    request_body = SecretUpload,
    tag = "Vault",
    responses(
        (status = 200, body = UploadedSecret),
        (status = 400, description = "Malformed id or upload"),
        (status = 401, description = "Envelope rejected"),
        (status = 404, description = "Secret not found for this session"),
        (status = 503, description = "Vault key or callback secret not configured")
    )
)]
pub async fn replace_secret(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(secret_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadedSecret>, TrustError> {
    let now = Utc::now();
    state
        .limits
        .admit_endpoint(VAULT_UPLOAD_BUCKET, &ip, now, VAULT_UPLOAD_POLICY)?;

    let body = verified_body(&state, "vault_replace", &headers, &body, now)?;
    let upload = parse_upload(body)?;
    let replaced = state.vault.replace(&secret_id, &upload, now).await?;
    Ok(Json(replaced))
}
