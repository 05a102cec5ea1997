// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed partner-plugin callbacks.
//!
//! Both handlers take the raw body as `Bytes` so the envelope MAC is checked
//! against the exact bytes that were signed. Nothing is parsed until the
//! envelope verifies.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::client_ip::ClientIp;
use crate::{
    auth::{gateway::verify_with_gateway, PluginWalletReport, VerifiedIdentity},
    error::TrustError,
    limiter::RatePolicy,
    state::{AppState, VerifiedCallback},
};

/// Largest callback body accepted on plugin routes.
pub const MAX_CALLBACK_BODY_BYTES: usize = 350_000;

const PLUGIN_EVENTS_BUCKET: &str = "plugin_events";
const PLUGIN_EVENTS_POLICY: RatePolicy = RatePolicy::per_minute(120);
const PLUGIN_WALLET_BUCKET: &str = "plugin_wallet_verify";
const PLUGIN_WALLET_POLICY: RatePolicy = RatePolicy::per_minute(80);

const MAX_EVENT_TYPE_CHARS: usize = 80;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PluginEvent {
    pub event_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventAccepted {
    pub ok: bool,
    pub event_id: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PluginWalletVerified {
    pub ok: bool,
    pub session_id: String,
    pub identity: VerifiedIdentity,
    pub source: String,
}

/// Authenticate a signed plugin call and parse its body, logging any
/// rejection with its error code.
pub(super) fn verified_body<T: DeserializeOwned>(
    state: &AppState,
    route: &'static str,
    headers: &HeaderMap,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<T, TrustError> {
    state.callbacks.verify_json(headers, body, now).map_err(|e| {
        tracing::info!(route, error_code = e.error_code(), "Plugin callback rejected");
        e
    })
}

#[utoipa::path(
    post,
    path = "/v1/plugin/events",
    request_body = PluginEvent,
    params(
        ("x-plugin-timestamp" = String, Header, description = "Unix time in seconds or milliseconds"),
        ("x-plugin-signature" = String, Header, description = "Hex HMAC-SHA256 of `timestamp.body`")
    ),
    tag = "Plugin",
    responses(
        (status = 202, body = EventAccepted),
        (status = 400, description = "Malformed timestamp or body"),
        (status = 401, description = "Stale timestamp or bad signature"),
        (status = 503, description = "Callback secret not configured")
    )
)]
pub async fn receive_event(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<EventAccepted>), TrustError> {
    let now = Utc::now();
    state
        .limits
        .admit_endpoint(PLUGIN_EVENTS_BUCKET, &ip, now, PLUGIN_EVENTS_POLICY)?;

    let event: PluginEvent = verified_body(&state, "plugin_events", &headers, &body, now)?;

    let event_type = event.event_type.trim();
    if event_type.is_empty() {
        return Err(TrustError::format("event_type required"));
    }

    let callback = VerifiedCallback {
        event_id: format!("evt_{}", Uuid::new_v4().simple()),
        event_type: event_type.chars().take(MAX_EVENT_TYPE_CHARS).collect(),
        session_id: event
            .session_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        payload: event.payload,
        received_at: now,
    };

    let subscribers = state.events.send(callback.clone()).unwrap_or(0);
    tracing::info!(
        event_id = %callback.event_id,
        event_type = %callback.event_type,
        subscribers,
        "Plugin callback accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            ok: true,
            event_id: callback.event_id,
            received_at: now,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/plugin/wallet/verify",
    request_body = PluginWalletReport,
    params(
        ("x-plugin-timestamp" = String, Header, description = "Unix time in seconds or milliseconds"),
        ("x-plugin-signature" = String, Header, description = "Hex HMAC-SHA256 of `timestamp.body`")
    ),
    tag = "Plugin",
    responses(
        (status = 200, body = PluginWalletVerified),
        (status = 400, description = "Missing or malformed wallet fields"),
        (status = 401, description = "Envelope rejected or signature not verified"),
        (status = 502, description = "Gateway unreachable or rejected the call"),
        (status = 503, description = "Callback secret or gateway not configured")
    )
)]
pub async fn verify_plugin_wallet(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PluginWalletVerified>, TrustError> {
    let now = Utc::now();
    state
        .limits
        .admit_endpoint(PLUGIN_WALLET_BUCKET, &ip, now, PLUGIN_WALLET_POLICY)?;

    let report: PluginWalletReport =
        verified_body(&state, "plugin_wallet_verify", &headers, &body, now)?;

    let gateway = state
        .gateway
        .as_deref()
        .ok_or_else(|| TrustError::configuration("Wallet verification gateway is not configured"))?;

    let verification = verify_with_gateway(gateway, &report, now).await?;
    tracing::info!(
        session_id = %verification.session_id,
        address = %verification.identity.address,
        source = %verification.source,
        "Plugin wallet verified"
    );

    Ok(Json(PluginWalletVerified {
        ok: true,
        session_id: verification.session_id,
        identity: verification.identity,
        source: verification.source,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::http::HeaderValue;

    use crate::api::tests::{test_config, PLUGIN_SECRET};
    use crate::auth::callback::{sign, SIGNATURE_HEADER, TIMESTAMP_HEADER};
    use crate::auth::gateway::{GatewayRequest, GatewayVerdict};
    use crate::auth::{SignatureProtocol, WalletGateway};
    use crate::storage::{RecordStore, StoragePaths};
    use crate::vault::HttpCredentialVerifier;

    struct StubGateway {
        verified: bool,
        seen: Mutex<Vec<GatewayRequest>>,
    }

    #[async_trait]
    impl WalletGateway for StubGateway {
        async fn submit(&self, request: &GatewayRequest) -> Result<GatewayVerdict, TrustError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(GatewayVerdict {
                ok: true,
                verified: self.verified,
                wallet_address: None,
                source: Some("stub".to_string()),
                error: None,
            })
        }
    }

    fn state_with_gateway(
        gateway: Option<Arc<dyn WalletGateway>>,
    ) -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = RecordStore::new(StoragePaths::new(dir.path()));
        store.initialize().unwrap();
        let verifier = Arc::new(HttpCredentialVerifier::new("http://127.0.0.1:9", "http://127.0.0.1:9").unwrap());
        let state = AppState::build(config, Arc::new(store), verifier, gateway).unwrap();
        (dir, state)
    }

    fn signed_headers(body: &str, timestamp: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(timestamp).unwrap());
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&sign(PLUGIN_SECRET, timestamp, body.as_bytes())).unwrap(),
        );
        headers
    }

    fn now_ms() -> String {
        Utc::now().timestamp_millis().to_string()
    }

    fn ip() -> ClientIp {
        ClientIp("198.51.100.20".to_string())
    }

    #[tokio::test]
    async fn verified_event_is_published() {
        let (_dir, state) = state_with_gateway(None);
        let mut events = state.subscribe();

        let body = r#"{"event_type":"lead.forward","session_id":" s-1 ","payload":{"subject":"hi"}}"#;
        let (status, Json(accepted)) = receive_event(
            State(state),
            ip(),
            signed_headers(body, &now_ms()),
            Bytes::from(body),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(accepted.event_id.starts_with("evt_"));

        let published = events.recv().await.unwrap();
        assert_eq!(published.event_id, accepted.event_id);
        assert_eq!(published.event_type, "lead.forward");
        assert_eq!(published.session_id.as_deref(), Some("s-1"));
        assert_eq!(published.payload["subject"], "hi");
    }

    #[tokio::test]
    async fn event_without_subscribers_is_still_accepted() {
        let (_dir, state) = state_with_gateway(None);
        let body = r#"{"event_type":"audit.sync"}"#;
        let result = receive_event(
            State(state),
            ip(),
            signed_headers(body, &now_ms()),
            Bytes::from(body),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn tampered_body_is_rejected_before_parsing() {
        let (_dir, state) = state_with_gateway(None);
        let signed = r#"{"event_type":"audit.sync"}"#;
        let headers = signed_headers(signed, &now_ms());

        let err = receive_event(State(state), ip(), headers, Bytes::from("not json at all"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "mismatch");
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected_with_valid_mac() {
        let (_dir, state) = state_with_gateway(None);
        let body = r#"{"event_type":"audit.sync"}"#;
        let stale = (Utc::now() - chrono::Duration::minutes(10))
            .timestamp_millis()
            .to_string();

        let err = receive_event(State(state), ip(), signed_headers(body, &stale), Bytes::from(body))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), "expired");
    }

    #[test]
    fn verified_body_keeps_the_rejection_class() {
        let (_dir, state) = state_with_gateway(None);
        let body = br#"{"event_type":"audit.sync"}"#;

        let mut unsigned = HeaderMap::new();
        unsigned.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&now_ms()).unwrap());
        let err = verified_body::<PluginEvent>(&state, "plugin_events", &unsigned, body, Utc::now())
            .unwrap_err();
        assert_eq!(err.error_code(), "mismatch");

        let err = verified_body::<PluginEvent>(
            &state,
            "plugin_events",
            &HeaderMap::new(),
            body,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "format_error");

        let headers = signed_headers(r#"{"event_type":"audit.sync"}"#, &now_ms());
        let event: PluginEvent =
            verified_body(&state, "plugin_events", &headers, body, Utc::now()).unwrap();
        assert_eq!(event.event_type, "audit.sync");
    }

    #[tokio::test]
    async fn missing_event_type_is_bad_request() {
        let (_dir, state) = state_with_gateway(None);
        let body = "";
        let err = receive_event(State(state), ip(), signed_headers(body, &now_ms()), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    fn wallet_body() -> String {
        serde_json::json!({
            "session_id": "sess-42",
            "wallet_address": "0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266",
            "wallet_signature": "0xdeadbeef",
            "wallet_message": "Sign in. Nonce: abc123",
            "wallet_nonce": "abc123",
            "wallet_chain_id": "0x1",
        })
        .to_string()
    }

    #[tokio::test]
    async fn plugin_wallet_verify_uses_gateway() {
        let gateway = Arc::new(StubGateway {
            verified: true,
            seen: Mutex::new(Vec::new()),
        });
        let (_dir, state) = state_with_gateway(Some(gateway.clone()));
        let body = wallet_body();

        let Json(result) = verify_plugin_wallet(
            State(state),
            ip(),
            signed_headers(&body, &now_ms()),
            Bytes::from(body.clone()),
        )
        .await
        .unwrap();

        assert!(result.ok);
        assert_eq!(result.session_id, "sess-42");
        assert_eq!(result.source, "stub");
        assert_eq!(result.identity.protocol, SignatureProtocol::Eip191);
        assert_eq!(
            result.identity.address,
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(result.identity.chain_id, Some(1));
        assert_eq!(gateway.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unverified_wallet_is_a_mismatch() {
        let gateway = Arc::new(StubGateway {
            verified: false,
            seen: Mutex::new(Vec::new()),
        });
        let (_dir, state) = state_with_gateway(Some(gateway));
        let body = wallet_body();

        let err = verify_plugin_wallet(
            State(state),
            ip(),
            signed_headers(&body, &now_ms()),
            Bytes::from(body.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "mismatch");
    }

    #[tokio::test]
    async fn missing_gateway_is_service_unavailable() {
        let (_dir, state) = state_with_gateway(None);
        let body = wallet_body();

        let err = verify_plugin_wallet(
            State(state),
            ip(),
            signed_headers(&body, &now_ms()),
            Bytes::from(body.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
