// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        callback::{SIGNATURE_HEADER, TIMESTAMP_HEADER},
        wallet::ChainIdInput,
        PluginWalletReport, SignatureProtocol, VerifiedIdentity, WalletProof, WalletProvider,
    },
    state::{AppState, VerifiedCallback},
    vault::{SecretType, SecretUpload, UploadedSecret},
};

pub mod client_ip;
pub mod health;
pub mod json;
pub mod plugin;
pub mod vault;
pub mod wallet_auth;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);
    let callback_limit = DefaultBodyLimit::max(plugin::MAX_CALLBACK_BODY_BYTES);

    let v1_routes = Router::new()
        .route("/auth/challenge", post(wallet_auth::issue_challenge))
        .route("/auth/verify", post(wallet_auth::verify_wallet))
        .route(
            "/plugin/events",
            post(plugin::receive_event).layer(callback_limit.clone()),
        )
        .route(
            "/plugin/wallet/verify",
            post(plugin::verify_plugin_wallet).layer(callback_limit.clone()),
        )
        .route(
            "/vault/secrets",
            post(vault::upload_secret).layer(callback_limit.clone()),
        )
        .route(
            "/vault/secrets/{secret_id}",
            put(vault::replace_secret).layer(callback_limit),
        );

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
}

/// Permissive when no origins are configured, otherwise an exact allow-list.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(TIMESTAMP_HEADER),
            HeaderName::from_static(SIGNATURE_HEADER),
        ])
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        wallet_auth::issue_challenge,
        wallet_auth::verify_wallet,
        plugin::receive_event,
        plugin::verify_plugin_wallet,
        vault::upload_secret,
        vault::replace_secret
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            wallet_auth::ChallengeRequest,
            wallet_auth::ChallengeResponse,
            WalletProvider,
            SignatureProtocol,
            ChainIdInput,
            WalletProof,
            VerifiedIdentity,
            plugin::PluginEvent,
            plugin::EventAccepted,
            plugin::PluginWalletVerified,
            PluginWalletReport,
            VerifiedCallback,
            SecretType,
            SecretUpload,
            UploadedSecret
        )
    ),
    tags(
        (name = "Health", description = "Liveness and component readiness"),
        (name = "Wallet Auth", description = "One-time signed wallet challenges"),
        (name = "Plugin", description = "Signed partner-plugin callbacks"),
        (name = "Vault", description = "Encrypted third-party credentials")
    )
)]
struct ApiDoc;
