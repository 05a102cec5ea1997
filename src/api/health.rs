// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

const OK: &str = "ok";
const UNCONFIGURED: &str = "unconfigured";
const UNAVAILABLE: &str = "unavailable";

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Plugin callback verification ("ok" or "unconfigured").
    pub callbacks: String,
    /// Vault encryption key ("ok" or "unconfigured").
    pub vault: String,
    /// External wallet verification gateway ("ok" or "unconfigured").
    pub gateway: String,
    /// Record store directory ("ok" or "unavailable").
    pub data_dir: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn configured(flag: bool) -> String {
    if flag { OK } else { UNCONFIGURED }.to_string()
}

/// Health check endpoint handler.
///
/// Unconfigured optional components are reported but do not degrade the
/// service; an unusable data directory does.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let data_ok = state.store.health_check().is_ok();

    let response = ReadyResponse {
        status: if data_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: OK.to_string(),
            callbacks: configured(state.callbacks.is_configured()),
            vault: configured(state.vault.is_configured()),
            gateway: configured(state.gateway.is_some()),
            data_dir: if data_ok { OK } else { UNAVAILABLE }.to_string(),
        },
    };

    let status = if data_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: OK.to_string(),
    })
}
