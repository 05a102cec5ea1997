// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use onboarding_trust_server::{
    api::router,
    config::{TrustConfig, DEFAULT_LOG_FILTER},
    shutdown::cancel_on_signal,
    state::AppState,
    sweeper::Sweeper,
};

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = TrustConfig::from_env();
    init_tracing(config.json_logs);

    let addr: SocketAddr = match config.bind_address().parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(address = %config.bind_address(), error = %e, "Invalid bind address");
            return ExitCode::FAILURE;
        }
    };

    let state = match AppState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialise trust subsystem");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let sweeper = Sweeper::new(state.challenges.clone(), state.limits.clone());
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));

    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    let app = router(state);
    tracing::info!(%addr, "Onboarding trust server listening (docs at /docs)");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
    .await;

    shutdown.cancel();
    if let Err(e) = sweeper_task.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }

    match served {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
