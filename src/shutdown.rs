// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;

/// Cancel `shutdown` once `signal` fires.
///
/// If the signal cannot be listened for, the token is left alone so the
/// server keeps running instead of stopping at startup.
pub async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
