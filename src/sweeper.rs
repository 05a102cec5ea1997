// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sweeper
//!
//! Background task that drops expired challenges and fully stale rate-limit
//! buckets on a fixed interval. The same sweeps also run opportunistically
//! when a map grows past its threshold; this task bounds memory when traffic
//! stops before that happens.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::ChallengeRegistry;
use crate::limiter::RateLimits;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Longest window any rate-limit bucket uses.
const STALE_BUCKET_HORIZON: Duration = Duration::from_secs(60);

/// Periodic best-effort cleanup of process-local state.
pub struct Sweeper {
    challenges: Arc<ChallengeRegistry>,
    limits: Arc<RateLimits>,
    interval: Duration,
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub challenges: usize,
    pub buckets: usize,
}

impl Sweeper {
    pub fn new(challenges: Arc<ChallengeRegistry>, limits: Arc<RateLimits>) -> Self {
        Self {
            challenges,
            limits,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Sweeper starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Sweeper shutting down");
                    return;
                }
            }

            let report = self.sweep_once();
            if report != SweepReport::default() {
                debug!(
                    challenges = report.challenges,
                    buckets = report.buckets,
                    "Swept expired state"
                );
            }
        }
    }

    /// Run a single sweep now.
    pub fn sweep_once(&self) -> SweepReport {
        let now = Utc::now();
        SweepReport {
            challenges: self.challenges.sweep_expired(now),
            buckets: self.limits.sweep(now, STALE_BUCKET_HORIZON),
        }
    }
}
