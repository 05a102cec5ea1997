// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sliding-window admission control.
//!
//! Each key keeps the timestamps of its recent admissions. A check drops
//! timestamps older than the window, records the current call and admits it
//! iff the resulting count is within the limit. Rejected calls are recorded
//! too, so a caller hammering a closed bucket keeps it closed.
//!
//! The limiter is process-local and best-effort: it bounds memory by sweeping
//! fully stale keys once the map grows past a threshold, but it is not an LRU
//! and does not coordinate across instances.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::TrustError;

/// Map size above which the identity-creation limiter sweeps stale keys.
pub const IDENTITY_SWEEP_THRESHOLD: usize = 5_000;

/// Map size above which the endpoint limiter sweeps stale keys.
pub const ENDPOINT_SWEEP_THRESHOLD: usize = 10_000;

/// Window and admission count for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub window: Duration,
    pub max: usize,
}

impl RatePolicy {
    pub const fn per_minute(max: usize) -> Self {
        Self {
            window: Duration::from_secs(60),
            max,
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Strict limiter for identity creation (challenge issuance): 12 per minute per IP.
pub const IDENTITY_CREATION: RatePolicy = RatePolicy::per_minute(12);

/// Sliding-window limiter over string keys.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    sweep_threshold: usize,
}

impl RateLimiter {
    pub fn new(sweep_threshold: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            sweep_threshold,
        }
    }

    /// Record a call for `key` at `now` and report whether it is admitted.
    pub fn check(&self, key: &str, now: DateTime<Utc>, policy: RatePolicy) -> bool {
        let cutoff = policy.cutoff(now);
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        let entries = buckets.entry(key.to_string()).or_default();
        entries.retain(|ts| *ts > cutoff && *ts <= now);
        entries.push(now);
        let count = entries.len();

        if buckets.len() > self.sweep_threshold {
            let before = buckets.len();
            buckets.retain(|_, entries| entries.iter().any(|ts| *ts > cutoff));
            tracing::debug!(
                removed = before - buckets.len(),
                remaining = buckets.len(),
                "Swept stale rate-limit buckets"
            );
        }

        count <= policy.max
    }

    /// Remove every key with no admission newer than `now - window`.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = RatePolicy { window, max: 0 }.cutoff(now);
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, entries| entries.iter().any(|ts| *ts > cutoff));
        before - buckets.len()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two limiter scopes sharing a process.
#[derive(Debug)]
pub struct RateLimits {
    identity: RateLimiter,
    endpoint: RateLimiter,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            identity: RateLimiter::new(IDENTITY_SWEEP_THRESHOLD),
            endpoint: RateLimiter::new(ENDPOINT_SWEEP_THRESHOLD),
        }
    }
}

impl RateLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate identity creation for a caller IP.
    pub fn admit_identity(&self, caller: &str, now: DateTime<Utc>) -> Result<(), TrustError> {
        let key = caller_key(caller);
        if self.identity.check(&key, now, IDENTITY_CREATION) {
            Ok(())
        } else {
            tracing::warn!(bucket = "identity", "Rate limit exceeded");
            Err(TrustError::RateLimited(
                "Too many challenge requests. Please slow down.".to_string(),
            ))
        }
    }

    /// Gate a named endpoint bucket for a caller IP.
    pub fn admit_endpoint(
        &self,
        bucket: &str,
        caller: &str,
        now: DateTime<Utc>,
        policy: RatePolicy,
    ) -> Result<(), TrustError> {
        let key = format!("{bucket}:{}", caller_key(caller));
        if self.endpoint.check(&key, now, policy) {
            Ok(())
        } else {
            tracing::warn!(bucket, "Rate limit exceeded");
            Err(TrustError::RateLimited(
                "Too many requests. Please slow down.".to_string(),
            ))
        }
    }

    /// Sweep both scopes using `window` as the staleness horizon.
    pub fn sweep(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.identity.sweep(now, window) + self.endpoint.sweep(now, window)
    }
}

fn caller_key(caller: &str) -> String {
    let trimmed = caller.trim();
    if trimmed.is_empty() {
        "anon".to_string()
    } else {
        trimmed.to_string()
    }
}
