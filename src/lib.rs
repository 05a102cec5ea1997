// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Onboarding Trust Server - wallet, callback and credential trust subsystem
//!
//! This crate proves control of a wallet through one-time signed challenges,
//! authenticates signed partner callbacks against replay, and envelope-encrypts
//! third-party credentials before they reach durable storage.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Wallet challenges, signature verifiers, callback envelopes, gateway
//! - `limiter` - Sliding-window admission control
//! - `shutdown` - Signal-driven graceful shutdown
//! - `storage` - On-disk records for vault ciphertext
//! - `sweeper` - Background cleanup of expired challenges and stale buckets
//! - `vault` - AES-256-GCM envelope encryption and the credential write path

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod limiter;
pub mod shutdown;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod vault;
