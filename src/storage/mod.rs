// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Durable storage for vault records. The trust subsystem hands this layer
//! ciphertext envelopes and one-way metadata only; plaintext credentials are
//! never written.
//!
//! Challenges and rate-limit buckets are process-local and never persisted.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   vault/
//!     {secret_id}.json   # StoredSecret (type, label, mask, fingerprint, envelope)
//! ```

pub mod paths;
pub mod record_store;
pub mod repository;

pub use paths::StoragePaths;
pub use record_store::{RecordStore, StorageError, StorageResult};
pub use repository::{SecretRepository, StoredSecret};
