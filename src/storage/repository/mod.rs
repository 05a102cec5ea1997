// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the record store.

pub mod secrets;

pub use secrets::{SecretRepository, StoredSecret};
