// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Proves who is on the other end of a request without holding any of
//! their private keys.
//!
//! ## Wallet Flow
//!
//! 1. Client requests a challenge for a provider, protocol and host
//! 2. Client signs the returned message with its wallet
//! 3. Server checks the challenge (unused, unexpired, byte-identical
//!    message), dispatches to the protocol verifier and consumes the nonce
//! 4. A `VerifiedIdentity` is returned to the caller
//!
//! ## Partner Callbacks
//!
//! Machine-to-machine calls carry `x-plugin-timestamp` and
//! `x-plugin-signature`, an HMAC-SHA256 over `timestamp.raw_body`. Calls
//! outside a five minute window are rejected even with a valid MAC.

pub mod callback;
pub mod challenge;
pub mod ed25519;
pub mod evm;
pub mod gateway;
pub mod wallet;

pub use callback::RequestAuthenticator;
pub use challenge::{Challenge, ChallengeRegistry, SignatureProtocol, WalletProvider};
pub use ed25519::Ed25519Verifier;
pub use evm::Eip191Verifier;
pub use gateway::{HttpWalletGateway, PluginWalletReport, WalletGateway};
pub use wallet::{SignatureVerifier, VerifiedIdentity, WalletAuthenticator, WalletProof};
