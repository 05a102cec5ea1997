// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller identity for rate limiting.
//!
//! ```rust,ignore
//! async fn my_handler(ClientIp(ip): ClientIp) -> impl IntoResponse { ... }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};

const CF_CONNECTING_IP: &str = "cf-connecting-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const ANONYMOUS: &str = "anon";

/// Best-effort caller address: `CF-Connecting-IP`, then the first
/// `X-Forwarded-For` entry, then the socket peer, then `anon`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientIp(resolve(&parts.headers, peer)))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn resolve(headers: &HeaderMap, peer: Option<String>) -> String {
    if let Some(ip) = header_value(headers, CF_CONNECTING_IP) {
        return ip.to_string();
    }
    if let Some(first) = header_value(headers, X_FORWARDED_FOR)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    peer.unwrap_or_else(|| ANONYMOUS.to_string())
}
