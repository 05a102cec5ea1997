// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::extract::{rejection::JsonRejection, FromRequest};

use crate::error::TrustError;

/// `axum::Json` whose rejections are classified format errors (400) with the
/// standard error body, instead of axum's plain-text 415/422.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(TrustError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for TrustError {
    fn from(rejection: JsonRejection) -> Self {
        TrustError::format(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "snake_case")]
    enum Kind {
        Known,
    }

    #[derive(Debug, Deserialize)]
    struct Payload {
        kind: Kind,
    }

    fn json_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_variant_is_a_format_error() {
        let err = ApiJson::<Payload>::from_request(json_request(r#"{"kind":"other"}"#), &())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "format_error");
    }

    #[tokio::test]
    async fn missing_content_type_is_a_format_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(r#"{"kind":"known"}"#))
            .unwrap();
        let err = ApiJson::<Payload>::from_request(request, &()).await.unwrap_err();
        assert!(matches!(err, TrustError::Format(_)));
    }

    #[tokio::test]
    async fn valid_body_parses() {
        let ApiJson(payload) = ApiJson::<Payload>::from_request(json_request(r#"{"kind":"known"}"#), &())
            .await
            .unwrap();
        assert!(matches!(payload.kind, Kind::Known));
    }
}
