//! Polymorphic OAuth callback parsing.
//!
//! Providers reach the callback three ways: Google redirects with a query
//! string, Apple form-posts (`response_mode=form_post`), and tests or
//! retries may send JSON. One parser, one `(code, state)` record, dispatch
//! by method and content type.

use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{Method, header},
};
use serde::Deserialize;

use crate::infra::errors::AppError;

/// Parsed callback parameters; all optional so the handler can decide what
/// a missing field means.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Provider-reported error (e.g. the user cancelled consent).
    pub error: Option<String>,
}

/// Body size cap; callback payloads are tiny.
const MAX_CALLBACK_BODY: usize = 16 * 1024;

fn from_urlencoded(input: &[u8]) -> CallbackParams {
    let mut params = CallbackParams::default();
    for (key, value) in url::form_urlencoded::parse(input) {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    params
}

pub async fn parse_callback(request: Request) -> Result<CallbackParams, AppError> {
    if request.method() == Method::GET {
        let query = request.uri().query().unwrap_or("");
        return Ok(from_urlencoded(query.as_bytes()));
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let body: Body = request.into_body();
    let bytes = to_bytes(body, MAX_CALLBACK_BODY)
        .await
        .map_err(|_| AppError::bad_request("Callback body too large"))?;

    if content_type.starts_with("application/json") {
        serde_json::from_slice(&bytes)
            .map_err(|_| AppError::bad_request("Malformed JSON callback body"))
    } else {
        // Apple form_post and anything else that smells urlencoded.
        Ok(from_urlencoded(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn google_query_string_callback() {
        let request = axum::http::Request::builder()
            .method(Method::GET)
            .uri("/api/auth/oauth/callback?code=4%2FabcDEF&state=deadbeef")
            .body(Body::empty())
            .unwrap();
        let params = parse_callback(request).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("4/abcDEF"));
        assert_eq!(params.state.as_deref(), Some("deadbeef"));
        assert!(params.error.is_none());
    }

    #[tokio::test]
    async fn apple_form_post_callback() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/auth/oauth/callback")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("code=c0de&state=feedface"))
            .unwrap();
        let params = parse_callback(request).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("c0de"));
        assert_eq!(params.state.as_deref(), Some("feedface"));
    }

    #[tokio::test]
    async fn json_callback() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/auth/oauth/callback")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"code":"c0de","state":"feedface"}"#))
            .unwrap();
        let params = parse_callback(request).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("c0de"));
        assert_eq!(params.state.as_deref(), Some("feedface"));
    }

    #[tokio::test]
    async fn provider_error_is_carried_through() {
        let request = axum::http::Request::builder()
            .method(Method::GET)
            .uri("/api/auth/oauth/callback?error=access_denied&state=feedface")
            .body(Body::empty())
            .unwrap();
        let params = parse_callback(request).await.unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert!(params.code.is_none());
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/auth/oauth/callback")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{nope"))
            .unwrap();
        assert!(parse_callback(request).await.is_err());
    }
}
