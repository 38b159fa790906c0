//! Origin-aware CORS and the fixed security header block.
//!
//! A tower middleware that:
//! - echoes the request origin when it is on the allow-list (plus
//!   development localhost ports), else falls back to the canonical
//!   production origin
//! - short-circuits OPTIONS preflights to 204 with the full header set
//! - stamps every response with the security header block and a no-store
//!   cache policy
//!
//! Uses precomputed `HeaderValue`s; nothing here allocates per request
//! beyond the echoed origin.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Method, Response, StatusCode, header},
};
use std::sync::Arc;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::debug;

use crate::infra::config::{Config, DEV_ORIGIN_PORTS};

/// Origin allow-list policy.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    canonical_origin: HeaderValue,
    dev_mode: bool,
}

impl CorsPolicy {
    pub fn from_config(config: &Config) -> Self {
        let canonical_origin = HeaderValue::from_str(config.canonical_origin())
            .unwrap_or_else(|_| HeaderValue::from_static("https://taskvault.app"));
        Self {
            allowed_origins: config.allowed_origins.clone(),
            canonical_origin,
            dev_mode: config.is_development(),
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.iter().any(|o| o == origin) {
            return true;
        }
        self.dev_mode && is_dev_origin(origin)
    }

    /// Header value for `Access-Control-Allow-Origin`: echo when allowed,
    /// canonical otherwise.
    pub fn resolve(&self, origin: Option<&HeaderValue>) -> HeaderValue {
        match origin.and_then(|v| v.to_str().ok()) {
            Some(origin) if self.is_allowed(origin) => origin
                .parse()
                .unwrap_or_else(|_| self.canonical_origin.clone()),
            _ => self.canonical_origin.clone(),
        }
    }
}

/// `http://localhost:{port}` / `http://127.0.0.1:{port}` on the known dev
/// ports only.
fn is_dev_origin(origin: &str) -> bool {
    let rest = match origin.strip_prefix("http://") {
        Some(rest) => rest,
        None => return false,
    };
    let (host, port) = match rest.split_once(':') {
        Some(parts) => parts,
        None => return false,
    };
    if host != "localhost" && host != "127.0.0.1" {
        return false;
    }
    port.parse::<u16>()
        .is_ok_and(|p| DEV_ORIGIN_PORTS.contains(&p))
}

/// Layer installing [`SecurityHeadersMiddleware`].
#[derive(Clone, Debug)]
pub struct SecurityHeadersLayer {
    policy: Arc<CorsPolicy>,
}

impl SecurityHeadersLayer {
    pub fn new(policy: CorsPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        debug!("installing CORS/security-headers middleware layer");
        SecurityHeadersMiddleware {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// The middleware proper.
#[derive(Clone, Debug)]
pub struct SecurityHeadersMiddleware<S> {
    inner: S,
    policy: Arc<CorsPolicy>,
}

fn apply_headers(response: &mut Response<Body>, allow_origin: HeaderValue) {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
    );
}

impl<S> Service<Request<Body>> for SecurityHeadersMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let allow_origin = self.policy.resolve(req.headers().get(header::ORIGIN));

        if req.method() == Method::OPTIONS {
            // Preflight never reaches the router.
            return Box::pin(async move {
                let mut response = Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(Body::empty())
                    .unwrap_or_default();
                apply_headers(&mut response, allow_origin);
                Ok(response)
            });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(req).await?;
            apply_headers(&mut response, allow_origin);
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(dev: bool) -> CorsPolicy {
        CorsPolicy {
            allowed_origins: vec![
                "https://taskvault.app".into(),
                "https://beta.taskvault.app".into(),
            ],
            canonical_origin: HeaderValue::from_static("https://taskvault.app"),
            dev_mode: dev,
        }
    }

    #[test]
    fn allowed_origin_is_echoed() {
        let origin = HeaderValue::from_static("https://beta.taskvault.app");
        assert_eq!(
            policy(false).resolve(Some(&origin)),
            "https://beta.taskvault.app"
        );
    }

    #[test]
    fn unknown_origin_falls_back_to_canonical() {
        let origin = HeaderValue::from_static("https://evil.example");
        assert_eq!(policy(false).resolve(Some(&origin)), "https://taskvault.app");
        assert_eq!(policy(false).resolve(None), "https://taskvault.app");
    }

    #[test]
    fn localhost_is_allowed_only_in_development() {
        let p = policy(true);
        assert!(p.is_allowed("http://localhost:5173"));
        assert!(p.is_allowed("http://127.0.0.1:3000"));
        assert!(!p.is_allowed("http://localhost:9999"));
        assert!(!p.is_allowed("https://localhost:5173"));

        let p = policy(false);
        assert!(!p.is_allowed("http://localhost:5173"));
    }

    mod router {
        use super::*;
        use axum::{Router, routing::get};
        use tower::util::ServiceExt;

        fn app() -> Router {
            Router::new()
                .route("/health", get(|| async { "ok" }))
                .layer(SecurityHeadersLayer::new(policy(false)))
        }

        fn request(method: Method, origin: Option<&str>) -> Request {
            let mut builder = axum::http::Request::builder().method(method).uri("/health");
            if let Some(origin) = origin {
                builder = builder.header(header::ORIGIN, origin);
            }
            builder.body(Body::empty()).unwrap()
        }

        use axum::body::Body;

        #[tokio::test]
        async fn preflight_short_circuits_with_full_header_set() {
            let response = app()
                .oneshot(request(Method::OPTIONS, Some("https://taskvault.app")))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            let headers = response.headers();
            assert_eq!(
                headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
                "https://taskvault.app"
            );
            assert_eq!(
                headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
                "GET, POST, PUT, DELETE, OPTIONS"
            );
            assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "86400");
        }

        #[tokio::test]
        async fn every_response_carries_the_security_block() {
            let response = app()
                .oneshot(request(Method::GET, Some("https://evil.example")))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let headers = response.headers();
            // Disallowed origin falls back to the canonical one.
            assert_eq!(
                headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
                "https://taskvault.app"
            );
            assert_eq!(headers.get(header::VARY).unwrap(), "Origin");
            assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
            assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
            assert_eq!(
                headers.get(header::STRICT_TRANSPORT_SECURITY).unwrap(),
                "max-age=31536000; includeSubDomains"
            );
            assert_eq!(headers.get(header::REFERRER_POLICY).unwrap(), "no-referrer");
            assert_eq!(
                headers.get(header::CACHE_CONTROL).unwrap(),
                "no-store, no-cache, must-revalidate, private"
            );
        }
    }
}
