//! Fixed-window rate limiting with identity fallback and brute-force
//! escalation.
//!
//! Identity precedence: authenticated user id, then client IP
//! (CF-Connecting-IP / X-Real-IP / X-Forwarded-For), then the literal
//! `"anonymous"` with a hard cap. The policy table lives on `Config`; paths
//! without a bucket pass through untouched. A KV outage fails open with a
//! warning rather than taking the API down with it.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{error, warn};

use crate::infra::{app_state::AppState, errors::AppError};
use taskvault_core::auth::token::{TokenConfig, verify_session_token};
use taskvault_core::crypto::hash_ip;
use taskvault_core::ratelimit::{
    BLOCK_ESCALATION_THRESHOLD, EndpointLimits, RateLimitIdentity, RateLimitRule,
    blocked_key, blocked_ttl_secs, counter_key, counter_ttl_secs, effective_limit,
    evaluate, window_index,
};

/// Resolves the policy bucket for a request path. `true` marks the
/// pre-authentication endpoints whose quota is never halved.
pub fn bucket_for_path<'a>(
    limits: &'a EndpointLimits,
    path: &str,
) -> Option<(&'a RateLimitRule, bool)> {
    if path.starts_with("/api/auth/oauth/") || path == "/api/auth/oauth" {
        return Some((&limits.auth, true));
    }
    if path == "/api/auth/refresh" {
        return Some((&limits.refresh, false));
    }
    if path == "/api/sync/push" || path == "/api/sync/pull" {
        return Some((&limits.sync, false));
    }
    None
}

/// Client identity for limiting, in precedence order.
pub fn identify(headers: &HeaderMap, token: &TokenConfig) -> RateLimitIdentity {
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        && let Ok(claims) = verify_session_token(token, bearer)
    {
        return RateLimitIdentity::User(claims.sub);
    }

    for header_name in ["cf-connecting-ip", "x-real-ip", "x-forwarded-for"] {
        if let Some(value) = headers.get(header_name).and_then(|v| v.to_str().ok()) {
            let ip = value.split(',').next().unwrap_or("").trim();
            if !ip.is_empty() {
                return RateLimitIdentity::Ip(ip.to_string());
            }
        }
    }

    RateLimitIdentity::Anonymous
}

fn identity_for_logs(identity: &RateLimitIdentity) -> String {
    match identity {
        RateLimitIdentity::User(id) => format!("user:{id}"),
        RateLimitIdentity::Ip(ip) => format!("ip:{}", hash_ip(ip)),
        RateLimitIdentity::Anonymous => "anonymous".to_string(),
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let Some((rule, is_auth_endpoint)) = bucket_for_path(&state.config.limits, &path)
    else {
        return next.run(request).await;
    };

    let identity = identify(request.headers(), &state.token);
    let limit = effective_limit(rule, &identity, is_auth_endpoint);

    let now = Utc::now().timestamp();
    let window = window_index(now, rule.window_secs);
    let key = counter_key(&identity, &path, window);

    let count = match state
        .kv
        .incr_rate_counter(&key, counter_ttl_secs(rule.window_secs))
        .await
    {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, path = %path, "rate limiter unavailable, allowing request");
            return next.run(request).await;
        }
    };

    let decision = evaluate(limit, count, now, rule.window_secs);

    if decision.crossed_warn_threshold {
        warn!(
            identity = %identity_for_logs(&identity),
            path = %path,
            count,
            limit,
            "rate limit usage crossed 80%"
        );
    }

    if !decision.allowed {
        // First rejection in this window bumps the consecutive-blocked
        // counter; the escalation threshold flags likely brute force.
        if count == u64::from(limit) + 1 {
            let bkey = blocked_key(&identity, &path);
            match state
                .kv
                .incr_blocked_counter(&bkey, blocked_ttl_secs(rule.window_secs))
                .await
            {
                Ok(blocked_windows) if blocked_windows >= BLOCK_ESCALATION_THRESHOLD => {
                    error!(
                        identity = %identity_for_logs(&identity),
                        path = %path,
                        blocked_windows,
                        severity = "HIGH",
                        "repeated rate limit violations, potential brute force"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "failed to track rate limit escalation");
                }
            }
        }

        return rate_limited_response(decision.reset_secs, limit, now);
    }

    next.run(request).await
}

fn rate_limited_response(reset_secs: i64, limit: u32, now: i64) -> Response {
    let mut response = AppError::rate_limited(format!(
        "Too many requests. Please try again in {reset_secs} seconds."
    ))
    .into_response();

    let headers = response.headers_mut();
    if let Ok(value) = reset_secs.to_string().parse() {
        headers.insert(header::RETRY_AFTER, value);
    }
    if let Ok(value) = limit.to_string().parse() {
        headers.insert("x-ratelimit-limit", value);
    }
    headers.insert("x-ratelimit-remaining", "0".parse().expect("static header"));
    if let Ok(value) = (now + reset_secs).to_string().parse() {
        headers.insert("x-ratelimit-reset", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskvault_core::ratelimit::RateLimitIdentity;

    fn limits() -> EndpointLimits {
        EndpointLimits::default()
    }

    #[test]
    fn oauth_paths_use_the_auth_bucket() {
        let limits = limits();
        let (rule, is_auth) =
            bucket_for_path(&limits, "/api/auth/oauth/google/start").unwrap();
        assert_eq!(rule.max_requests, limits.auth.max_requests);
        assert!(is_auth);

        let (_, is_auth) = bucket_for_path(&limits, "/api/auth/oauth/callback").unwrap();
        assert!(is_auth);
    }

    #[test]
    fn sync_paths_use_the_sync_bucket() {
        let limits = limits();
        for path in ["/api/sync/push", "/api/sync/pull"] {
            let (rule, is_auth) = bucket_for_path(&limits, path).unwrap();
            assert_eq!(rule.max_requests, limits.sync.max_requests);
            assert!(!is_auth);
        }
    }

    #[test]
    fn unlisted_paths_are_not_limited() {
        let limits = limits();
        assert!(bucket_for_path(&limits, "/health").is_none());
        assert!(bucket_for_path(&limits, "/api/sync/status").is_none());
        assert!(bucket_for_path(&limits, "/api/devices").is_none());
    }

    #[test]
    fn ip_precedence_prefers_cf_connecting_ip() {
        let token = TokenConfig::new("0123456789abcdef0123456789abcdef");
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.8".parse().unwrap());
        headers.insert("cf-connecting-ip", "198.51.100.9".parse().unwrap());

        assert_eq!(
            identify(&headers, &token),
            RateLimitIdentity::Ip("198.51.100.9".into())
        );
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let token = TokenConfig::new("0123456789abcdef0123456789abcdef");
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.7, 10.0.0.1".parse().unwrap());
        assert_eq!(
            identify(&headers, &token),
            RateLimitIdentity::Ip("198.51.100.7".into())
        );
    }

    #[test]
    fn no_headers_means_anonymous() {
        let token = TokenConfig::new("0123456789abcdef0123456789abcdef");
        assert_eq!(
            identify(&HeaderMap::new(), &token),
            RateLimitIdentity::Anonymous
        );
    }

    #[test]
    fn valid_bearer_token_identifies_the_user() {
        let token = TokenConfig::new("0123456789abcdef0123456789abcdef");
        let user = taskvault_model::UserId::new();
        let (jwt, _) = taskvault_core::auth::token::mint_session_token(
            &token,
            user,
            "a@example.com",
            taskvault_model::DeviceId::new(),
        )
        .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {jwt}").parse().unwrap(),
        );
        assert_eq!(identify(&headers, &token), RateLimitIdentity::User(user));
    }
}
