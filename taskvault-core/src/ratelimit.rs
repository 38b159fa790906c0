//! Rate limiting policy and fixed-window arithmetic.
//!
//! The counters themselves live in the KV store (`kv::ratelimit`); this
//! module owns the pure pieces: the per-endpoint policy table, identity
//! classification with its quota adjustments, window indexing, and the
//! decision math. Keeping these pure makes the 429 semantics testable
//! without Redis.

use serde::{Deserialize, Serialize};
use taskvault_model::UserId;

/// One endpoint bucket: at most `max_requests` per `window_secs` window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Per-endpoint rate limit configuration, one source of truth on `Config`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EndpointLimits {
    /// OAuth initiate/callback/result.
    pub auth: RateLimitRule,
    /// Token refresh.
    pub refresh: RateLimitRule,
    /// Push and pull.
    pub sync: RateLimitRule,
}

impl Default for EndpointLimits {
    fn default() -> Self {
        Self {
            auth: RateLimitRule {
                max_requests: 10,
                window_secs: 60,
            },
            refresh: RateLimitRule {
                max_requests: 60,
                window_secs: 3600,
            },
            sync: RateLimitRule {
                max_requests: 60,
                window_secs: 60,
            },
        }
    }
}

/// Consecutive exceeded windows before the brute-force escalation log fires.
pub const BLOCK_ESCALATION_THRESHOLD: u64 = 3;

/// Fraction of the limit at which a usage warning is logged once.
pub const NEAR_LIMIT_RATIO: f64 = 0.8;

/// Hard cap applied when no client identity at all is available.
pub const ANONYMOUS_CAP: u32 = 10;

/// Who is being limited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitIdentity {
    /// Authenticated requests are limited per user.
    User(UserId),
    /// Unauthenticated requests fall back to the client IP.
    Ip(String),
    /// No user and no IP header; the identity of last resort.
    Anonymous,
}

impl RateLimitIdentity {
    /// Key fragment for the KV counter. The KV namespace is ephemeral, so
    /// raw values are fine here; logs use `crypto::hash_ip` instead.
    pub fn key_fragment(&self) -> String {
        match self {
            RateLimitIdentity::User(id) => format!("user:{id}"),
            RateLimitIdentity::Ip(ip) => format!("ip:{ip}"),
            RateLimitIdentity::Anonymous => "anonymous".to_string(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, RateLimitIdentity::User(_))
    }
}

/// Effective request budget for an identity on a bucket.
///
/// Unauthenticated callers get half the budget on non-auth endpoints (they
/// should not be there without a token for long), and the anonymous
/// identity is additionally hard-capped.
pub fn effective_limit(
    rule: &RateLimitRule,
    identity: &RateLimitIdentity,
    is_auth_endpoint: bool,
) -> u32 {
    let base = match identity {
        RateLimitIdentity::User(_) => rule.max_requests,
        RateLimitIdentity::Ip(_) | RateLimitIdentity::Anonymous => {
            if is_auth_endpoint {
                rule.max_requests
            } else {
                (rule.max_requests / 2).max(1)
            }
        }
    };
    match identity {
        RateLimitIdentity::Anonymous => base.min(ANONYMOUS_CAP),
        _ => base,
    }
}

/// Fixed-window index; counters embed it so they age out by key.
pub fn window_index(now_secs: i64, window_secs: u64) -> i64 {
    now_secs / window_secs as i64
}

/// Seconds until the current window rolls over.
pub fn window_reset_secs(now_secs: i64, window_secs: u64) -> i64 {
    let window = window_secs as i64;
    (window_index(now_secs, window_secs) + 1) * window - now_secs
}

/// KV key of the request counter for one identity/path/window.
pub fn counter_key(identity: &RateLimitIdentity, path: &str, window: i64) -> String {
    format!("ratelimit:{}:{}:{}", identity.key_fragment(), path, window)
}

/// KV key of the consecutive-exceeded-windows counter.
pub fn blocked_key(identity: &RateLimitIdentity, path: &str) -> String {
    format!("ratelimit:blocked:{}:{}", identity.key_fragment(), path)
}

/// TTL for window counters: two windows, so the previous window's key is
/// still inspectable while the next one fills.
pub fn counter_ttl_secs(window_secs: u64) -> i64 {
    (window_secs * 2) as i64
}

/// TTL for the blocked counter: the escalation tracking horizon.
pub fn blocked_ttl_secs(window_secs: u64) -> i64 {
    (window_secs * 5) as i64
}

/// Decision for one request, computed from the post-increment counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the window after this one.
    pub remaining: u32,
    /// Seconds until the window resets; doubles as `Retry-After`.
    pub reset_secs: i64,
    /// True exactly when this request crosses the 80 % usage mark.
    pub crossed_warn_threshold: bool,
}

/// Evaluates a request given the counter value after increment.
pub fn evaluate(
    limit: u32,
    count_after_increment: u64,
    now_secs: i64,
    window_secs: u64,
) -> RateLimitDecision {
    let allowed = count_after_increment <= u64::from(limit);
    let remaining = u64::from(limit)
        .saturating_sub(count_after_increment)
        .min(u64::from(u32::MAX)) as u32;
    let warn_at = (f64::from(limit) * NEAR_LIMIT_RATIO).ceil() as u64;
    RateLimitDecision {
        allowed,
        limit,
        remaining,
        reset_secs: window_reset_secs(now_secs, window_secs),
        crossed_warn_threshold: allowed && count_after_increment == warn_at.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(max: u32, window: u64) -> RateLimitRule {
        RateLimitRule {
            max_requests: max,
            window_secs: window,
        }
    }

    #[test]
    fn authenticated_identity_keeps_full_quota() {
        let identity = RateLimitIdentity::User(UserId::new());
        assert_eq!(effective_limit(&rule(60, 60), &identity, false), 60);
        assert_eq!(effective_limit(&rule(10, 60), &identity, true), 10);
    }

    #[test]
    fn ip_identity_is_halved_off_auth_endpoints() {
        let identity = RateLimitIdentity::Ip("203.0.113.9".into());
        assert_eq!(effective_limit(&rule(60, 60), &identity, false), 30);
        // Auth endpoints are unauthenticated by nature; no halving there.
        assert_eq!(effective_limit(&rule(10, 60), &identity, true), 10);
    }

    #[test]
    fn anonymous_is_capped_at_ten() {
        let identity = RateLimitIdentity::Anonymous;
        assert_eq!(effective_limit(&rule(100, 60), &identity, false), 10);
        assert_eq!(effective_limit(&rule(100, 60), &identity, true), 10);
        // The cap never raises a smaller budget.
        assert_eq!(effective_limit(&rule(4, 60), &identity, false), 2);
    }

    #[test]
    fn window_index_is_stable_within_a_window() {
        assert_eq!(window_index(120, 60), 2);
        assert_eq!(window_index(179, 60), 2);
        assert_eq!(window_index(180, 60), 3);
    }

    #[test]
    fn reset_counts_down_to_the_window_edge() {
        assert_eq!(window_reset_secs(120, 60), 60);
        assert_eq!(window_reset_secs(179, 60), 1);
    }

    #[test]
    fn exactly_limit_is_allowed_then_blocked() {
        let d = evaluate(10, 10, 0, 60);
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);

        let d = evaluate(10, 11, 0, 60);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_secs, 60);
    }

    #[test]
    fn warn_threshold_fires_once_at_eighty_percent() {
        // limit 10 -> warn at count 8, and only there.
        assert!(!evaluate(10, 7, 0, 60).crossed_warn_threshold);
        assert!(evaluate(10, 8, 0, 60).crossed_warn_threshold);
        assert!(!evaluate(10, 9, 0, 60).crossed_warn_threshold);
    }

    #[test]
    fn counter_keys_embed_the_window_index() {
        let identity = RateLimitIdentity::Ip("203.0.113.9".into());
        let key = counter_key(&identity, "/api/sync/push", 42);
        assert_eq!(key, "ratelimit:ip:203.0.113.9:/api/sync/push:42");
        assert_eq!(
            blocked_key(&identity, "/api/sync/push"),
            "ratelimit:blocked:ip:203.0.113.9:/api/sync/push"
        );
    }
}
