//! Route constants and router assembly.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, devices, health, sync};
use crate::infra::app_state::AppState;
use crate::middleware::{
    auth::auth_middleware, cors::SecurityHeadersLayer, rate_limit::rate_limit_middleware,
};
use crate::oidc;

/// API route definitions shared between the router and its tests.
pub mod paths {
    pub const HEALTH: &str = "/health";

    pub mod auth {
        pub const OAUTH_START: &str = "/api/auth/oauth/{provider}/start";
        pub const OAUTH_CALLBACK: &str = "/api/auth/oauth/callback";
        pub const OAUTH_RESULT: &str = "/api/auth/oauth/result";
        pub const LOGOUT: &str = "/api/auth/logout";
        pub const REFRESH: &str = "/api/auth/refresh";
        pub const ENCRYPTION_SALT: &str = "/api/auth/encryption-salt";
    }

    pub mod sync {
        pub const PUSH: &str = "/api/sync/push";
        pub const PULL: &str = "/api/sync/pull";
        pub const RESOLVE: &str = "/api/sync/resolve";
        pub const STATUS: &str = "/api/sync/status";
    }

    pub const STATS: &str = "/api/stats";

    pub mod devices {
        pub const COLLECTION: &str = "/api/devices";
        pub const ITEM: &str = "/api/devices/{id}";
    }
}

/// Assembles the full application router.
///
/// Layer order, outermost first: tracing, CORS/security headers (handles
/// preflight), rate limiting (table-driven by path), then per-route
/// authentication on the protected group.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route(paths::HEALTH, get(health::health))
        .route(paths::auth::OAUTH_START, get(oidc::handlers::oauth_start))
        .route(
            paths::auth::OAUTH_CALLBACK,
            get(oidc::handlers::oauth_callback).post(oidc::handlers::oauth_callback),
        )
        .route(paths::auth::OAUTH_RESULT, get(oidc::handlers::oauth_result));

    let protected = Router::new()
        .route(paths::auth::LOGOUT, post(auth::logout))
        .route(paths::auth::REFRESH, post(auth::refresh))
        .route(
            paths::auth::ENCRYPTION_SALT,
            get(auth::get_encryption_salt).post(auth::set_encryption_salt),
        )
        .route(paths::sync::PUSH, post(sync::push))
        .route(paths::sync::PULL, post(sync::pull))
        .route(paths::sync::RESOLVE, post(sync::resolve))
        .route(paths::sync::STATUS, get(sync::status))
        .route(paths::STATS, get(sync::stats))
        .route(paths::devices::COLLECTION, get(devices::list_devices))
        .route(paths::devices::ITEM, delete(devices::revoke_device))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public)
        .merge(protected)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(SecurityHeadersLayer::new((*state.cors).clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Not found" })),
    )
}
