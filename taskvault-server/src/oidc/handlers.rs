//! OIDC HTTP handlers: initiate, provider callback, result retrieval.
//!
//! The callback is browser navigation, so it never answers with bare JSON
//! errors: every failure still writes an error envelope to the result
//! mailbox (when a state record exists) and redirects back to the app's
//! callback page with `success=false`.

use axum::{
    Json,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::callback::{CallbackParams, parse_callback};
use super::exchange::{exchange_code, verify_id_token};
use super::identity::reconcile_user;
use super::{credentials, endpoints};
use crate::infra::{app_state::AppState, errors::{AppError, AppResult}};
use taskvault_core::crypto;
use taskvault_core::database::ports::DevicesRepository;
use taskvault_core::auth::token::mint_session_token;
use taskvault_core::error::SyncError;
use taskvault_core::kv::{OAuthResultRecord, OAuthStateRecord, SessionRecord};
use taskvault_core::user::Device;
use taskvault_model::{
    AuthData, AuthProvider, DeviceId, OAuthResultResponse, OAuthResultStatus,
    OAuthStartResponse,
};

/// `GET /api/auth/oauth/{provider}/start`
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<OAuthStartResponse>> {
    let provider: AuthProvider = provider
        .parse()
        .map_err(|_| AppError::bad_request(format!("Unknown OAuth provider: {provider}")))?;

    let creds = credentials(&state.config, provider).map_err(AppError::from)?;
    let endpoints = endpoints(provider);

    // The app origin rides along in the state record so the callback knows
    // where to send the browser back, even when the Origin header is gone.
    let app_origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|origin| state.cors.is_allowed(origin))
        .map(str::to_string)
        .unwrap_or_else(|| state.config.oauth_redirect_uri.clone());

    let state_token = crypto::generate_state();
    let verifier = crypto::generate_pkce_verifier();
    let callback_uri = state.config.callback_uri();

    let record = OAuthStateRecord {
        code_verifier: verifier.clone(),
        provider,
        callback_uri: callback_uri.clone(),
        app_origin,
        created_at: Utc::now().timestamp_millis(),
    };
    state
        .kv
        .put_oauth_state(&state_token, &record)
        .await
        .map_err(AppError::from)?;

    let mut auth_url = url::Url::parse(endpoints.auth_url)
        .map_err(|e| AppError::internal(format!("bad provider auth URL: {e}")))?;
    {
        let mut query = auth_url.query_pairs_mut();
        query.append_pair("client_id", &creds.client_id);
        query.append_pair("redirect_uri", &callback_uri);
        query.append_pair("response_type", "code");
        query.append_pair("scope", endpoints.scope);
        query.append_pair("state", &state_token);
        query.append_pair("code_challenge", &crypto::pkce_challenge(&verifier));
        query.append_pair("code_challenge_method", "S256");
        if provider == AuthProvider::Apple {
            query.append_pair("response_mode", "form_post");
        }
    }

    info!(provider = %provider, "oauth flow initiated");
    Ok(Json(OAuthStartResponse {
        auth_url: auth_url.into(),
        state: state_token,
    }))
}

/// `GET|POST /api/auth/oauth/callback`
pub async fn oauth_callback(State(state): State<AppState>, request: Request) -> Response {
    let fallback_origin = state.config.oauth_redirect_uri.clone();

    let params = match parse_callback(request).await {
        Ok(params) => params,
        Err(_) => {
            return redirect_failure(&fallback_origin, "Sign-in failed. Please try again.");
        }
    };

    let Some(state_token) = params.state.clone() else {
        return redirect_failure(&fallback_origin, "Sign-in failed. Please try again.");
    };

    // Single use: the record is deleted as it is read.
    let record = match state.kv.take_oauth_state(&state_token).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            // Expired or replayed state. A browser is on the other end, so
            // redirect with a friendly message instead of a JSON 400.
            warn!("oauth callback with unknown state token");
            return redirect_failure(
                &fallback_origin,
                "Your sign-in session has expired. Please try again.",
            );
        }
        Err(e) => {
            error!(error = %e, "failed to load oauth state");
            return redirect_failure(&fallback_origin, "Sign-in failed. Please try again.");
        }
    };

    let app_origin = record.app_origin.clone();
    let now_ms = Utc::now().timestamp_millis();

    match run_callback(&state, &params, &record).await {
        Ok(auth_data) => {
            let result = OAuthResultRecord {
                status: OAuthResultStatus::Success,
                auth_data: Some(auth_data),
                error: None,
                app_origin: app_origin.clone(),
                created_at: now_ms,
            };
            // The result write is the commit point: if it fails the client
            // sees 410 at retrieval and restarts the flow.
            if let Err(e) = state.kv.put_oauth_result(&state_token, &result).await {
                error!(error = %e, "failed to store oauth result");
                return redirect_failure(&app_origin, "Sign-in failed. Please try again.");
            }
            redirect_success(&app_origin, &state_token)
        }
        Err(user_message) => {
            let result = OAuthResultRecord {
                status: OAuthResultStatus::Error,
                auth_data: None,
                error: Some(user_message.clone()),
                app_origin: app_origin.clone(),
                created_at: now_ms,
            };
            if let Err(e) = state.kv.put_oauth_result(&state_token, &result).await {
                error!(error = %e, "failed to store oauth error result");
            }
            redirect_failure(&app_origin, &user_message)
        }
    }
}

/// Steps 3-8 of the callback: exchange, verify, reconcile, device, token.
/// Returns a user-facing message on failure; internal detail is logged here.
async fn run_callback(
    state: &AppState,
    params: &CallbackParams,
    record: &OAuthStateRecord,
) -> Result<AuthData, String> {
    if let Some(provider_error) = &params.error {
        return Err(if provider_error == "access_denied" {
            "Sign-in was cancelled.".to_string()
        } else {
            format!("The provider rejected the sign-in ({provider_error}).")
        });
    }

    let code = params
        .code
        .as_deref()
        .ok_or_else(|| "Sign-in failed. Please try again.".to_string())?;

    let provider = record.provider;
    let endpoints = endpoints(provider);
    let creds = credentials(&state.config, provider).map_err(|e| {
        error!(error = %e, provider = %provider, "provider credentials unavailable");
        "Sign-in failed. Please try again.".to_string()
    })?;

    let id_token = exchange_code(
        &state.http,
        endpoints,
        &creds,
        code,
        &record.code_verifier,
        &record.callback_uri,
    )
    .await
    .map_err(|e| {
        error!(error = %e, provider = %provider, "code exchange failed");
        "Sign-in failed. Please try again.".to_string()
    })?;

    let identity = verify_id_token(&state.http, endpoints, &creds.client_id, &id_token)
        .await
        .map_err(|e| match &e {
            SyncError::Unauthorized(msg) if msg.contains("not verified") => {
                "Your email address is not verified with the provider.".to_string()
            }
            _ => {
                error!(error = %e, provider = %provider, "id_token verification failed");
                "Sign-in failed. Please try again.".to_string()
            }
        })?;

    let user = reconcile_user(
        state.db.users(),
        provider,
        &identity.provider_user_id,
        &identity.email,
    )
    .await
    .map_err(|e| match &e {
        // Account-state and collision messages are written for end users.
        SyncError::Forbidden(msg) | SyncError::Conflict(msg) => msg.clone(),
        _ => {
            error!(error = %e, "identity reconciliation failed");
            "Sign-in failed. Please try again.".to_string()
        }
    })?;

    let device = Device {
        id: DeviceId::new(),
        user_id: user.id,
        device_name: format!("{} Device", provider.display_name()),
        last_seen_at: Utc::now(),
        is_active: true,
    };
    state.db.devices().create(&device).await.map_err(|e| {
        error!(error = %e, "device registration failed");
        "Sign-in failed. Please try again.".to_string()
    })?;

    let (token, claims) = mint_session_token(&state.token, user.id, &user.email, device.id)
        .map_err(|e| {
            error!(error = %e, "session token mint failed");
            "Sign-in failed. Please try again.".to_string()
        })?;

    let session = SessionRecord {
        device_id: device.id,
        issued_at: claims.iat,
        expires_at: claims.exp,
        last_activity: claims.iat,
    };
    state
        .kv
        .create_session(user.id, &claims.jti, &session)
        .await
        .map_err(|e| {
            error!(error = %e, "session record write failed");
            "Sign-in failed. Please try again.".to_string()
        })?;

    info!(user_id = %user.id, device_id = %device.id, provider = %provider, "oauth login complete");

    Ok(AuthData {
        user_id: user.id,
        device_id: device.id,
        email: user.email.clone(),
        token,
        expires_at: claims.expires_at_millis(),
        requires_encryption_setup: user.encryption_salt.is_none(),
        encryption_salt: user.encryption_salt,
        provider,
    })
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    state: String,
}

/// `GET /api/auth/oauth/result?state=...`
///
/// The single consumption channel for auth data. The first read deletes the
/// envelope; any later read is 410.
pub async fn oauth_result(
    State(state): State<AppState>,
    Query(query): Query<ResultQuery>,
) -> Response {
    match state.kv.take_oauth_result(&query.state).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(OAuthResultResponse {
                status: record.status,
                auth_data: record.auth_data,
                error: record.error,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::GONE,
            Json(OAuthResultResponse {
                status: OAuthResultStatus::Expired,
                auth_data: None,
                error: None,
            }),
        )
            .into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

fn redirect_success(app_origin: &str, state_token: &str) -> Response {
    let url = format!(
        "{}/oauth-callback.html?success=true&state={}",
        app_origin.trim_end_matches('/'),
        state_token
    );
    Redirect::to(&url).into_response()
}

fn redirect_failure(app_origin: &str, message: &str) -> Response {
    let encoded: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("error", message)
        .finish();
    let url = format!(
        "{}/oauth-callback.html?success=false&{}",
        app_origin.trim_end_matches('/'),
        encoded
    );
    Redirect::to(&url).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_redirect_encodes_the_message() {
        let response = redirect_failure(
            "https://taskvault.app/",
            "Your sign-in session has expired. Please try again.",
        );
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(location.starts_with("https://taskvault.app/oauth-callback.html?success=false&error="));
        assert!(!location.contains(' '));
    }

    #[test]
    fn success_redirect_carries_the_state() {
        let response = redirect_success("https://taskvault.app", "feedface");
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(
            location,
            "https://taskvault.app/oauth-callback.html?success=true&state=feedface"
        );
    }
}
