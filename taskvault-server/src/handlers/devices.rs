//! Device listing and revocation.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::Utc;
use tracing::info;

use crate::infra::{app_state::AppState, errors::{AppError, AppResult}};
use crate::middleware::auth::AuthContext;
use taskvault_core::database::ports::DevicesRepository;
use taskvault_model::{Ack, DeviceId, DeviceInfo, DevicesResponse};

/// `GET /api/devices`
pub async fn list_devices(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<DevicesResponse>> {
    let devices = state.db.devices().list_for_user(ctx.user_id).await?;

    let devices = devices
        .into_iter()
        .map(|device| DeviceInfo {
            device_id: device.id,
            device_name: device.device_name,
            last_seen_at: device.last_seen_at.timestamp_millis(),
            is_active: device.is_active,
            current: device.id == ctx.device_id,
        })
        .collect();

    Ok(Json(DevicesResponse { devices }))
}

/// `DELETE /api/devices/{id}`
///
/// Marks the device inactive and revokes every session bound to it. The
/// device row itself survives for audit; user data is never touched.
pub async fn revoke_device(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(device_id): Path<String>,
) -> AppResult<Json<Ack>> {
    let device_id: DeviceId = device_id
        .parse()
        .map_err(|_| AppError::bad_request("Invalid device id"))?;

    let matched = state
        .db
        .devices()
        .deactivate(ctx.user_id, device_id)
        .await?;
    if !matched {
        return Err(AppError::not_found("Device not found"));
    }

    // Kill every session minted for this device.
    let sessions = state.kv.sessions_for_user(ctx.user_id).await?;
    let now = Utc::now().timestamp();
    let mut revoked = 0u32;
    for (jti, record) in sessions {
        if record.device_id != device_id {
            continue;
        }
        let remaining = (record.expires_at - now).max(1);
        state
            .kv
            .revoke_session(ctx.user_id, &jti, remaining)
            .await?;
        state.kv.delete_session(ctx.user_id, &jti).await?;
        revoked += 1;
    }

    info!(
        user_id = %ctx.user_id,
        device_id = %device_id,
        sessions_revoked = revoked,
        "device revoked"
    );
    Ok(Json(Ack::ok()))
}
