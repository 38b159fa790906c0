use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::database::ports::devices::DevicesRepository;
use crate::error::{Result, SyncError};
use crate::user::Device;
use taskvault_model::{DeviceId, UserId};

/// PostgreSQL-backed implementation of the `DevicesRepository` port.
#[derive(Clone, Debug)]
pub struct PgDevicesRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct DeviceRow {
    id: Uuid,
    user_id: Uuid,
    device_name: String,
    last_seen_at: DateTime<Utc>,
    is_active: bool,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Device {
        Device {
            id: DeviceId(row.id),
            user_id: UserId(row.user_id),
            device_name: row.device_name,
            last_seen_at: row.last_seen_at,
            is_active: row.is_active,
        }
    }
}

impl PgDevicesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DevicesRepository for PgDevicesRepository {
    async fn create(&self, device: &Device) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO devices (id, user_id, device_name, last_seen_at, is_active)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(device.id.to_uuid())
        .bind(device.user_id.to_uuid())
        .bind(&device.device_name)
        .bind(device.last_seen_at)
        .bind(device.is_active)
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to create device: {e}")))?;

        info!(device_id = %device.id, user_id = %device.user_id, "registered device");
        Ok(())
    }

    async fn get(&self, user_id: UserId, device_id: DeviceId) -> Result<Option<Device>> {
        let row: Option<DeviceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, device_name, last_seen_at, is_active
            FROM devices
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(device_id.to_uuid())
        .bind(user_id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to get device: {e}")))?;
        Ok(row.map(Device::from))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Device>> {
        let rows: Vec<DeviceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, device_name, last_seen_at, is_active
            FROM devices
            WHERE user_id = $1
            ORDER BY last_seen_at DESC
            "#,
        )
        .bind(user_id.to_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to list devices: {e}")))?;
        Ok(rows.into_iter().map(Device::from).collect())
    }

    async fn count_active(&self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM devices WHERE user_id = $1 AND is_active",
        )
        .bind(user_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to count devices: {e}")))?;
        Ok(count)
    }

    async fn deactivate(&self, user_id: UserId, device_id: DeviceId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE devices SET is_active = FALSE WHERE id = $1 AND user_id = $2",
        )
        .bind(device_id.to_uuid())
        .bind(user_id.to_uuid())
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to deactivate device: {e}")))?;

        let matched = result.rows_affected() > 0;
        if matched {
            info!(device_id = %device_id, user_id = %user_id, "device revoked");
        }
        Ok(matched)
    }

    async fn touch_last_seen(&self, device_id: DeviceId) -> Result<()> {
        sqlx::query("UPDATE devices SET last_seen_at = NOW() WHERE id = $1")
            .bind(device_id.to_uuid())
            .execute(self.pool())
            .await
            .map_err(|e| {
                SyncError::Internal(format!("Failed to touch device last_seen: {e}"))
            })?;
        Ok(())
    }
}
