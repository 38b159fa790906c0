use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::database::ports::sync_state::SyncStateRepository;
use crate::error::{Result, SyncError};
use crate::task::{SyncMetadata, SyncOperationKind, SyncStatus};
use taskvault_model::{DeviceId, UserId, VectorClock};

/// PostgreSQL-backed implementation of the `SyncStateRepository` port.
#[derive(Clone, Debug)]
pub struct PgSyncStateRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct MetadataRow {
    user_id: Uuid,
    device_id: Uuid,
    last_sync_at: DateTime<Utc>,
    last_push_vector: Json<VectorClock>,
    last_pull_vector: Json<VectorClock>,
    sync_status: String,
}

impl TryFrom<MetadataRow> for SyncMetadata {
    type Error = SyncError;

    fn try_from(row: MetadataRow) -> Result<SyncMetadata> {
        let sync_status = SyncStatus::parse(&row.sync_status).ok_or_else(|| {
            SyncError::Internal(format!(
                "unknown sync status {:?} for device {}",
                row.sync_status, row.device_id
            ))
        })?;
        Ok(SyncMetadata {
            user_id: UserId(row.user_id),
            device_id: DeviceId(row.device_id),
            last_sync_at: row.last_sync_at,
            last_push_vector: row.last_push_vector.0,
            last_pull_vector: row.last_pull_vector.0,
            sync_status,
        })
    }
}

impl PgSyncStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SyncStateRepository for PgSyncStateRepository {
    async fn upsert_metadata(&self, meta: &SyncMetadata) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (
                user_id, device_id, last_sync_at, last_push_vector,
                last_pull_vector, sync_status
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, device_id) DO UPDATE
            SET last_sync_at = EXCLUDED.last_sync_at,
                last_push_vector = EXCLUDED.last_push_vector,
                last_pull_vector = EXCLUDED.last_pull_vector,
                sync_status = EXCLUDED.sync_status
            "#,
        )
        .bind(meta.user_id.to_uuid())
        .bind(meta.device_id.to_uuid())
        .bind(meta.last_sync_at)
        .bind(Json(&meta.last_push_vector))
        .bind(Json(&meta.last_pull_vector))
        .bind(meta.sync_status.as_str())
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to upsert sync metadata: {e}")))?;
        Ok(())
    }

    async fn get_metadata(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<Option<SyncMetadata>> {
        let row: Option<MetadataRow> = sqlx::query_as(
            r#"
            SELECT user_id, device_id, last_sync_at, last_push_vector,
                   last_pull_vector, sync_status
            FROM sync_metadata
            WHERE user_id = $1 AND device_id = $2
            "#,
        )
        .bind(user_id.to_uuid())
        .bind(device_id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to get sync metadata: {e}")))?;
        row.map(SyncMetadata::try_from).transpose()
    }

    async fn last_sync_at(&self, user_id: UserId) -> Result<Option<DateTime<Utc>>> {
        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(last_sync_at) FROM sync_metadata WHERE user_id = $1",
        )
        .bind(user_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to read last sync: {e}")))?;
        Ok(last)
    }

    async fn record_operation(
        &self,
        user_id: UserId,
        device_id: DeviceId,
        kind: SyncOperationKind,
        vector_clock: &VectorClock,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_operations (user_id, device_id, operation, vector_clock)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id.to_uuid())
        .bind(device_id.to_uuid())
        .bind(kind.as_str())
        .bind(Json(vector_clock))
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to record sync operation: {e}")))?;
        Ok(())
    }
}
