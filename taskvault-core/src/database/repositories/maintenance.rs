use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::database::ports::maintenance::MaintenanceRepository;
use crate::error::{Result, SyncError};

/// PostgreSQL-backed implementation of the `MaintenanceRepository` port.
#[derive(Clone, Debug)]
pub struct PgMaintenanceRepository {
    pool: PgPool,
}

impl PgMaintenanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MaintenanceRepository for PgMaintenanceRepository {
    async fn purge_tombstones(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM encrypted_tasks WHERE deleted_at IS NOT NULL AND deleted_at < $1",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to purge tombstones: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn purge_resolved_conflicts(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM conflict_log WHERE resolved_at IS NOT NULL AND resolved_at < $1",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to purge conflict log: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn purge_inactive_devices(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM devices WHERE is_active = FALSE AND last_seen_at < $1",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to purge devices: {e}")))?;
        Ok(result.rows_affected())
    }
}
