use async_trait::async_trait;
use sqlx::{PgPool, types::Json};

use crate::database::ports::conflicts::ConflictsRepository;
use crate::error::{Result, SyncError};
use crate::task::ConflictLogEntry;
use taskvault_model::UserId;

/// PostgreSQL-backed implementation of the `ConflictsRepository` port.
#[derive(Clone, Debug)]
pub struct PgConflictsRepository {
    pool: PgPool,
}

impl PgConflictsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConflictsRepository for PgConflictsRepository {
    async fn record(&self, entry: &ConflictLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conflict_log (
                user_id, task_id, existing_clock, incoming_clock,
                reason, resolution, resolved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.user_id.to_uuid())
        .bind(entry.task_id.as_str())
        .bind(Json(&entry.existing_clock))
        .bind(Json(&entry.incoming_clock))
        .bind(entry.reason.as_str())
        .bind(&entry.resolution)
        .bind(entry.resolved_at)
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to record conflict: {e}")))?;
        Ok(())
    }

    async fn unresolved_count(&self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conflict_log WHERE user_id = $1 AND resolved_at IS NULL",
        )
        .bind(user_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to count conflicts: {e}")))?;
        Ok(count)
    }
}
