use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::database::ports::tasks::{TaskWrite, TasksRepository};
use crate::error::{Result, SyncError};
use crate::task::EncryptedTask;
use taskvault_model::{DeviceId, TaskId, UserId, VectorClock};

/// PostgreSQL-backed implementation of the `TasksRepository` port.
///
/// Writes to one row are serialized by Postgres; the push algorithm
/// tolerates read-then-write races through vector-clock conflict detection
/// on the next sync, so no row locks are taken here.
#[derive(Clone, Debug)]
pub struct PgTasksRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct TaskRow {
    id: String,
    user_id: Uuid,
    encrypted_blob: String,
    nonce: String,
    checksum: String,
    version: i64,
    vector_clock: Json<VectorClock>,
    last_modified_device: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for EncryptedTask {
    type Error = SyncError;

    fn try_from(row: TaskRow) -> Result<EncryptedTask> {
        let task_id = TaskId::new(row.id)
            .map_err(|e| SyncError::Internal(format!("corrupt task id in storage: {e}")))?;
        Ok(EncryptedTask {
            task_id,
            user_id: UserId(row.user_id),
            encrypted_blob: row.encrypted_blob,
            nonce: row.nonce,
            checksum: row.checksum,
            version: row.version,
            vector_clock: row.vector_clock.0,
            last_modified_device: DeviceId(row.last_modified_device),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

const SELECT_TASK: &str = r#"
    SELECT id, user_id, encrypted_blob, nonce, checksum, version,
           vector_clock, last_modified_device, created_at, updated_at, deleted_at
    FROM encrypted_tasks
"#;

impl PgTasksRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TasksRepository for PgTasksRepository {
    async fn get(&self, user_id: UserId, task_id: &TaskId) -> Result<Option<EncryptedTask>> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("{SELECT_TASK} WHERE user_id = $1 AND id = $2"))
                .bind(user_id.to_uuid())
                .bind(task_id.as_str())
                .fetch_optional(self.pool())
                .await
                .map_err(|e| SyncError::Internal(format!("Failed to load task: {e}")))?;
        row.map(EncryptedTask::try_from).transpose()
    }

    async fn insert(&self, task: &EncryptedTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO encrypted_tasks (
                id, user_id, encrypted_blob, nonce, checksum, version,
                vector_clock, last_modified_device, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(task.task_id.as_str())
        .bind(task.user_id.to_uuid())
        .bind(&task.encrypted_blob)
        .bind(&task.nonce)
        .bind(&task.checksum)
        .bind(task.version)
        .bind(Json(&task.vector_clock))
        .bind(task.last_modified_device.to_uuid())
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to insert task: {e}")))?;
        Ok(())
    }

    async fn overwrite(
        &self,
        user_id: UserId,
        task_id: &TaskId,
        write: &TaskWrite,
    ) -> Result<i64> {
        let version: i64 = sqlx::query_scalar(
            r#"
            UPDATE encrypted_tasks
            SET encrypted_blob = $3,
                nonce = $4,
                checksum = $5,
                vector_clock = $6,
                last_modified_device = $7,
                version = version + 1,
                updated_at = NOW(),
                deleted_at = NULL
            WHERE user_id = $1 AND id = $2
            RETURNING version
            "#,
        )
        .bind(user_id.to_uuid())
        .bind(task_id.as_str())
        .bind(&write.encrypted_blob)
        .bind(&write.nonce)
        .bind(&write.checksum)
        .bind(Json(&write.vector_clock))
        .bind(write.device_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to overwrite task: {e}")))?;
        Ok(version)
    }

    async fn soft_delete(
        &self,
        user_id: UserId,
        task_id: &TaskId,
        vector_clock: &VectorClock,
        device_id: DeviceId,
    ) -> Result<i64> {
        let version: i64 = sqlx::query_scalar(
            r#"
            UPDATE encrypted_tasks
            SET vector_clock = $3,
                last_modified_device = $4,
                version = version + 1,
                updated_at = NOW(),
                deleted_at = NOW()
            WHERE user_id = $1 AND id = $2
            RETURNING version
            "#,
        )
        .bind(user_id.to_uuid())
        .bind(task_id.as_str())
        .bind(Json(vector_clock))
        .bind(device_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to soft-delete task: {e}")))?;
        Ok(version)
    }

    async fn live_count(&self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM encrypted_tasks WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to count live tasks: {e}")))?;
        Ok(count)
    }

    async fn storage_used(&self, user_id: UserId) -> Result<i64> {
        let bytes: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(LENGTH(encrypted_blob)), 0)::BIGINT
            FROM encrypted_tasks
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to sum storage: {e}")))?;
        Ok(bytes)
    }

    async fn pull_window(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EncryptedTask>> {
        // Closed lower bound on both timestamps so millisecond ties between
        // a client's cursor and a row are never dropped.
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            r#"
            {SELECT_TASK}
            WHERE user_id = $1
              AND (
                    (deleted_at IS NULL AND updated_at >= $2)
                 OR (deleted_at IS NOT NULL AND deleted_at >= $2)
              )
            ORDER BY COALESCE(deleted_at, updated_at) ASC, id ASC
            LIMIT $3
            "#
        ))
        .bind(user_id.to_uuid())
        .bind(since)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to read pull window: {e}")))?;

        rows.into_iter().map(EncryptedTask::try_from).collect()
    }

    async fn server_clock(&self, user_id: UserId) -> Result<VectorClock> {
        let clocks: Vec<Json<VectorClock>> = sqlx::query_scalar(
            "SELECT vector_clock FROM encrypted_tasks WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id.to_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to read clocks: {e}")))?;

        Ok(clocks
            .into_iter()
            .fold(VectorClock::new(), |acc, clock| acc.merge(&clock.0)))
    }

    async fn all_for_user(&self, user_id: UserId) -> Result<Vec<EncryptedTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "{SELECT_TASK} WHERE user_id = $1 ORDER BY updated_at ASC"
        ))
        .bind(user_id.to_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to list tasks: {e}")))?;

        rows.into_iter().map(EncryptedTask::try_from).collect()
    }
}
