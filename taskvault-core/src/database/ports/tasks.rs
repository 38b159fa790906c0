use crate::error::Result;
use crate::task::EncryptedTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskvault_model::{DeviceId, TaskId, UserId, VectorClock};

/// Replacement payload for an accepted overwrite.
#[derive(Debug, Clone)]
pub struct TaskWrite {
    pub encrypted_blob: String,
    pub nonce: String,
    pub checksum: String,
    pub vector_clock: VectorClock,
    pub device_id: DeviceId,
}

/// Encrypted task storage, tombstones included.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait TasksRepository: Send + Sync {
    /// Loads a row regardless of tombstone state.
    async fn get(&self, user_id: UserId, task_id: &TaskId) -> Result<Option<EncryptedTask>>;

    /// Inserts a fresh row with version 1.
    async fn insert(&self, task: &EncryptedTask) -> Result<()>;

    /// Overwrites blob material, stores the incoming clock, clears any
    /// tombstone, and bumps version by exactly one. Returns the new version.
    async fn overwrite(
        &self,
        user_id: UserId,
        task_id: &TaskId,
        write: &TaskWrite,
    ) -> Result<i64>;

    /// Sets the tombstone and stores the incoming clock. Returns the new
    /// version.
    async fn soft_delete(
        &self,
        user_id: UserId,
        task_id: &TaskId,
        vector_clock: &VectorClock,
        device_id: DeviceId,
    ) -> Result<i64>;

    /// Number of live rows; the unit of the storage quota.
    async fn live_count(&self, user_id: UserId) -> Result<i64>;

    /// Approximate ciphertext bytes across live rows.
    async fn storage_used(&self, user_id: UserId) -> Result<i64>;

    /// Live rows with `updated_at >= since` and tombstones with
    /// `deleted_at >= since`, ordered by that timestamp ascending, at most
    /// `limit` rows. The bound is closed so millisecond ties are never lost.
    async fn pull_window(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EncryptedTask>>;

    /// Pointwise merge of the vector clocks of every live row.
    async fn server_clock(&self, user_id: UserId) -> Result<VectorClock>;

    /// Every row for the user, live and deleted, for the stats endpoint.
    async fn all_for_user(&self, user_id: UserId) -> Result<Vec<EncryptedTask>>;
}
