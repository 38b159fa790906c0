use crate::error::Result;
use crate::task::{SyncMetadata, SyncOperationKind};
use async_trait::async_trait;
use taskvault_model::{DeviceId, UserId, VectorClock};

/// Sync metadata and the append-only operation audit.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    async fn upsert_metadata(&self, meta: &SyncMetadata) -> Result<()>;

    async fn get_metadata(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<Option<SyncMetadata>>;

    /// Most recent sync across all of the user's devices.
    async fn last_sync_at(&self, user_id: UserId)
    -> Result<Option<chrono::DateTime<chrono::Utc>>>;

    async fn record_operation(
        &self,
        user_id: UserId,
        device_id: DeviceId,
        kind: SyncOperationKind,
        vector_clock: &VectorClock,
    ) -> Result<()>;
}
