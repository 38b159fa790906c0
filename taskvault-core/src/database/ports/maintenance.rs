use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Bulk retention deletes used by the scheduled cleanup.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait MaintenanceRepository: Send + Sync {
    /// Hard-deletes tombstoned tasks whose `deleted_at` is before the cutoff.
    async fn purge_tombstones(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Deletes conflict-log rows resolved before the cutoff.
    async fn purge_resolved_conflicts(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Deletes inactive devices not seen since the cutoff.
    async fn purge_inactive_devices(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
