use crate::error::Result;
use crate::task::ConflictLogEntry;
use async_trait::async_trait;
use taskvault_model::UserId;

/// Append-only conflict log.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait ConflictsRepository: Send + Sync {
    async fn record(&self, entry: &ConflictLogEntry) -> Result<()>;

    /// Conflicts not yet resolved by any client.
    async fn unresolved_count(&self, user_id: UserId) -> Result<i64>;
}
