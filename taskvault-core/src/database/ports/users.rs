use crate::error::Result;
use crate::user::User;
use async_trait::async_trait;
use taskvault_model::{AuthProvider, UserId};

/// User account storage.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait UsersRepository: Send + Sync {
    /// Inserts a new user row. Unique violations surface as
    /// `SyncError::Conflict` naming the constraint that fired.
    async fn create(&self, user: &User) -> Result<()>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>>;

    async fn get_by_provider_identity(
        &self,
        provider: AuthProvider,
        provider_user_id: &str,
    ) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn touch_last_login(&self, id: UserId) -> Result<()>;

    async fn set_encryption_salt(&self, id: UserId, salt: &str) -> Result<()>;
}
