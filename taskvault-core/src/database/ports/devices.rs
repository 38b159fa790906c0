use crate::error::Result;
use crate::user::Device;
use async_trait::async_trait;
use taskvault_model::{DeviceId, UserId};

/// Device registry storage.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait DevicesRepository: Send + Sync {
    async fn create(&self, device: &Device) -> Result<()>;

    async fn get(&self, user_id: UserId, device_id: DeviceId) -> Result<Option<Device>>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Device>>;

    async fn count_active(&self, user_id: UserId) -> Result<i64>;

    /// Marks a device inactive. Returns false when no row matched.
    async fn deactivate(&self, user_id: UserId, device_id: DeviceId) -> Result<bool>;

    async fn touch_last_seen(&self, device_id: DeviceId) -> Result<()>;
}
