use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strongly typed ID for user accounts.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Serialize, Deserialize,
)]
pub struct UserId(pub Uuid);

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl UserId {
    pub fn new() -> Self {
        UserId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl AsRef<Uuid> for UserId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(UserId)
            .map_err(|e| ModelError::InvalidId(format!("user id: {e}")))
    }
}

/// Strongly typed ID for devices. A device row is created on every
/// authenticated login and revoked (not deleted) when the user removes it.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Serialize, Deserialize,
)]
pub struct DeviceId(pub Uuid);

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceId {
    pub fn new() -> Self {
        DeviceId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl AsRef<Uuid> for DeviceId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(DeviceId)
            .map_err(|e| ModelError::InvalidId(format!("device id: {e}")))
    }
}

/// Client-chosen opaque task identifier.
///
/// The server treats it as an opaque key scoped to the owning user; the only
/// constraints are non-emptiness and a length cap so the key fits index
/// pages.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

/// Upper bound on client-supplied task identifiers.
pub const MAX_TASK_ID_LEN: usize = 128;

impl TaskId {
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ModelError::InvalidId("task id cannot be empty".into()));
        }
        if value.len() > MAX_TASK_ID_LEN {
            return Err(ModelError::InvalidId(format!(
                "task id exceeds {MAX_TASK_ID_LEN} bytes"
            )));
        }
        Ok(TaskId(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TaskId::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> String {
        id.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_rejects_empty() {
        assert!(TaskId::new("").is_err());
    }

    #[test]
    fn task_id_rejects_oversized() {
        let long = "x".repeat(MAX_TASK_ID_LEN + 1);
        assert!(TaskId::new(long).is_err());
        let max = "x".repeat(MAX_TASK_ID_LEN);
        assert!(TaskId::new(max).is_ok());
    }

    #[test]
    fn task_id_deserialization_enforces_validation() {
        assert!(serde_json::from_str::<TaskId>(r#""""#).is_err());
        let id: TaskId = serde_json::from_str(r#""t-1""#).unwrap();
        assert_eq!(id.as_str(), "t-1");
    }

    #[test]
    fn user_id_round_trips_through_str() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
