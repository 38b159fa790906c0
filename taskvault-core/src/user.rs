//! User and device domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskvault_model::{AuthProvider, DeviceId, UserId};

/// Lifecycle state of an account. Only `active` accounts may authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Deleted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            "deleted" => Some(AccountStatus::Deleted),
            _ => None,
        }
    }
}

/// A user account, reconciled from an external OIDC identity.
///
/// There are no password fields: the only way into an account is the
/// provider flow, and `(auth_provider, provider_user_id)` is the primary
/// external identity. Email is unique across all providers so the same
/// mailbox cannot back two accounts.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub auth_provider: AuthProvider,
    pub provider_user_id: String,
    pub account_status: AccountStatus,
    /// Base64 salt uploaded by the client after passphrase setup; `None`
    /// until then, which tells clients to run encryption onboarding.
    pub encryption_salt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.account_status == AccountStatus::Active
    }
}

/// A device row. Created on every authenticated login, marked inactive (not
/// deleted) on revocation so audit history survives.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub user_id: UserId,
    pub device_name: String,
    pub last_seen_at: DateTime<Utc>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_status_round_trips() {
        for status in [
            AccountStatus::Active,
            AccountStatus::Suspended,
            AccountStatus::Deleted,
        ] {
            assert_eq!(AccountStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AccountStatus::parse("frozen"), None);
    }
}
