//! Identity reconciliation: provider identity -> user row.

use chrono::Utc;
use tracing::info;

use taskvault_core::database::ports::users::UsersRepository;
use taskvault_core::error::{Result, SyncError};
use taskvault_core::user::{AccountStatus, User};
use taskvault_model::{AuthProvider, UserId};

/// Finds or creates the user for a verified provider identity.
///
/// Lookup order: exact `(provider, provider_user_id)` match, then an email
/// collision check, then insert. A lost insert race re-runs the collision
/// check so the loser sees the winner's provider in the error message.
pub async fn reconcile_user(
    users: &dyn UsersRepository,
    provider: AuthProvider,
    provider_user_id: &str,
    email: &str,
) -> Result<User> {
    if let Some(user) = users
        .get_by_provider_identity(provider, provider_user_id)
        .await?
    {
        if user.account_status != AccountStatus::Active {
            return Err(SyncError::Forbidden(
                "Account suspended or deleted".into(),
            ));
        }
        users.touch_last_login(user.id).await?;
        return Ok(user);
    }

    if let Some(existing) = users.get_by_email(email).await? {
        return Err(email_collision(&existing));
    }

    let now = Utc::now();
    let user = User {
        id: UserId::new(),
        email: email.to_string(),
        auth_provider: provider,
        provider_user_id: provider_user_id.to_string(),
        account_status: AccountStatus::Active,
        encryption_salt: None,
        created_at: now,
        updated_at: now,
        last_login_at: Some(now),
    };

    match users.create(&user).await {
        Ok(()) => {
            info!(user_id = %user.id, provider = %provider, "new user registered");
            Ok(user)
        }
        Err(SyncError::Conflict(_)) => {
            // Concurrent signup race: somebody inserted between our checks.
            // Re-run the lookups so the error (or success) reflects the
            // winner's row.
            if let Some(user) = users
                .get_by_provider_identity(provider, provider_user_id)
                .await?
            {
                if user.account_status != AccountStatus::Active {
                    return Err(SyncError::Forbidden(
                        "Account suspended or deleted".into(),
                    ));
                }
                users.touch_last_login(user.id).await?;
                return Ok(user);
            }
            if let Some(existing) = users.get_by_email(email).await? {
                return Err(email_collision(&existing));
            }
            Err(SyncError::Internal(
                "user insert conflicted but no matching row found".into(),
            ))
        }
        Err(e) => Err(e),
    }
}

fn email_collision(existing: &User) -> SyncError {
    SyncError::Conflict(format!(
        "This email is already registered with {}. Please sign in with {} instead.",
        existing.auth_provider.display_name(),
        existing.auth_provider.display_name(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskvault_core::database::ports::users::MockUsersRepository;

    fn existing_user(provider: AuthProvider, status: AccountStatus) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            email: "alice@example.com".into(),
            auth_provider: provider,
            provider_user_id: "sub-123".into(),
            account_status: status,
            encryption_salt: Some("c2FsdA==".into()),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[tokio::test]
    async fn existing_active_user_logs_in() {
        let mut users = MockUsersRepository::new();
        let user = existing_user(AuthProvider::Google, AccountStatus::Active);
        let id = user.id;
        users
            .expect_get_by_provider_identity()
            .returning(move |_, _| Ok(Some(user.clone())));
        users
            .expect_touch_last_login()
            .times(1)
            .returning(|_| Ok(()));

        let got = reconcile_user(&users, AuthProvider::Google, "sub-123", "alice@example.com")
            .await
            .unwrap();
        assert_eq!(got.id, id);
    }

    #[tokio::test]
    async fn suspended_account_is_rejected() {
        let mut users = MockUsersRepository::new();
        let user = existing_user(AuthProvider::Google, AccountStatus::Suspended);
        users
            .expect_get_by_provider_identity()
            .returning(move |_, _| Ok(Some(user.clone())));

        let err = reconcile_user(&users, AuthProvider::Google, "sub-123", "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Forbidden(_)));
    }

    #[tokio::test]
    async fn email_bound_to_other_provider_conflicts() {
        let mut users = MockUsersRepository::new();
        users
            .expect_get_by_provider_identity()
            .returning(|_, _| Ok(None));
        let google_user = existing_user(AuthProvider::Google, AccountStatus::Active);
        users
            .expect_get_by_email()
            .returning(move |_| Ok(Some(google_user.clone())));

        let err = reconcile_user(&users, AuthProvider::Apple, "apple-sub", "alice@example.com")
            .await
            .unwrap_err();
        match err {
            SyncError::Conflict(msg) => assert!(msg.contains("Google"), "got: {msg}"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fresh_identity_creates_a_user() {
        let mut users = MockUsersRepository::new();
        users
            .expect_get_by_provider_identity()
            .returning(|_, _| Ok(None));
        users.expect_get_by_email().returning(|_| Ok(None));
        users.expect_create().times(1).returning(|_| Ok(()));

        let user = reconcile_user(&users, AuthProvider::Apple, "apple-sub", "new@example.com")
            .await
            .unwrap();
        assert_eq!(user.auth_provider, AuthProvider::Apple);
        assert_eq!(user.account_status, AccountStatus::Active);
        assert!(user.encryption_salt.is_none());
        assert!(user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn lost_insert_race_reports_the_winners_provider() {
        let mut users = MockUsersRepository::new();
        // Nothing visible on either lookup pass; the insert loses the race.
        users
            .expect_get_by_provider_identity()
            .returning(|_, _| Ok(None));
        let mut email_calls = 0;
        let winner = existing_user(AuthProvider::Google, AccountStatus::Active);
        users.expect_get_by_email().returning(move |_| {
            email_calls += 1;
            if email_calls == 1 {
                Ok(None)
            } else {
                Ok(Some(winner.clone()))
            }
        });
        users
            .expect_create()
            .returning(|_| Err(SyncError::Conflict("Email already registered".into())));

        let err = reconcile_user(&users, AuthProvider::Apple, "apple-sub", "alice@example.com")
            .await
            .unwrap_err();
        match err {
            SyncError::Conflict(msg) => assert!(msg.contains("Google")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
