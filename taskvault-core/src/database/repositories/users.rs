use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::database::ports::users::UsersRepository;
use crate::error::{Result, SyncError};
use crate::user::{AccountStatus, User};
use taskvault_model::{AuthProvider, UserId};

/// PostgreSQL-backed implementation of the `UsersRepository` port.
#[derive(Clone, Debug)]
pub struct PgUsersRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    auth_provider: String,
    provider_user_id: String,
    account_status: String,
    encryption_salt: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = SyncError;

    fn try_from(row: UserRow) -> Result<User> {
        let auth_provider: AuthProvider = row.auth_provider.parse().map_err(|_| {
            SyncError::Internal(format!(
                "user {} has unknown auth provider {:?}",
                row.id, row.auth_provider
            ))
        })?;
        let account_status =
            AccountStatus::parse(&row.account_status).ok_or_else(|| {
                SyncError::Internal(format!(
                    "user {} has unknown account status {:?}",
                    row.id, row.account_status
                ))
            })?;
        Ok(User {
            id: UserId(row.id),
            email: row.email,
            auth_provider,
            provider_user_id: row.provider_user_id,
            account_status,
            encryption_salt: row.encryption_salt,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login_at: row.last_login_at,
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT id, email, auth_provider, provider_user_id, account_status,
           encryption_salt, created_at, updated_at, last_login_at
    FROM users
"#;

impl PgUsersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UsersRepository for PgUsersRepository {
    async fn create(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, auth_provider, provider_user_id, account_status,
                encryption_salt, created_at, updated_at, last_login_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.to_uuid())
        .bind(&user.email)
        .bind(user.auth_provider.as_str())
        .bind(&user.provider_user_id)
        .bind(user.account_status.as_str())
        .bind(&user.encryption_salt)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.constraint() == Some("users_email_key") {
                    return SyncError::Conflict("Email already registered".to_string());
                }
                if db_err.constraint() == Some("users_provider_identity_key") {
                    return SyncError::Conflict(
                        "Provider identity already registered".to_string(),
                    );
                }
            }
            SyncError::Internal(format!("Failed to create user: {e}"))
        })?;

        info!(user_id = %user.id, provider = %user.auth_provider, "created user");
        Ok(())
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} WHERE id = $1"))
                .bind(id.to_uuid())
                .fetch_optional(self.pool())
                .await
                .map_err(|e| {
                    SyncError::Internal(format!("Failed to get user by id: {e}"))
                })?;
        row.map(User::try_from).transpose()
    }

    async fn get_by_provider_identity(
        &self,
        provider: AuthProvider,
        provider_user_id: &str,
    ) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "{SELECT_USER} WHERE auth_provider = $1 AND provider_user_id = $2"
        ))
        .bind(provider.as_str())
        .bind(provider_user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            SyncError::Internal(format!("Failed to get user by provider identity: {e}"))
        })?;
        row.map(User::try_from).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} WHERE email = $1"))
                .bind(email)
                .fetch_optional(self.pool())
                .await
                .map_err(|e| {
                    SyncError::Internal(format!("Failed to get user by email: {e}"))
                })?;
        row.map(User::try_from).transpose()
    }

    async fn touch_last_login(&self, id: UserId) -> Result<()> {
        sqlx::query(
            "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id.to_uuid())
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to touch last login: {e}")))?;
        Ok(())
    }

    async fn set_encryption_salt(&self, id: UserId, salt: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET encryption_salt = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.to_uuid())
        .bind(salt)
        .execute(self.pool())
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to set encryption salt: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound("User not found".to_string()));
        }
        Ok(())
    }
}
