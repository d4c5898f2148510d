use anyhow::Context;
use axum::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// User credential record.
///
/// `reset_token` and `reset_token_expiry` are set together while a password
/// reset is pending and cleared together when it is consumed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expiry: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence boundary for credentials. Emails are normalized (trimmed,
/// lowercased) by the caller before they reach the store; uniqueness is still
/// enforced case-insensitively at the store level.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    /// Persist a pending reset: token and expiry written in a single update.
    async fn update_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Compare-and-clear: in one conditional update, replace the password hash
    /// and null out the reset fields of the row whose unexpired token matches.
    /// Returns whether a row matched. Two racing consumers of the same token
    /// must see at most one `true`.
    async fn consume_reset_token(
        &self,
        token: &str,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    async fn update_password(&self, user_id: Uuid, new_hash: &str) -> Result<(), StoreError>;

    async fn delete_user(&self, user_id: Uuid) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str =
    "id, email, password_hash, reset_token, reset_token_expiry, created_at";

pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
            _ => StoreError::Other(anyhow::Error::new(e).context("create user")),
        })?;
        Ok(user)
    }

    async fn update_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_token_expiry = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expiry)
        .execute(&self.db)
        .await
        .context("update reset token")?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, reset_token = NULL, reset_token_expiry = NULL
            WHERE reset_token = $1 AND reset_token_expiry > $3
            "#,
        )
        .bind(token)
        .bind(new_hash)
        .bind(now)
        .execute(&self.db)
        .await
        .context("consume reset token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_password(&self, user_id: Uuid, new_hash: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(new_hash)
            .execute(&self.db)
            .await
            .context("update password")?;
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(())
    }
}

/// In-memory store with the same conditional-update semantics as the Postgres
/// one. Backs `AppState::fake()` and the test suite.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: std::sync::Mutex<Vec<User>>,
}

#[cfg(test)]
impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<User>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Test hook: read back the pending reset fields for an email.
    pub fn reset_state(&self, email: &str) -> Option<(Option<String>, Option<OffsetDateTime>)> {
        self.lock()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| (u.reset_token.clone(), u.reset_token_expiry))
    }
}

#[cfg(test)]
#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock().iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.lock();
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            reset_token: None,
            reset_token_expiry: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut users = self.lock();
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.reset_token = Some(token.to_string());
            user.reset_token_expiry = Some(expiry);
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        // single critical section, mirroring the SQL conditional update
        let mut users = self.lock();
        let matched = users.iter_mut().find(|u| {
            u.reset_token.as_deref() == Some(token)
                && u.reset_token_expiry.map(|e| e > now).unwrap_or(false)
        });
        match matched {
            Some(user) => {
                user.password_hash = new_hash.to_string();
                user.reset_token = None;
                user.reset_token_expiry = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_password(&self, user_id: Uuid, new_hash: &str) -> Result<(), StoreError> {
        let mut users = self.lock();
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.password_hash = new_hash.to_string();
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.lock().retain(|u| u.id != user_id);
        Ok(())
    }
}
