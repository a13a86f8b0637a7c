use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::debug;

use crate::auth::repo_types::{User, UserId, UserSummary};
use crate::error::StoreError;

impl User {
    /// Create a new user. Usernames are matched case-sensitively.
    pub async fn create(
        db: &SqlitePool,
        username: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        if username.trim().is_empty() {
            return Err(StoreError::validation("username must not be empty"));
        }
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(db)
        .await;

        match inserted {
            Ok(user) => {
                debug!(user_id = user.id, "user created");
                Ok(user)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateUser)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by exact username and stored digest.
    pub async fn verify(
        db: &SqlitePool,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<UserId>, StoreError> {
        let id = sqlx::query_scalar::<_, UserId>(
            r#"
            SELECT id
            FROM users
            WHERE username = ?1 AND password_hash = ?2
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_optional(db)
        .await?;
        Ok(id)
    }

    /// Swap the stored digest, provided the caller presents the current one.
    pub async fn update_password(
        db: &SqlitePool,
        user_id: UserId,
        old_hash: &str,
        new_hash: &str,
    ) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?3
            WHERE id = ?1 AND password_hash = ?2
            "#,
        )
        .bind(user_id)
        .bind(old_hash)
        .bind(new_hash)
        .execute(db)
        .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::InvalidCredentials);
        }
        debug!(user_id, "password updated");
        Ok(())
    }

    pub async fn find_by_username(
        db: &SqlitePool,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = ?1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, user_id: UserId) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn list_all(db: &SqlitePool) -> Result<Vec<UserSummary>, StoreError> {
        let rows = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT id, username
            FROM users
            ORDER BY id ASC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Overwrite a password without the old digest. Only the admin CLI calls
    /// this, after checking the operator's admin key.
    pub async fn reset_password(
        db: &SqlitePool,
        username: &str,
        new_hash: &str,
    ) -> Result<UserId, StoreError> {
        let id = sqlx::query_scalar::<_, UserId>(
            r#"
            UPDATE users
            SET password_hash = ?2
            WHERE username = ?1
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(new_hash)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound("user"))?;
        debug!(user_id = id, "password reset by admin");
        Ok(id)
    }
}
