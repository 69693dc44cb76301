use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use uuid::Uuid;

use crate::db::models::{Session, TokenPurpose, User, VerificationToken};
use crate::error::AppError;

#[derive(Clone)]
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        Ok(self.pool.as_ref().begin().await?)
    }

    // ---- users ----

    /// Inserts a user inside the caller's transaction. The unique index on
    /// email is the authority on duplicates; a violation surfaces as
    /// `DatabaseError::Duplicate` (see `From<sqlx::Error>`).
    pub async fn create_user(
        &self,
        user: &User,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, is_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, password_hash, is_verified, last_login, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, is_verified, last_login, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, is_verified, last_login, created_at, updated_at \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    pub async fn mark_email_verified(
        &self,
        user_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut **transaction)
            .await?;

        Ok(())
    }

    pub async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut **transaction)
            .await?;

        Ok(())
    }

    pub async fn stamp_last_login(
        &self,
        user_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login = $1, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut **transaction)
            .await?;

        Ok(())
    }

    // ---- sessions ----

    /// Appends a session row. Existing sessions are never overwritten; each
    /// login and each rotation produces a fresh row.
    pub async fn create_session(
        &self,
        session: &Session,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Session, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, refresh_token, refresh_token_expiry,
                                  device_info, ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, refresh_token, refresh_token_expiry,
                      device_info, ip_address, created_at
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.refresh_token)
        .bind(session.refresh_token_expiry)
        .bind(&session.device_info)
        .bind(&session.ip_address)
        .bind(session.created_at)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(session)
    }

    pub async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, user_id, refresh_token, refresh_token_expiry, \
                    device_info, ip_address, created_at \
             FROM sessions WHERE refresh_token = $1",
        )
        .bind(refresh_token)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    /// Conditional null-out used by rotation. The guard on the current token
    /// value makes the second of two concurrent refresh calls match zero
    /// rows and lose the race deterministically.
    pub async fn clear_session_refresh_token(
        &self,
        session_id: Uuid,
        presented_token: &str,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET refresh_token = NULL, refresh_token_expiry = NULL \
             WHERE id = $1 AND refresh_token = $2",
        )
        .bind(session_id)
        .bind(presented_token)
        .execute(&mut **transaction)
        .await?;

        Ok(result.rows_affected())
    }

    /// Global logout: nulls the refresh token and expiry on every session
    /// the user owns.
    pub async fn invalidate_user_sessions(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET refresh_token = NULL, refresh_token_expiry = NULL \
             WHERE user_id = $1 AND refresh_token IS NOT NULL",
        )
        .bind(user_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AppError> {
        let mut transaction = self.begin_transaction().await?;

        let result = sqlx::query("DELETE FROM sessions WHERE refresh_token_expiry < $1")
            .bind(Utc::now())
            .execute(&mut *transaction)
            .await;

        match result {
            Ok(result) => {
                transaction.commit().await?;
                Ok(result.rows_affected())
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e.into())
            }
        }
    }

    // ---- verification tokens ----

    pub async fn insert_verification_token(
        &self,
        token: &VerificationToken,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_verification_tokens
                (id, user_id, purpose, token, token_expiry, used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(token.purpose)
        .bind(&token.token)
        .bind(token.token_expiry)
        .bind(token.used)
        .bind(token.created_at)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }

    /// Lookup by (token value, purpose) in one predicate: a signup token can
    /// never satisfy a password-reset check even with an identical raw value.
    pub async fn find_verification_token(
        &self,
        raw_token: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<VerificationToken>, AppError> {
        let token = sqlx::query_as::<_, VerificationToken>(
            "SELECT id, user_id, purpose, token, token_expiry, used, created_at, updated_at \
             FROM user_verification_tokens WHERE token = $1 AND purpose = $2",
        )
        .bind(raw_token)
        .bind(purpose)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(token)
    }

    /// Marks a verification token consumed. `used` is permanent; no code
    /// path ever resets it. The `used = FALSE` guard plays the same role as
    /// the rotation guard on sessions: of two concurrent consumers, only
    /// one can match the row, and the loser sees zero rows affected.
    pub async fn consume_verification_token(
        &self,
        token_id: Uuid,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE user_verification_tokens SET used = TRUE, updated_at = $1 \
             WHERE id = $2 AND used = FALSE",
        )
        .bind(Utc::now())
        .bind(token_id)
        .execute(&mut **transaction)
        .await?;

        Ok(result.rows_affected())
    }
}
