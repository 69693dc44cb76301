use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::tokens::TokenCodec;
use crate::auth::verification::{
    TokenValidation, VerificationTokenStore, PASSWORD_RESET_VALIDITY_HOURS,
    SIGNUP_TOKEN_VALIDITY_HOURS, VERIFICATION_TOKEN_BYTES,
};
use crate::db::models::{Session, TokenPurpose, User};
use crate::db::operations::DbOperations;
use crate::email::{self, EmailNotifier};
use crate::error::{AppError, DatabaseError};

/// Access/refresh pair returned by login and refresh.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Outcome of the verify-email endpoint; a consumed token re-click is a
/// success, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

/// Ties the hasher, token codec, verification store and session registry
/// together. Holds no mutable state of its own; the database is the only
/// coordination point between concurrent requests.
pub struct AuthService {
    db: DbOperations,
    tokens: TokenCodec,
    verification: VerificationTokenStore,
    notifier: EmailNotifier,
    force_email_verification: bool,
}

impl AuthService {
    pub fn new(
        db: DbOperations,
        tokens: TokenCodec,
        notifier: EmailNotifier,
        force_email_verification: bool,
    ) -> Self {
        Self {
            verification: VerificationTokenStore::new(db.clone()),
            db,
            tokens,
            notifier,
            force_email_verification,
        }
    }

    /// Creates the account and its pending signup token in one transaction,
    /// then hands the verification email to a detached task. Duplicate
    /// emails surface as `Conflict` via the storage unique constraint.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AppError> {
        validate_email(email)?;
        if password.is_empty() {
            return Err(AppError::ValidationError("password must not be empty".into()));
        }

        let password_hash = hash_password(password)?;
        let user = User::new(email.to_string(), password_hash);

        let mut transaction = self.db.begin_transaction().await?;
        let result = async {
            let user = self.db.create_user(&user, &mut transaction).await?;
            let token = self
                .verification
                .issue(
                    &mut transaction,
                    user.id,
                    TokenPurpose::Signup,
                    VERIFICATION_TOKEN_BYTES,
                    SIGNUP_TOKEN_VALIDITY_HOURS,
                )
                .await?;
            Ok::<_, AppError>((user, token))
        }
        .await;

        let (user, token) = match result {
            Ok(created) => {
                transaction.commit().await?;
                created
            }
            Err(AppError::DatabaseError(DatabaseError::Duplicate)) => {
                transaction.rollback().await?;
                return Err(AppError::Conflict("Email already registered.".into()));
            }
            Err(e) => {
                transaction.rollback().await?;
                return Err(e);
            }
        };

        // Delivery happens strictly after commit and never blocks or fails
        // the registration response.
        let notifier = self.notifier.clone();
        let to = user.email.clone();
        email::dispatch(async move { notifier.send_signup_verification(&to, &token).await });

        info!("Registered new user {}", user.email);
        Ok(user)
    }

    /// Verifies credentials, then creates the device session and stamps the
    /// login timestamp atomically.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Result<TokenPair, AppError> {
        let user = self
            .db
            .get_user_by_email(email)
            .await?
            .filter(|user| verify_password(password, &user.password_hash))
            .ok_or_else(|| AppError::Unauthorized("Incorrect login credentials".into()))?;

        if self.force_email_verification && !user.is_verified {
            return Err(AppError::Unauthorized(
                "Email not verified. Please verify your email before logging in.".into(),
            ));
        }

        let access_token = self.tokens.issue_access_token(user.id)?;
        let (refresh_token, refresh_expiry) = self.tokens.issue_refresh_token(user.id)?;
        let session = Session::new(
            user.id,
            refresh_token.clone(),
            refresh_expiry,
            device_info,
            ip_address,
        );

        let mut transaction = self.db.begin_transaction().await?;
        let result = async {
            self.db.create_session(&session, &mut transaction).await?;
            self.db.stamp_last_login(user.id, &mut transaction).await?;
            Ok::<_, AppError>(())
        }
        .await;

        match result {
            Ok(()) => transaction.commit().await?,
            Err(e) => {
                transaction.rollback().await?;
                warn!("Login transaction failed for {}: {}", user.email, e);
                return Err(AppError::InternalError("Login failed.".into()));
            }
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        })
    }

    /// Rotates a refresh token: the consumed session's token is nulled
    /// behind a compare-against-presented-value guard and a fresh session
    /// row is appended, all in one transaction. Of two concurrent calls
    /// with the same token, exactly one can win the guard.
    pub async fn refresh(&self, presented_token: &str) -> Result<TokenPair, AppError> {
        let session = self
            .db
            .find_session_by_refresh_token(presented_token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".into()))?;

        if session.is_expired() {
            return Err(AppError::Unauthorized("Refresh token expired".into()));
        }

        // The signature alone is not enough: the subject must match the
        // session owner, or a valid token replayed against a stale row
        // would mint credentials for the wrong account.
        let subject = self
            .tokens
            .verify(presented_token)
            .map_err(|_| AppError::Unauthorized("Invalid refresh token".into()))?;
        if subject != session.user_id {
            return Err(AppError::Unauthorized("Invalid refresh token".into()));
        }

        let access_token = self.tokens.issue_access_token(session.user_id)?;
        let (refresh_token, refresh_expiry) = self.tokens.issue_refresh_token(session.user_id)?;
        let rotated = Session::new(
            session.user_id,
            refresh_token.clone(),
            refresh_expiry,
            session.device_info.clone(),
            session.ip_address.clone(),
        );

        let mut transaction = self.db.begin_transaction().await?;
        let result = async {
            let cleared = self
                .db
                .clear_session_refresh_token(session.id, presented_token, &mut transaction)
                .await?;
            if cleared == 0 {
                // A concurrent refresh already consumed this token.
                return Err(AppError::Unauthorized("Invalid refresh token".into()));
            }
            self.db.create_session(&rotated, &mut transaction).await?;
            Ok::<_, AppError>(())
        }
        .await;

        match result {
            Ok(()) => transaction.commit().await?,
            Err(e @ AppError::Unauthorized(_)) => {
                transaction.rollback().await?;
                return Err(e);
            }
            Err(e) => {
                transaction.rollback().await?;
                warn!("Refresh transaction failed: {}", e);
                return Err(AppError::InternalError(
                    "Could not refresh access token.".into(),
                ));
            }
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        })
    }

    /// Consumes a signup token and flips the user's verified flag in one
    /// transaction. Re-clicking an already consumed link is idempotent.
    pub async fn verify_email(&self, raw_token: &str) -> Result<VerifyOutcome, AppError> {
        let record = match self
            .verification
            .validate(raw_token, TokenPurpose::Signup)
            .await?
        {
            TokenValidation::Valid(record) => record,
            TokenValidation::AlreadyUsed(_) => return Ok(VerifyOutcome::AlreadyVerified),
            TokenValidation::Expired => {
                return Err(AppError::BadRequest("Verification token expired".into()))
            }
            TokenValidation::Invalid => {
                return Err(AppError::BadRequest("Invalid verification token".into()))
            }
        };

        let mut transaction = self.db.begin_transaction().await?;
        let result = async {
            let consumed = self.verification.consume(&mut transaction, &record).await?;
            if consumed {
                self.db.mark_email_verified(record.user_id, &mut transaction).await?;
            }
            Ok::<_, AppError>(consumed)
        }
        .await;

        match result {
            Ok(true) => {
                transaction.commit().await?;
                Ok(VerifyOutcome::Verified)
            }
            Ok(false) => {
                // A concurrent click consumed the token between validate
                // and consume; the account is verified either way.
                transaction.rollback().await?;
                Ok(VerifyOutcome::AlreadyVerified)
            }
            Err(e) => {
                transaction.rollback().await?;
                warn!("Email verification transaction failed: {}", e);
                Err(AppError::InternalError("Email verification failed.".into()))
            }
        }
    }

    /// Global logout: every session of the caller loses its refresh token,
    /// across all devices.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        let invalidated = self.db.invalidate_user_sessions(user_id).await?;
        info!("Logged out user {} ({} sessions invalidated)", user_id, invalidated);
        Ok(())
    }

    /// Always answers uniformly, whether or not the address is registered,
    /// so the endpoint cannot be used to enumerate accounts. A reset token
    /// is issued and mailed only when the user exists.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let user = match self.db.get_user_by_email(email).await? {
            Some(user) => user,
            None => {
                info!("Password reset requested for unknown email");
                return Ok(());
            }
        };

        let mut transaction = self.db.begin_transaction().await?;
        let result = self
            .verification
            .issue(
                &mut transaction,
                user.id,
                TokenPurpose::PasswordReset,
                VERIFICATION_TOKEN_BYTES,
                PASSWORD_RESET_VALIDITY_HOURS,
            )
            .await;

        let token = match result {
            Ok(token) => {
                transaction.commit().await?;
                token
            }
            Err(e) => {
                transaction.rollback().await?;
                return Err(e);
            }
        };

        let notifier = self.notifier.clone();
        let to = user.email.clone();
        email::dispatch(async move { notifier.send_password_reset(&to, &token).await });

        Ok(())
    }

    /// A reset token must be pending, unexpired and purpose-scoped in one
    /// check; anything else is the same opaque rejection.
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> Result<(), AppError> {
        if new_password.is_empty() {
            return Err(AppError::ValidationError("password must not be empty".into()));
        }

        let record = match self
            .verification
            .validate(raw_token, TokenPurpose::PasswordReset)
            .await?
        {
            TokenValidation::Valid(record) => record,
            _ => return Err(AppError::BadRequest("Invalid or expired reset token".into())),
        };

        let password_hash = hash_password(new_password)?;

        let mut transaction = self.db.begin_transaction().await?;
        let result = async {
            // Consume first: the guarded update is what enforces single
            // use, so a losing concurrent caller must roll back before the
            // password write, not after.
            let consumed = self.verification.consume(&mut transaction, &record).await?;
            if !consumed {
                return Err(AppError::BadRequest("Invalid or expired reset token".into()));
            }
            self.db
                .update_password_hash(record.user_id, &password_hash, &mut transaction)
                .await?;
            Ok::<_, AppError>(())
        }
        .await;

        match result {
            Ok(()) => transaction.commit().await?,
            Err(e @ AppError::BadRequest(_)) => {
                transaction.rollback().await?;
                return Err(e);
            }
            Err(e) => {
                transaction.rollback().await?;
                warn!("Password reset transaction failed: {}", e);
                return Err(AppError::InternalError("Password reset failed.".into()));
            }
        }

        info!("Password reset completed for user {}", record.user_id);
        Ok(())
    }

    /// Changes the password of an authenticated user after re-checking the
    /// current one.
    pub async fn update_password(
        &self,
        user: &User,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if !verify_password(old_password, &user.password_hash) {
            return Err(AppError::BadRequest("Failed to update user password.".into()));
        }
        if new_password.is_empty() {
            return Err(AppError::ValidationError("password must not be empty".into()));
        }

        let password_hash = hash_password(new_password)?;

        let mut transaction = self.db.begin_transaction().await?;
        let result = self
            .db
            .update_password_hash(user.id, &password_hash, &mut transaction)
            .await;

        match result {
            Ok(()) => transaction.commit().await?,
            Err(e) => {
                transaction.rollback().await?;
                warn!("Password update transaction failed: {}", e);
                return Err(AppError::InternalError("Failed to update password.".into()));
            }
        }

        Ok(())
    }

    /// Resolves the bearer access token presented on a request to its user.
    pub async fn current_user(&self, bearer_token: &str) -> Result<User, AppError> {
        let user_id = self.tokens.verify(bearer_token)?;
        self.db
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))
    }
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let well_formed = email.contains('@')
        && !email.starts_with('@')
        && !email.ends_with('@')
        && !email.contains(char::is_whitespace);
    if well_formed {
        Ok(())
    } else {
        Err(AppError::ValidationError("invalid email address".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a@b").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@leading").is_err());
        assert!(validate_email("trailing@").is_err());
        assert!(validate_email("has space@example.com").is_err());
    }
}
