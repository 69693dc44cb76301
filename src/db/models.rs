use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            is_verified: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One row per device login. Refresh never mutates a session in place:
/// the consumed row keeps its cleared token as an audit record and a new
/// row is appended.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token: Option<String>,
    pub refresh_token_expiry: Option<DateTime<Utc>>,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        refresh_token: String,
        refresh_token_expiry: DateTime<Utc>,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            refresh_token: Some(refresh_token),
            refresh_token_expiry: Some(refresh_token_expiry),
            device_info,
            ip_address,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.refresh_token_expiry {
            Some(expiry) => Utc::now() > expiry,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Signup,
    PasswordReset,
}

/// Single-use, purpose-scoped email token. `user_id` is a plain reference,
/// not a foreign key. Once consumed, `used` stays true permanently.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub token: Option<String>,
    pub token_expiry: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl VerificationToken {
    pub fn new(user_id: Uuid, purpose: TokenPurpose, token: String, validity_hours: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            purpose,
            token: Some(token),
            token_expiry: Utc::now() + Duration::hours(validity_hours),
            used: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.token_expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_is_unverified() {
        let user = User::new("alice@example.com".into(), "$2b$12$hash".into());
        assert!(!user.is_verified);
        assert!(user.last_login.is_none());
    }

    #[test]
    fn test_session_expiry() {
        let live = Session::new(
            Uuid::new_v4(),
            "tok".into(),
            Utc::now() + Duration::minutes(5),
            None,
            None,
        );
        assert!(!live.is_expired());

        let mut stale = live.clone();
        stale.refresh_token_expiry = Some(Utc::now() - Duration::minutes(1));
        assert!(stale.is_expired());

        // A nulled-out session counts as expired
        stale.refresh_token_expiry = None;
        assert!(stale.is_expired());
    }

    #[test]
    fn test_verification_token_expiry() {
        let token = VerificationToken::new(Uuid::new_v4(), TokenPurpose::Signup, "abc".into(), 24);
        assert!(!token.is_expired());
        assert!(!token.used);

        let mut expired = token.clone();
        expired.token_expiry = Utc::now() - Duration::hours(1);
        assert!(expired.is_expired());
    }
}
