use rand::RngCore;
use sqlx::{Postgres, Transaction};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::db::models::{TokenPurpose, VerificationToken};
use crate::db::operations::DbOperations;
use crate::error::AppError;

/// Byte length of signup and password-reset tokens before hex encoding.
pub const VERIFICATION_TOKEN_BYTES: usize = 64;
pub const SIGNUP_TOKEN_VALIDITY_HOURS: i64 = 24;
pub const PASSWORD_RESET_VALIDITY_HOURS: i64 = 1;

/// Outcome of checking a presented raw token against storage.
#[derive(Debug)]
pub enum TokenValidation {
    Valid(VerificationToken),
    AlreadyUsed(VerificationToken),
    Expired,
    Invalid,
}

/// Issues and validates the single-use tokens sent out by email. The raw
/// value is returned exactly once, at issuance; storage only ever yields
/// it back through an equality lookup on the presented value.
#[derive(Clone)]
pub struct VerificationTokenStore {
    db: DbOperations,
}

impl VerificationTokenStore {
    pub fn new(db: DbOperations) -> Self {
        Self { db }
    }

    /// Generates a fresh random token, stores the pending record inside the
    /// caller's transaction and returns the raw value.
    pub async fn issue(
        &self,
        transaction: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        purpose: TokenPurpose,
        byte_length: usize,
        validity_hours: i64,
    ) -> Result<String, AppError> {
        let raw = generate_token(byte_length);
        let record = VerificationToken::new(user_id, purpose, raw.clone(), validity_hours);
        self.db.insert_verification_token(&record, transaction).await?;
        Ok(raw)
    }

    /// Looks up by (value, purpose) in one predicate, so a token issued for
    /// one purpose never validates another. The stored value is re-checked
    /// with a constant-time compare.
    pub async fn validate(
        &self,
        raw_token: &str,
        purpose: TokenPurpose,
    ) -> Result<TokenValidation, AppError> {
        if raw_token.is_empty() {
            return Ok(TokenValidation::Invalid);
        }

        let record = match self.db.find_verification_token(raw_token, purpose).await? {
            Some(record) => record,
            None => return Ok(TokenValidation::Invalid),
        };

        let stored = match &record.token {
            Some(stored) => stored.clone(),
            None => return Ok(TokenValidation::Invalid),
        };
        if !bool::from(stored.as_bytes().ct_eq(raw_token.as_bytes())) {
            return Ok(TokenValidation::Invalid);
        }

        if record.used {
            return Ok(TokenValidation::AlreadyUsed(record));
        }
        if record.is_expired() {
            return Ok(TokenValidation::Expired);
        }

        Ok(TokenValidation::Valid(record))
    }

    /// Permanently marks the record consumed; later `validate` calls on the
    /// same raw value resolve to `AlreadyUsed`, never success. Returns
    /// false when a concurrent caller consumed the record first, so the
    /// loser can roll back instead of acting on a spent token.
    pub async fn consume(
        &self,
        transaction: &mut Transaction<'_, Postgres>,
        record: &VerificationToken,
    ) -> Result<bool, AppError> {
        let consumed = self
            .db
            .consume_verification_token(record.id, transaction)
            .await?;
        Ok(consumed == 1)
    }
}

fn generate_token(byte_length: usize) -> String {
    let mut bytes = vec![0u8; byte_length];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique_hex() {
        let a = generate_token(VERIFICATION_TOKEN_BYTES);
        let b = generate_token(VERIFICATION_TOKEN_BYTES);
        assert_ne!(a, b);
        // 64 bytes hex-encode to 128 characters
        assert_eq!(a.len(), 128);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_token_respects_length() {
        assert_eq!(generate_token(32).len(), 64);
    }
}
