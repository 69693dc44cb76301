use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
}

/// Signs and verifies the bearer tokens handed to clients. Constructed
/// once at startup from `Settings`; a missing secret or an unsupported
/// algorithm aborts the process there instead of failing per request.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn from_settings(auth: &AuthConfig) -> Result<Self, AppError> {
        if auth.jwt_secret.is_empty() {
            return Err(AppError::ConfigError(
                "auth.jwt_secret must be set".to_string(),
            ));
        }

        let algorithm: Algorithm = auth.jwt_algorithm.parse().map_err(|_| {
            AppError::ConfigError(format!(
                "unsupported signing algorithm: {}",
                auth.jwt_algorithm
            ))
        })?;
        // Keys are derived from a shared secret, so only the HMAC family fits.
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AppError::ConfigError(format!(
                "signing algorithm {} requires asymmetric keys; use HS256/HS384/HS512",
                auth.jwt_algorithm
            )));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
            algorithm,
            access_token_ttl: Duration::minutes(auth.access_token_expiry_minutes),
            refresh_token_ttl: Duration::minutes(auth.refresh_token_expiry_minutes),
        })
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let (token, _) = self.issue(user_id, self.access_token_ttl)?;
        Ok(token)
    }

    /// Returns the token together with its absolute expiry, which the
    /// session registry persists alongside it.
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<(String, DateTime<Utc>), AppError> {
        self.issue(user_id, self.refresh_token_ttl)
    }

    fn issue(&self, user_id: Uuid, ttl: Duration) -> Result<(String, DateTime<Utc>), AppError> {
        let now = Utc::now();
        let expiry = now + ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
        };

        let header = Header::new(self.algorithm);
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalError(format!("token signing failed: {}", e)))?;

        Ok((token, expiry))
    }

    /// Recovers the subject from a signed token. Bad signature, wrong
    /// algorithm, garbage input and past expiry all collapse into
    /// `Unauthorized`; nothing here panics.
    pub fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is an exact UTC comparison; no clock-skew allowance.
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(secret: &str, algorithm: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_algorithm: algorithm.to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_minutes: 10080,
            force_email_verification: true,
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::from_settings(&test_config("test_secret", "HS256")).unwrap()
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let err = TokenCodec::from_settings(&test_config("", "HS256")).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_unknown_algorithm_is_fatal() {
        let err = TokenCodec::from_settings(&test_config("s", "HS999")).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        // Valid name, but needs asymmetric keys
        let err = TokenCodec::from_settings(&test_config("s", "RS256")).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_round_trip_recovers_subject() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let token = codec.issue_access_token(user_id).unwrap();
        assert_eq!(codec.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn test_refresh_token_carries_expiry() {
        let codec = codec();
        let (token, expiry) = codec.issue_refresh_token(Uuid::new_v4()).unwrap();
        assert!(expiry > Utc::now() + Duration::minutes(10079));
        assert!(codec.verify(&token).is_ok());
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let codec = codec();
        let (token, _) = codec.issue(Uuid::new_v4(), Duration::seconds(-10)).unwrap();
        let err = codec.verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let codec = codec();
        let token = codec.issue_access_token(Uuid::new_v4()).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push('x');
        assert!(codec.verify(&tampered).is_err());
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let signer = codec();
        let other = TokenCodec::from_settings(&test_config("different_secret", "HS256")).unwrap();
        let token = signer.issue_access_token(Uuid::new_v4()).unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_input_is_invalid() {
        let codec = codec();
        assert!(codec.verify("not-a-jwt").is_err());
        assert!(codec.verify("").is_err());
    }
}
