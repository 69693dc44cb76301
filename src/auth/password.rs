//! Password hashing with bcrypt.
//!
//! bcrypt salts internally, so two hashes of the same plaintext differ
//! while both verify. Cost is the library default, high enough to make
//! offline brute force expensive and tunable via `DEFAULT_COST`.

use crate::error::AppError;

pub fn hash_password(plaintext: &str) -> Result<String, AppError> {
    bcrypt::hash(plaintext, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::InternalError(format!("password hashing failed: {}", e)))
}

/// Returns false on mismatch and on a malformed digest; never panics.
pub fn verify_password(plaintext: &str, digest: &str) -> bool {
    bcrypt::verify(plaintext, digest).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies_against_plaintext() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn test_hash_never_equals_plaintext() {
        let hash = hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
    }

    #[test]
    fn test_fresh_salt_each_call() {
        let a = hash_password("same input").unwrap();
        let b = hash_password("same input").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same input", &a));
        assert!(verify_password("same input", &b));
    }

    #[test]
    fn test_malformed_digest_returns_false() {
        assert!(!verify_password("anything", "not-a-bcrypt-digest"));
        assert!(!verify_password("anything", ""));
    }
}
