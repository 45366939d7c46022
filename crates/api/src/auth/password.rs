//! Password hashing and strength rules

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;
use std::sync::LazyLock;

use super::middleware::AuthError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AuthError::Internal(format!("Salt encoding failed: {}", e)))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored PHC hash.
///
/// A malformed stored hash verifies as false.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Returns the reason a password is too weak, if it is
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }
    Ok(())
}

/// Hash used for accounts that must never be able to log in with a password.
///
/// Login against it still runs a full Argon2 verification so response
/// timing does not reveal whether an email exists.
pub fn generate_impossible_hash() -> String {
    hash_password(&uuid::Uuid::new_v4().to_string()).unwrap_or_else(|_| "!".to_string())
}

static DUMMY_HASH: LazyLock<String> = LazyLock::new(generate_impossible_hash);

/// Process-wide impossible hash for unknown-account logins.
///
/// Built once, so a failed lookup costs one verification like a real account.
pub fn dummy_password_hash() -> &'static str {
    DUMMY_HASH.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Sup3rSecret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Sup3rSecret", &hash));
        assert!(!verify_password("sup3rsecret", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("Sup3rSecret").unwrap();
        let b = hash_password("Sup3rSecret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("abcdefg1").is_ok());
        assert!(validate_password_strength("abc1").is_err());
        assert!(validate_password_strength("abcdefgh").is_err());
        assert!(validate_password_strength("12345678").is_err());
    }

    #[test]
    fn test_impossible_hash_rejects_guesses() {
        let hash = generate_impossible_hash();
        assert!(!verify_password("", &hash));
        assert!(!verify_password("password1", &hash));
    }

    #[test]
    fn test_dummy_hash_is_built_once() {
        let first = dummy_password_hash();
        let second = dummy_password_hash();
        assert!(std::ptr::eq(first, second));
        assert!(first.starts_with("$argon2"));
        assert!(!verify_password("password1", first));
    }
}
