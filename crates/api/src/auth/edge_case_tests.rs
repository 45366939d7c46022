//! Edge Case Tests for Authentication System
//!
//! Boundary conditions in:
//! - JWT token handling
//! - Password strength and hashing
//! - Password reset tokens
//! - Session expiry

#[cfg(test)]
mod jwt_tests {
    use super::super::jwt::*;
    use super::super::middleware::AuthError;
    use uuid::Uuid;

    const TEST_SECRET: &str = "test-secret-key-at-least-32-chars!";

    fn subject(org_id: Option<Uuid>) -> TokenSubject<'static> {
        TokenSubject {
            user_id: Uuid::new_v4(),
            email: "staff@knightcall.ai",
            role: "staff",
            org_id,
        }
    }

    // =========================================================================
    // Token expired inside the 60s validation leeway is still accepted
    // =========================================================================
    #[test]
    fn test_zero_lifetime_token_within_leeway() {
        let jwt = JwtManager::new(TEST_SECRET, 0, 0);
        let pair = jwt.generate_token_pair(&subject(None)).unwrap();

        assert!(jwt.validate_access_token(&pair.access_token).is_ok());
        assert!(pair.expires_in() <= 0);
    }

    // =========================================================================
    // Token expired well past the leeway is rejected
    // =========================================================================
    #[test]
    fn test_token_past_leeway_rejected() {
        let jwt = JwtManager::new(TEST_SECRET, -1, -1);
        let pair = jwt.generate_token_pair(&subject(None)).unwrap();

        assert!(matches!(
            jwt.validate_access_token(&pair.access_token),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            jwt.validate_refresh_token(&pair.refresh_token),
            Err(AuthError::InvalidToken)
        ));
    }

    // =========================================================================
    // Org claim survives the round trip, including absence
    // =========================================================================
    #[test]
    fn test_org_claim_round_trip() {
        let jwt = JwtManager::new(TEST_SECRET, 1, 1);
        let org_id = Uuid::new_v4();

        let with_org = jwt.generate_token_pair(&subject(Some(org_id))).unwrap();
        let claims = jwt.validate_access_token(&with_org.access_token).unwrap();
        assert_eq!(claims.org_id, Some(org_id));

        let without_org = jwt.generate_token_pair(&subject(None)).unwrap();
        let claims = jwt.validate_access_token(&without_org.access_token).unwrap();
        assert_eq!(claims.org_id, None);
        assert_eq!(claims.role, "staff");
    }

    // =========================================================================
    // Refresh outlives access
    // =========================================================================
    #[test]
    fn test_refresh_expires_after_access() {
        let jwt = JwtManager::new(TEST_SECRET, 24, 30);
        let pair = jwt.generate_token_pair(&subject(None)).unwrap();

        assert!(pair.refresh_expires_at > pair.access_expires_at);
        let expires_in = pair.expires_in();
        assert!(expires_in <= 24 * 3600 && expires_in > 24 * 3600 - 5);
    }

    // =========================================================================
    // Empty and truncated tokens
    // =========================================================================
    #[test]
    fn test_empty_and_truncated_tokens_rejected() {
        let jwt = JwtManager::new(TEST_SECRET, 1, 1);
        let pair = jwt.generate_token_pair(&subject(None)).unwrap();
        let truncated = &pair.access_token[..pair.access_token.len() / 2];

        assert!(jwt.validate_access_token("").is_err());
        assert!(jwt.validate_access_token(truncated).is_err());
    }
}

#[cfg(test)]
mod password_tests {
    use super::super::password::*;

    // =========================================================================
    // Exactly the minimum length is accepted; one shorter is not
    // =========================================================================
    #[test]
    fn test_password_length_boundary() {
        assert!(validate_password_strength("abcdefg1").is_ok());
        assert!(validate_password_strength("abcdef1").is_err());
    }

    // =========================================================================
    // Length counts characters, not bytes
    // =========================================================================
    #[test]
    fn test_password_length_counts_chars() {
        // 7 characters, 14 bytes
        assert!(validate_password_strength("ééééééé").is_err());
        assert!(validate_password_strength("éééééé12").is_ok());
    }

    #[test]
    fn test_password_requires_letter_and_digit() {
        assert!(validate_password_strength("12345678").is_err());
        assert!(validate_password_strength("abcdefgh").is_err());
    }

    // =========================================================================
    // Malformed stored hash never verifies
    // =========================================================================
    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", "!"));
    }

    #[test]
    fn test_impossible_hash_rejects_common_inputs() {
        let hash = generate_impossible_hash();
        for attempt in ["", "password", "password1", "admin"] {
            assert!(!verify_password(attempt, &hash));
        }
    }

    #[test]
    fn test_same_password_different_salts() {
        let a = hash_password("s3cure-pass").unwrap();
        let b = hash_password("s3cure-pass").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("s3cure-pass", &a));
        assert!(verify_password("s3cure-pass", &b));
    }
}

#[cfg(test)]
mod reset_token_tests {
    use super::super::tokens::*;
    use time::OffsetDateTime;

    // =========================================================================
    // Whitespace around a pasted token does not change its digest
    // =========================================================================
    #[test]
    fn test_hash_ignores_surrounding_whitespace() {
        let token = ResetToken::generate();
        let pasted = format!("  {}\n", token.plaintext);
        assert_eq!(hash_token(&pasted), token.hash);
    }

    #[test]
    fn test_reset_token_expires_in_one_hour() {
        let before = OffsetDateTime::now_utc();
        let token = ResetToken::generate();
        let remaining = token.expires_at - before;

        assert!(remaining >= RESET_TOKEN_TTL);
        assert!(remaining < RESET_TOKEN_TTL + time::Duration::minutes(1));
    }
}

#[cfg(test)]
mod session_tests {
    use super::super::sessions::is_unexpired;
    use time::{Duration, OffsetDateTime};

    // =========================================================================
    // A session expiring right now is already expired
    // =========================================================================
    #[test]
    fn test_session_expiring_now_is_expired() {
        assert!(!is_unexpired(OffsetDateTime::now_utc()));
        assert!(is_unexpired(OffsetDateTime::now_utc() + Duration::seconds(30)));
    }
}
