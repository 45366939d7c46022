//! Single-use password reset tokens
//!
//! The plaintext token only ever travels in the reset email; the database
//! stores its SHA-256 digest.

use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// How long a reset link stays valid
pub const RESET_TOKEN_TTL: Duration = Duration::hours(1);

const TOKEN_BYTES: usize = 32;

/// A newly minted reset token
#[derive(Debug, Clone)]
pub struct ResetToken {
    /// Sent to the user, never stored
    pub plaintext: String,
    /// Stored in `password_reset_tokens.token_hash`
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

impl ResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let plaintext = hex::encode(bytes);

        Self {
            hash: hash_token(&plaintext),
            plaintext,
            expires_at: OffsetDateTime::now_utc() + RESET_TOKEN_TTL,
        }
    }
}

/// Hex SHA-256 digest of a token as presented by the client
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}
