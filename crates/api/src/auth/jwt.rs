//! JWT issuing and validation (HS256)

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::middleware::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub org_id: Option<Uuid>,
    pub token_type: TokenType,
    /// Session key in `user_sessions`
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Freshly issued access and refresh tokens
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_jti: String,
    pub refresh_jti: String,
    pub access_expires_at: OffsetDateTime,
    pub refresh_expires_at: OffsetDateTime,
}

impl TokenPair {
    /// Seconds until the access token expires
    pub fn expires_in(&self) -> i64 {
        (self.access_expires_at - OffsetDateTime::now_utc()).whole_seconds()
    }
}

/// Identity embedded in issued tokens
#[derive(Debug, Clone)]
pub struct TokenSubject<'a> {
    pub user_id: Uuid,
    pub email: &'a str,
    pub role: &'a str,
    pub org_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_expiry: Duration,
    refresh_expiry: Duration,
}

impl JwtManager {
    pub fn new(secret: &str, access_expiry_hours: i64, refresh_expiry_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_expiry: Duration::hours(access_expiry_hours),
            refresh_expiry: Duration::days(refresh_expiry_days),
        }
    }

    pub fn generate_token_pair(&self, subject: &TokenSubject<'_>) -> Result<TokenPair, AuthError> {
        let now = OffsetDateTime::now_utc();
        let access_expires_at = now + self.access_expiry;
        let refresh_expires_at = now + self.refresh_expiry;

        let access_jti = Uuid::new_v4().to_string();
        let refresh_jti = Uuid::new_v4().to_string();

        let access_token =
            self.sign(subject, TokenType::Access, &access_jti, now, access_expires_at)?;
        let refresh_token =
            self.sign(subject, TokenType::Refresh, &refresh_jti, now, refresh_expires_at)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_jti,
            refresh_jti,
            access_expires_at,
            refresh_expires_at,
        })
    }

    fn sign(
        &self,
        subject: &TokenSubject<'_>,
        token_type: TokenType,
        jti: &str,
        issued_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject.user_id,
            email: subject.email.to_string(),
            role: subject.role.to_string(),
            org_id: subject.org_id,
            token_type,
            jti: jti.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;

        if data.claims.token_type != expected {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate(token, TokenType::Access)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate(token, TokenType::Refresh)
    }
}
