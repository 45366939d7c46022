//! Server configuration loaded from the environment

use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Minimum JWT secret length (HS256 key)
const MIN_JWT_SECRET_LEN: usize = 32;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

#[derive(Debug, Clone)]
pub struct Config {
    /// Pooled connection string used for queries
    pub database_url: String,
    /// Direct connection string used for migrations (bypasses PgBouncer)
    pub database_direct_url: Option<String>,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub refresh_expiry_days: i64,
    /// Empty when transactional email is not configured
    pub resend_api_key: String,
    pub email_from: String,
    /// Base URL of the dashboard, used to build password reset links
    pub public_app_url: String,
    pub allowed_origins: Vec<String>,
    pub allow_signup: bool,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {} characters", MIN_JWT_SECRET_LEN),
            });
        }

        Ok(Self {
            database_url,
            database_direct_url: optional("DATABASE_DIRECT_URL"),
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret,
            jwt_expiry_hours: parse_or("JWT_EXPIRY_HOURS", 24)?,
            refresh_expiry_days: parse_or("REFRESH_EXPIRY_DAYS", 30)?,
            resend_api_key: optional("RESEND_API_KEY").unwrap_or_default(),
            email_from: optional("EMAIL_FROM")
                .unwrap_or_else(|| "KnightCall <no-reply@knightcall.ai>".to_string()),
            public_app_url: optional("PUBLIC_APP_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
            allowed_origins: parse_origins(
                &optional("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            allow_signup: parse_flag(optional("ALLOW_SIGNUP").as_deref()),
            run_migrations: parse_flag(optional("RUN_MIGRATIONS").as_deref()),
        })
    }

    /// URL the password reset email links to
    pub fn password_reset_url(&self, token: &str) -> String {
        format!("{}/reset-password?token={}", self.public_app_url, token)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(v) if v > 0 => Ok(v),
            Ok(v) => Err(ConfigError::Invalid {
                name,
                reason: format!("must be positive (got {})", v),
            }),
            Err(e) => Err(ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
        },
    }
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
