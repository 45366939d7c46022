//! Application state

use std::sync::Arc;

use knightcall_billing::BillingService;
use sqlx::PgPool;

use crate::{
    auth::{AuthState, JwtManager},
    config::Config,
    email::EmailService,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
    pub email: EmailService,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt_manager = JwtManager::new(
            &config.jwt_secret,
            config.jwt_expiry_hours,
            config.refresh_expiry_days,
        );

        let billing = Arc::new(BillingService::new(pool.clone()));
        tracing::info!("Billing service initialized");

        let email = EmailService::new(config.resend_api_key.clone(), config.email_from.clone());
        if email.is_enabled() {
            tracing::info!("Password reset email enabled");
        } else {
            tracing::warn!("Password reset email not configured (missing RESEND_API_KEY)");
        }

        if config.allow_signup {
            tracing::warn!("Self-service signup is enabled (ALLOW_SIGNUP=true)");
        }

        Self {
            pool,
            config,
            jwt_manager,
            billing,
            email,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            pool: self.pool.clone(),
        }
    }
}
