//! Transactional email via the Resend HTTP API

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Delivery attempts per message, including the first
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Email provider rejected message with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Serialize)]
struct ResendMessage<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
    text: String,
}

#[derive(Clone)]
pub struct EmailService {
    client: Client,
    api_key: String,
    from: String,
}

impl EmailService {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    /// False when no API key is configured; messages are then only logged
    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub async fn send_password_reset(&self, to: &str, reset_url: &str) -> Result<(), EmailError> {
        if !self.is_enabled() {
            tracing::warn!(
                to = %to,
                reset_url = %reset_url,
                "RESEND_API_KEY not set, password reset link not emailed"
            );
            return Ok(());
        }

        let message = ResendMessage {
            from: &self.from,
            to: [to],
            subject: "Reset your KnightCall admin password",
            html: format!(
                "<p>A password reset was requested for your KnightCall admin account.</p>\
                 <p><a href=\"{url}\">Reset your password</a></p>\
                 <p>This link expires in one hour. If you did not request it, ignore this email.</p>",
                url = reset_url
            ),
            text: format!(
                "A password reset was requested for your KnightCall admin account.\n\n\
                 Reset your password: {}\n\n\
                 This link expires in one hour. If you did not request it, ignore this email.",
                reset_url
            ),
        };

        self.deliver(&message).await?;
        tracing::info!(to = %to, "Password reset email sent");
        Ok(())
    }

    async fn deliver(&self, message: &ResendMessage<'_>) -> Result<(), EmailError> {
        let strategy = ExponentialBackoff::from_millis(200)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(MAX_ATTEMPTS - 1);

        Retry::spawn(strategy, || async {
            let response = self
                .client
                .post(RESEND_ENDPOINT)
                .bearer_auth(&self.api_key)
                .json(message)
                .send()
                .await
                .map_err(|e| {
                    tracing::warn!(error = %e, "Email delivery attempt failed");
                    EmailError::Request(e)
                })?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                tracing::warn!(status = status.as_u16(), "Email provider returned error");
                Err(EmailError::Rejected(status.as_u16()))
            }
        })
        .await
    }
}
