//! Admin audit trail
//!
//! Every write made through the admin console is recorded in
//! `admin_audit_log` with the acting admin, the target and request context.

use axum::http::HeaderMap;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    routes::extract_client_ip,
};

pub mod action {
    pub const ORGANIZATION_CREATED: &str = "organization_created";
    pub const CREDITS_ADDED: &str = "credits_added";
    pub const PLAN_CHANGED: &str = "plan_changed";
    pub const AUTO_RECHARGE_UPDATED: &str = "auto_recharge_updated";
    pub const CALL_SETTLED: &str = "call_settled";
}

pub mod target_type {
    pub const ORGANIZATION: &str = "organization";
    pub const CALL: &str = "call";
}

const SENSITIVE_KEYS: [&str; 8] = [
    "password",
    "password_hash",
    "token",
    "api_key",
    "secret",
    "private_key",
    "credit_card",
    "bearer_token",
];

/// Request context recorded with an audit entry
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<Uuid>,
}

impl AuditContext {
    pub fn from_request(headers: &HeaderMap, auth_user: &AuthUser) -> Self {
        Self {
            ip_address: extract_client_ip(headers),
            user_agent: headers
                .get("user-agent")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string()),
            session_id: auth_user.session_id,
        }
    }
}

/// Append an audit entry.
///
/// Runs on the caller's transaction so the entry commits or rolls back with
/// the change it describes. Failing to audit fails the request.
pub async fn log_admin_action(
    conn: &mut PgConnection,
    admin_user_id: Uuid,
    action: &str,
    target_type: &str,
    target_id: Option<Uuid>,
    details: Option<serde_json::Value>,
    context: &AuditContext,
) -> ApiResult<()> {
    let sanitized_details = details.map(sanitize_pii);

    sqlx::query(
        r#"
        INSERT INTO admin_audit_log (
            admin_user_id, action, target_type, target_id, details,
            ip_address, user_agent, session_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(admin_user_id)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(sanitized_details)
    .bind(context.ip_address.as_deref())
    .bind(context.user_agent.as_deref())
    .bind(context.session_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, action = %action, "Failed to write admin audit log");
        ApiError::Internal
    })?;

    Ok(())
}

/// Redact sensitive keys, recursing into nested objects and arrays
pub fn sanitize_pii(mut details: serde_json::Value) -> serde_json::Value {
    match &mut details {
        serde_json::Value::Object(obj) => {
            for (key, value) in obj.iter_mut() {
                if SENSITIVE_KEYS.contains(&key.as_str()) {
                    *value = serde_json::json!("[REDACTED]");
                } else {
                    *value = sanitize_pii(value.take());
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                *item = sanitize_pii(item.take());
            }
        }
        _ => {}
    }
    details
}
