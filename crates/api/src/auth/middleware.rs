//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{jwt::JwtManager, sessions};

/// Cookie the dashboard stores the access token in
pub const AUTH_COOKIE_NAME: &str = "knightcall_auth_token";

/// Current state of the token's user
#[derive(Debug, FromRow)]
struct UserStatusRow {
    email: String,
    role: Option<String>,
    organization_id: Option<Uuid>,
    is_active: Option<bool>,
}

/// Authenticated user information extracted from the access token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    /// Role as stored on the user row at request time
    pub role: String,
    pub org_id: Option<Uuid>,
    /// Session ID for linking requests to audit logs
    pub session_id: Option<Uuid>,
    /// JTI of the access token used for this request
    pub jti: String,
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub pool: PgPool,
}

/// Extract the access token from the auth cookie
fn extract_token_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                cookie
                    .trim()
                    .strip_prefix(AUTH_COOKIE_NAME)
                    .and_then(|rest| rest.strip_prefix('='))
                    .filter(|token| !token.is_empty())
                    .map(String::from)
            })
        })
}

/// Extract bearer token from Authorization header or the auth cookie.
/// Prefers the header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    extract_token_from_cookie(headers)
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let auth_result = match extract_bearer_token(request.headers()) {
        Some(token) => authenticate_jwt(&auth_state, &token).await,
        None if request.headers().contains_key(AUTHORIZATION) => {
            Err(AuthError::InvalidAuthFormat)
        }
        None => {
            tracing::debug!(path = %path, "require_auth: no token in header or cookie");
            Err(AuthError::MissingAuth)
        }
    };

    match auth_result {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                role = %auth_user.role,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

async fn authenticate_jwt(auth_state: &AuthState, token: &str) -> Result<AuthUser, AuthError> {
    let claims = auth_state.jwt_manager.validate_access_token(token)?;

    let session_id = sessions::active_session_id(&auth_state.pool, &claims.jti, claims.sub)
        .await
        .map_err(|_| AuthError::DatabaseError)?;

    let Some(session_id) = session_id else {
        tracing::warn!(jti = %claims.jti, user_id = %claims.sub, "Session revoked or expired");
        return Err(AuthError::InvalidToken);
    };

    // Role and active flag are re-read so demotions take effect immediately
    let user: Option<UserStatusRow> = sqlx::query_as(
        "SELECT email, role, organization_id, is_active FROM users WHERE id = $1",
    )
    .bind(claims.sub)
    .fetch_optional(&auth_state.pool)
    .await
    .map_err(|_| AuthError::DatabaseError)?;

    let Some(user) = user else {
        tracing::warn!(user_id = %claims.sub, "Token user no longer exists");
        return Err(AuthError::InvalidToken);
    };

    if user.is_active == Some(false) {
        tracing::warn!(user_id = %claims.sub, "Token user is deactivated");
        return Err(AuthError::InvalidToken);
    }

    Ok(AuthUser {
        user_id: claims.sub,
        email: user.email,
        role: user.role.unwrap_or_else(|| "user".to_string()),
        org_id: user.organization_id,
        session_id: Some(session_id),
        jti: claims.jti,
    })
}

/// Whether a platform role may use the admin console.
///
/// Superadmins and admins may read and write; staff may only read.
pub fn platform_access_allowed(role: &str, require_write: bool) -> bool {
    match role {
        "superadmin" | "admin" => true,
        "staff" => !require_write,
        _ => false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid authentication format")]
    InvalidAuthFormat,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Database error")]
    DatabaseError,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidAuthFormat => {
                (StatusCode::UNAUTHORIZED, "Invalid authentication format")
            }
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::InsufficientPermissions => {
                (StatusCode::FORBIDDEN, "Insufficient permissions")
            }
            AuthError::DatabaseError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
