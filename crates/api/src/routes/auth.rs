//! Authentication routes
//!
//! Login, token refresh, logout and password reset for admin console users.
//! Self-service signup exists but is off unless `ALLOW_SIGNUP=true`.

use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    extract_client_ip,
    validation::{normalize_email, require_email, require_non_empty},
};
use crate::{
    auth::{
        dummy_password_hash, hash_password, hash_token, sessions, validate_password_strength,
        verify_password, AuthUser, ResetToken, SessionContext, TokenPair, TokenSubject,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Generic message for reset requests, whether or not the account exists
const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent.";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_email("email address", &self.email)?;
        require_non_empty("First name", &self.first_name)?;
        require_non_empty("Last name", &self.last_name)?;
        validate_password_strength(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub organization_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
}

impl AuthResponse {
    fn new(tokens: TokenPair, user: UserProfile) -> Self {
        Self {
            expires_in: tokens.expires_in(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer",
            user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct UserCredentialsRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<String>,
    organization_id: Option<Uuid>,
    is_active: Option<bool>,
    created_at: Option<OffsetDateTime>,
}

impl UserCredentialsRow {
    fn into_profile(self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            organization_id: self.organization_id,
            created_at: self.created_at,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn session_context(headers: &HeaderMap) -> SessionContext {
    SessionContext {
        ip_address: extract_client_ip(headers),
        user_agent: headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string()),
    }
}

fn generate_tokens(state: &AppState, user: &UserProfile) -> ApiResult<TokenPair> {
    let role = user.role.as_deref().unwrap_or("user");
    let tokens = state.jwt_manager.generate_token_pair(&TokenSubject {
        user_id: user.id,
        email: &user.email,
        role,
        org_id: user.organization_id,
    })?;
    Ok(tokens)
}

/// Issue a token pair for the user and record its session
async fn issue_tokens(
    state: &AppState,
    headers: &HeaderMap,
    user: UserProfile,
) -> ApiResult<AuthResponse> {
    let tokens = generate_tokens(state, &user)?;
    sessions::save_session(&state.pool, user.id, &tokens, &session_context(headers)).await?;

    Ok(AuthResponse::new(tokens, user))
}

async fn find_user_by_email(state: &AppState, email: &str) -> ApiResult<Option<UserCredentialsRow>> {
    let user = sqlx::query_as(
        r#"
        SELECT id, email, password_hash, first_name, last_name, role,
               organization_id, is_active, created_at
        FROM users
        WHERE LOWER(email) = $1
        "#,
    )
    .bind(email)
    .fetch_optional(&state.pool)
    .await?;

    Ok(user)
}

async fn find_user_by_id(state: &AppState, user_id: Uuid) -> ApiResult<Option<UserCredentialsRow>> {
    let user = sqlx::query_as(
        r#"
        SELECT id, email, password_hash, first_name, last_name, role,
               organization_id, is_active, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    Ok(user)
}

// =============================================================================
// Endpoints
// =============================================================================

/// Sign in with email and password
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = normalize_email(&req.email);

    let Some(user) = find_user_by_email(&state, &email).await? else {
        // Same argon2 cost as a real account
        let _ = verify_password(&req.password, dummy_password_hash());
        tracing::info!(email = %email, "Login failed: unknown account");
        return Err(ApiError::Unauthorized);
    };

    if !verify_password(&req.password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::Unauthorized);
    }

    if user.is_active == Some(false) {
        tracing::warn!(user_id = %user.id, "Login rejected: account deactivated");
        return Err(ApiError::Unauthorized);
    }

    tracing::info!(user_id = %user.id, role = ?user.role, "User logged in");
    let response = issue_tokens(&state, &headers, user.into_profile()).await?;
    Ok(Json(response))
}

/// Create a `user`-role account
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    if !state.config.allow_signup {
        return Err(ApiError::Forbidden);
    }

    req.validate().map_err(ApiError::Validation)?;

    let email = normalize_email(&req.email);
    if find_user_by_email(&state, &email).await?.is_some() {
        return Err(ApiError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;

    let user: UserProfile = sqlx::query_as(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, role, is_active)
        VALUES ($1, $2, $3, $4, 'user', TRUE)
        RETURNING id, email, first_name, last_name, role, organization_id, created_at
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(user_id = %user.id, "Account created via signup");
    let response = issue_tokens(&state, &headers, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Exchange a refresh token for a new pair, revoking the old session.
///
/// Each refresh token can be exchanged once; replays get 401.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let claims = state.jwt_manager.validate_refresh_token(&req.refresh_token)?;

    let Some(user) = find_user_by_id(&state, claims.sub).await? else {
        return Err(ApiError::Unauthorized);
    };
    if user.is_active == Some(false) {
        sessions::revoke_all_sessions(&state.pool, user.id, "account_deactivated").await?;
        return Err(ApiError::Unauthorized);
    }

    let user = user.into_profile();
    let tokens = generate_tokens(&state, &user)?;

    let mut tx = state.pool.begin().await?;
    if !sessions::consume_refresh_session(&mut *tx, &claims.jti, claims.sub).await? {
        tracing::warn!(user_id = %claims.sub, jti = %claims.jti, "Refresh with revoked session");
        return Err(ApiError::Unauthorized);
    }
    sessions::save_session_in(&mut *tx, user.id, &tokens, &session_context(&headers)).await?;
    tx.commit().await?;

    Ok(Json(AuthResponse::new(tokens, user)))
}

/// Revoke the session behind the current access token
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let revoked = sessions::revoke_access_session(&state.pool, &auth_user.jti, "logout").await?;
    tracing::info!(user_id = %auth_user.user_id, revoked, "User logged out");

    Ok(Json(json!({ "success": true })))
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UserProfile>> {
    let user = find_user_by_id(&state, auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(user.into_profile()))
}

/// Email a password reset link. Always answers 200.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = normalize_email(&req.email);
    let response = Json(MessageResponse {
        message: RESET_REQUESTED_MESSAGE.to_string(),
    });

    let user = match find_user_by_email(&state, &email).await? {
        Some(user) if user.is_active != Some(false) => user,
        _ => {
            tracing::info!(email = %email, "Password reset requested for unknown or inactive account");
            return Ok(response);
        }
    };

    let token = ResetToken::generate();
    sqlx::query(
        r#"
        INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user.id)
    .bind(&token.hash)
    .bind(token.expires_at)
    .execute(&state.pool)
    .await?;

    let reset_url = state.config.password_reset_url(&token.plaintext);
    if let Err(e) = state.email.send_password_reset(&user.email, &reset_url).await {
        tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
    }

    Ok(response)
}

/// Set a new password with a reset token and sign out everywhere
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> ApiResult<Json<MessageResponse>> {
    validate_password_strength(&req.new_password).map_err(ApiError::Validation)?;

    let password_hash = hash_password(&req.new_password)?;

    let mut tx = state.pool.begin().await?;

    // Claiming the token is the validity check, so it can be spent only once
    let user_id: Uuid = sqlx::query_scalar(
        r#"
        UPDATE password_reset_tokens
        SET used_at = NOW()
        WHERE token_hash = $1
          AND used_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
        "#,
    )
    .bind(hash_token(&req.token))
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::Validation("Invalid or expired reset token".to_string()))?;

    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&password_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    // Any other outstanding links for the user die with this one
    sqlx::query(
        r#"
        UPDATE password_reset_tokens
        SET used_at = NOW()
        WHERE user_id = $1 AND used_at IS NULL
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let revoked = sessions::revoke_all_sessions(&mut *tx, user_id, "password_reset").await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, sessions_revoked = revoked, "Password reset completed");

    Ok(Json(MessageResponse {
        message: "Password updated. Please sign in with your new password.".to_string(),
    }))
}
