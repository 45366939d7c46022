//! API error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use knightcall_billing::BillingError;
use serde_json::json;

use crate::auth::AuthError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Details are logged, never returned to the client
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Authentication required".to_string(),
            ApiError::Forbidden => "Insufficient permissions".to_string(),
            ApiError::NotFound => "Resource not found".to_string(),
            ApiError::Validation(msg) | ApiError::Conflict(msg) => msg.clone(),
            ApiError::Database(_) | ApiError::Internal => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ApiError::Database(detail) = &self {
            tracing::error!(error = %detail, "Request failed with database error");
        }

        let body = Json(json!({
            "error": self.public_message(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Conflict("A record with these details already exists".to_string())
            }
            _ => ApiError::Database(e.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::OrganizationNotFound(_) | BillingError::CallNotFound(_) => {
                ApiError::NotFound
            }
            BillingError::InvalidPlan(_)
            | BillingError::InvalidAmount(_)
            | BillingError::InsufficientCredits(_) => ApiError::Validation(e.to_string()),
            BillingError::Database(db) => db.into(),
            BillingError::UnexpectedResult(detail) => ApiError::Database(detail),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingAuth | AuthError::InvalidAuthFormat | AuthError::InvalidToken => {
                ApiError::Unauthorized
            }
            AuthError::InsufficientPermissions => ApiError::Forbidden,
            AuthError::DatabaseError | AuthError::Internal(_) => ApiError::Internal,
        }
    }
}
