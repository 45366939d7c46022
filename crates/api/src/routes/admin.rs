//! Helpers shared by the platform admin routes
//!
//! Superadmins and admins may read and write; staff may only read.

use uuid::Uuid;

use crate::{
    auth::{platform_access_allowed, AuthUser},
    error::{ApiError, ApiResult},
};

/// Log comprehensive database error details for debugging
pub(crate) fn log_db_err(req_id: Uuid, step: &'static str, e: &sqlx::Error) {
    if let Some(db) = e.as_database_error() {
        tracing::error!(
            %req_id,
            step,
            code = ?db.code(),
            message = db.message(),
            table = ?db.table(),
            constraint = ?db.constraint(),
            "Database query failed"
        );
    } else {
        tracing::error!(%req_id, step, error = ?e, "Non-database SQLx error");
    }
}

/// Gate an admin handler on the caller's platform role
pub(crate) fn require_platform_admin(auth_user: &AuthUser, require_write: bool) -> ApiResult<Uuid> {
    if platform_access_allowed(&auth_user.role, require_write) {
        return Ok(auth_user.user_id);
    }

    tracing::warn!(
        user_id = %auth_user.user_id,
        role = %auth_user.role,
        require_write,
        "Unauthorized admin access attempt"
    );
    Err(ApiError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "someone@knightcall.ai".to_string(),
            role: role.to_string(),
            org_id: None,
            session_id: None,
            jti: "jti".to_string(),
        }
    }

    #[test]
    fn test_admins_can_write() {
        assert!(require_platform_admin(&user("superadmin"), true).is_ok());
        assert!(require_platform_admin(&user("admin"), true).is_ok());
    }

    #[test]
    fn test_staff_read_only() {
        assert!(require_platform_admin(&user("staff"), false).is_ok());
        assert!(matches!(
            require_platform_admin(&user("staff"), true),
            Err(ApiError::Forbidden)
        ));
    }

    #[test]
    fn test_regular_users_forbidden() {
        assert!(require_platform_admin(&user("user"), false).is_err());
        assert!(require_platform_admin(&user(""), false).is_err());
    }
}
