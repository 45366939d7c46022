//! Admin session tracking for JWT revocation
//!
//! Every issued token pair is recorded in `user_sessions` keyed by its JTI.
//! The refresh session is the parent; the access session points at it, so
//! revoking a refresh session also revokes the access token issued with it.

use sqlx::{PgConnection, PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::jwt::TokenPair;
use crate::error::ApiResult;

/// Maximum concurrent refresh sessions per user
const MAX_SESSIONS_PER_USER: i64 = 10;

/// Client details recorded with a session
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Record a freshly issued token pair in its own transaction
pub async fn save_session(
    pool: &PgPool,
    user_id: Uuid,
    tokens: &TokenPair,
    context: &SessionContext,
) -> ApiResult<Uuid> {
    let mut tx = pool.begin().await?;
    let session_id = save_session_in(&mut *tx, user_id, tokens, context).await?;
    tx.commit().await?;
    Ok(session_id)
}

/// Record a freshly issued token pair on the caller's transaction.
///
/// When the user is at the session limit their oldest refresh session is
/// revoked first.
pub async fn save_session_in(
    tx: &mut PgConnection,
    user_id: Uuid,
    tokens: &TokenPair,
    context: &SessionContext,
) -> ApiResult<Uuid> {
    let session_count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM user_sessions
        WHERE user_id = $1
          AND revoked_at IS NULL
          AND expires_at > NOW()
          AND token_type = 'refresh'
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    if session_count.0 >= MAX_SESSIONS_PER_USER {
        tracing::info!(
            user_id = %user_id,
            current_sessions = session_count.0,
            max_sessions = MAX_SESSIONS_PER_USER,
            "Revoking oldest session due to max sessions limit"
        );

        sqlx::query(
            r#"
            UPDATE user_sessions
            SET revoked_at = NOW(),
                revocation_reason = 'max_sessions_exceeded'
            WHERE id IN (
                SELECT id FROM user_sessions
                WHERE user_id = $1
                  AND revoked_at IS NULL
                  AND token_type = 'refresh'
                ORDER BY created_at ASC
                LIMIT 1
            )
            OR parent_session_id IN (
                SELECT id FROM user_sessions
                WHERE user_id = $1
                  AND revoked_at IS NULL
                  AND token_type = 'refresh'
                ORDER BY created_at ASC
                LIMIT 1
            )
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    let refresh_session_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO user_sessions (user_id, jti, token_type, expires_at, ip_address, user_agent)
        VALUES ($1, $2, 'refresh', $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&tokens.refresh_jti)
    .bind(tokens.refresh_expires_at)
    .bind(context.ip_address.as_deref())
    .bind(context.user_agent.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO user_sessions (
            user_id, jti, token_type, expires_at, ip_address, user_agent, parent_session_id
        )
        VALUES ($1, $2, 'access', $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(&tokens.access_jti)
    .bind(tokens.access_expires_at)
    .bind(context.ip_address.as_deref())
    .bind(context.user_agent.as_deref())
    .bind(refresh_session_id)
    .execute(&mut *tx)
    .await?;

    Ok(refresh_session_id)
}

/// Consume a refresh session for rotation.
///
/// The revoke is the check: only one caller can flip an active session to
/// revoked, so a refresh token is exchanged at most once. Returns false when
/// the session was already revoked, expired or belongs to someone else.
pub async fn consume_refresh_session(
    conn: &mut PgConnection,
    jti: &str,
    user_id: Uuid,
) -> ApiResult<bool> {
    let session_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE user_sessions
        SET revoked_at = NOW(),
            revocation_reason = 'rotated'
        WHERE jti = $1
          AND user_id = $2
          AND token_type = 'refresh'
          AND revoked_at IS NULL
          AND expires_at > NOW()
        RETURNING id
        "#,
    )
    .bind(jti)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(session_id) = session_id else {
        return Ok(false);
    };

    sqlx::query(
        r#"
        UPDATE user_sessions
        SET revoked_at = NOW(),
            revocation_reason = 'rotated'
        WHERE parent_session_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(session_id)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

/// Session id for a JTI that is unrevoked, unexpired and owned by the user
pub async fn active_session_id(
    pool: &PgPool,
    jti: &str,
    expected_user_id: Uuid,
) -> ApiResult<Option<Uuid>> {
    let id: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM user_sessions
        WHERE jti = $1
          AND user_id = $2
          AND revoked_at IS NULL
          AND expires_at > NOW()
        "#,
    )
    .bind(jti)
    .bind(expected_user_id)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Revoke a session by JTI together with any child access sessions.
///
/// Returns true if an active session was found.
pub async fn revoke_session(pool: &PgPool, jti: &str, reason: &str) -> ApiResult<bool> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE user_sessions
        SET revoked_at = NOW(),
            revocation_reason = $2
        WHERE revoked_at IS NULL
          AND (
              jti = $1
              OR parent_session_id = (SELECT id FROM user_sessions WHERE jti = $1)
          )
        "#,
    )
    .bind(jti)
    .bind(reason)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}

/// Revoke the session an access token belongs to, including its refresh parent
pub async fn revoke_access_session(pool: &PgPool, access_jti: &str, reason: &str) -> ApiResult<bool> {
    let parent_jti: Option<String> = sqlx::query_scalar(
        r#"
        SELECT parent.jti
        FROM user_sessions child
        JOIN user_sessions parent ON parent.id = child.parent_session_id
        WHERE child.jti = $1
        "#,
    )
    .bind(access_jti)
    .fetch_optional(pool)
    .await?;

    match parent_jti {
        Some(jti) => revoke_session(pool, &jti, reason).await,
        None => revoke_session(pool, access_jti, reason).await,
    }
}

/// Revoke every session for a user.
///
/// Used on password reset and when an account is deactivated.
pub async fn revoke_all_sessions(
    executor: impl PgExecutor<'_>,
    user_id: Uuid,
    reason: &str,
) -> ApiResult<u64> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE user_sessions
        SET revoked_at = NOW(),
            revocation_reason = $2
        WHERE user_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(user_id)
    .bind(reason)
    .execute(executor)
    .await?
    .rows_affected();

    Ok(rows_affected)
}

/// True when `expires_at` is still in the future
pub fn is_unexpired(expires_at: OffsetDateTime) -> bool {
    expires_at > OffsetDateTime::now_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_is_unexpired() {
        assert!(is_unexpired(OffsetDateTime::now_utc() + Duration::minutes(5)));
        assert!(!is_unexpired(OffsetDateTime::now_utc() - Duration::seconds(1)));
    }

    #[test]
    fn test_session_context_default_is_empty() {
        let ctx = SessionContext::default();
        assert!(ctx.ip_address.is_none());
        assert!(ctx.user_agent.is_none());
    }
}
