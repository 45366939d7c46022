//! PostgreSQL connection pools and migrations

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;

/// Pool size for request-serving connections
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Requests should fail fast instead of queueing behind a saturated pool
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Migrations may rewrite tables and hold locks for a while
const MIGRATION_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
    #[error("Database connection failed: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Create the pool used for regular queries.
///
/// Prepared statements are disabled so the pool also works behind
/// transaction-mode poolers such as PgBouncer.
pub async fn create_pool(database_url: &str) -> Result<PgPool, DbError> {
    let options = PgConnectOptions::from_str(database_url)
        .map_err(|e| DbError::InvalidUrl(e.to_string()))?
        .statement_cache_capacity(0);

    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;

    tracing::debug!(
        max_connections = DEFAULT_MAX_CONNECTIONS,
        "Database pool created"
    );
    Ok(pool)
}

/// Create a single-connection pool for running migrations against the direct URL
pub async fn create_migration_pool(database_url: &str) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(MIGRATION_ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Apply all embedded migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!(
        available = MIGRATOR.iter().count(),
        "Applying database migrations"
    );
    MIGRATOR.run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_connecting() {
        let result = create_pool("not a url").await;
        assert!(matches!(result, Err(DbError::InvalidUrl(_))));
    }

    #[test]
    fn test_migrations_are_embedded_in_order() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(versions.len() >= 3);
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_ledger_rows_carry_a_commit_order_sequence() {
        let ordering = MIGRATOR
            .iter()
            .find(|m| m.description.contains("ledger ordering"))
            .unwrap();
        assert!(ordering.sql.contains("clock_timestamp()"));
        assert!(ordering.sql.contains("GENERATED ALWAYS AS IDENTITY"));
    }
}
