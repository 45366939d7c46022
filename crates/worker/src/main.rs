#![cfg_attr(test, allow(clippy::unwrap_used))]

//! KnightCall Background Worker
//!
//! Handles scheduled jobs including:
//! - Settling the cost of ended calls that were never billed (every minute)
//! - Auto-recharging organizations below their threshold (every 5 minutes)
//! - Ledger invariant checks (hourly)

mod jobs;

use std::sync::Arc;

use anyhow::Context;
use knightcall_billing::BillingService;
use knightcall_shared::create_pool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

const DEFAULT_SETTLEMENT_CRON: &str = "0 * * * * *";
const DEFAULT_AUTO_RECHARGE_CRON: &str = "0 */5 * * * *";
const DEFAULT_INVARIANT_CRON: &str = "0 0 * * * *";
const DEFAULT_SETTLEMENT_BATCH_SIZE: i64 = 100;

/// Worker settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkerConfig {
    database_url: String,
    settlement_cron: String,
    auto_recharge_cron: String,
    invariant_cron: String,
    settlement_batch_size: i64,
}

impl WorkerConfig {
    fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let settlement_batch_size = match std::env::var("SETTLEMENT_BATCH_SIZE") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("SETTLEMENT_BATCH_SIZE must be a positive integer, got {raw:?}"))?,
            Err(_) => DEFAULT_SETTLEMENT_BATCH_SIZE,
        };

        Ok(Self {
            database_url,
            settlement_cron: env_or("SETTLEMENT_CRON", DEFAULT_SETTLEMENT_CRON),
            auto_recharge_cron: env_or("AUTO_RECHARGE_CRON", DEFAULT_AUTO_RECHARGE_CRON),
            invariant_cron: env_or("INVARIANT_CRON", DEFAULT_INVARIANT_CRON),
            settlement_batch_size,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before the filter reads RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,knightcall_worker=debug")),
        )
        .init();

    info!("Starting KnightCall Worker");

    let config = WorkerConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let billing = Arc::new(BillingService::new(pool));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Settle unbilled calls
    let settlement_billing = billing.clone();
    let batch_size = config.settlement_batch_size;
    scheduler
        .add(Job::new_async(config.settlement_cron.as_str(), move |_uuid, _l| {
            let billing = settlement_billing.clone();
            Box::pin(async move {
                jobs::settle_unbilled_calls(&billing, batch_size).await;
            })
        })?)
        .await?;
    info!(cron = %config.settlement_cron, batch_size, "Scheduled: Call settlement");

    // Job 2: Auto-recharge
    let recharge_billing = billing.clone();
    scheduler
        .add(Job::new_async(config.auto_recharge_cron.as_str(), move |_uuid, _l| {
            let billing = recharge_billing.clone();
            Box::pin(async move {
                jobs::run_auto_recharge(&billing).await;
            })
        })?)
        .await?;
    info!(cron = %config.auto_recharge_cron, "Scheduled: Auto-recharge");

    // Job 3: Ledger invariants
    let invariant_billing = billing.clone();
    scheduler
        .add(Job::new_async(config.invariant_cron.as_str(), move |_uuid, _l| {
            let billing = invariant_billing.clone();
            Box::pin(async move {
                jobs::check_ledger_invariants(&billing).await;
            })
        })?)
        .await?;
    info!(cron = %config.invariant_cron, "Scheduled: Ledger invariant check");

    scheduler.start().await?;
    info!("Worker started, all jobs scheduled");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping worker");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 5] = [
        "DATABASE_URL",
        "SETTLEMENT_CRON",
        "AUTO_RECHARGE_CRON",
        "INVARIANT_CRON",
        "SETTLEMENT_BATCH_SIZE",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    fn set_env(key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();
        set_env("DATABASE_URL", "postgres://localhost/knightcall");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.settlement_cron, DEFAULT_SETTLEMENT_CRON);
        assert_eq!(config.auto_recharge_cron, DEFAULT_AUTO_RECHARGE_CRON);
        assert_eq!(config.invariant_cron, DEFAULT_INVARIANT_CRON);
        assert_eq!(config.settlement_batch_size, DEFAULT_SETTLEMENT_BATCH_SIZE);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_requires_database_url() {
        clear_env();
        assert!(WorkerConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_overrides() {
        clear_env();
        set_env("DATABASE_URL", "postgres://localhost/knightcall");
        set_env("SETTLEMENT_CRON", "*/30 * * * * *");
        set_env("INVARIANT_CRON", "   ");
        set_env("SETTLEMENT_BATCH_SIZE", "25");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.settlement_cron, "*/30 * * * * *");
        assert_eq!(config.invariant_cron, DEFAULT_INVARIANT_CRON);
        assert_eq!(config.settlement_batch_size, 25);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_rejects_bad_batch_size() {
        clear_env();
        set_env("DATABASE_URL", "postgres://localhost/knightcall");

        for bad in ["0", "-5", "lots"] {
            set_env("SETTLEMENT_BATCH_SIZE", bad);
            assert!(WorkerConfig::from_env().is_err(), "{bad} accepted");
        }
        clear_env();
    }
}
