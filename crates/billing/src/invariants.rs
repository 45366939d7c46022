//! Ledger Invariants Module
//!
//! Runnable consistency checks for the credit ledger and the balances it
//! explains. They can be run after a batch of settlements or on a schedule.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Tolerance for comparing DOUBLE PRECISION money values
pub const BALANCE_EPSILON: f64 = 0.0001;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Organization(s) affected
    pub org_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - balances are wrong
    Critical,
    /// High - ledger no longer explains the balance
    High,
    /// Medium - configuration that will misbehave
    Medium,
    /// Low - informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

impl InvariantCheckSummary {
    pub fn from_violations(checks_run: usize, violations: Vec<InvariantViolation>) -> Self {
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();

        Self {
            checked_at: OffsetDateTime::now_utc(),
            checks_run,
            checks_passed: checks_run.saturating_sub(checks_failed),
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        }
    }
}

/// Ledger row whose arithmetic does not add up
#[derive(Debug, sqlx::FromRow)]
struct ArithmeticRow {
    transaction_id: Uuid,
    org_id: Option<Uuid>,
    transaction_type: String,
    amount: f64,
    balance_before: f64,
    balance_after: f64,
}

/// Org balance disagreeing with its most recent ledger row
#[derive(Debug, sqlx::FromRow)]
struct BalanceMismatchRow {
    org_id: Uuid,
    org_name: String,
    credit_balance: f64,
    ledger_balance: f64,
}

/// Consecutive ledger rows that do not chain
#[derive(Debug, sqlx::FromRow)]
struct ContinuityRow {
    org_id: Uuid,
    transaction_id: Uuid,
    balance_before: f64,
    previous_balance_after: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct AutoRechargeConfigRow {
    org_id: Uuid,
    org_name: String,
    auto_recharge_amount: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct NegativeBalanceRow {
    org_id: Uuid,
    org_name: String,
    credit_balance: f64,
}

/// Service for running ledger invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let mut violations = Vec::new();

        violations.extend(self.check_ledger_arithmetic().await?);
        violations.extend(self.check_balance_matches_ledger().await?);
        violations.extend(self.check_ledger_continuity().await?);
        violations.extend(self.check_auto_recharge_configured().await?);
        violations.extend(self.check_non_negative_balance().await?);

        Ok(InvariantCheckSummary::from_violations(
            Self::available_checks().len(),
            violations,
        ))
    }

    /// Invariant 1: balance_after = balance_before + amount on every row
    async fn check_ledger_arithmetic(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ArithmeticRow> = sqlx::query_as(
            r#"
            SELECT
                id as transaction_id,
                organization_id as org_id,
                transaction_type,
                amount,
                balance_before,
                balance_after
            FROM credit_transactions
            WHERE ABS(balance_after - (balance_before + amount)) > $1
            "#,
        )
        .bind(BALANCE_EPSILON)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "ledger_arithmetic".to_string(),
                org_ids: row.org_id.into_iter().collect(),
                description: format!(
                    "Ledger row {} ({}) records {:.4} + {:.4} = {:.4}",
                    row.transaction_id,
                    row.transaction_type,
                    row.balance_before,
                    row.amount,
                    row.balance_after
                ),
                context: serde_json::json!({
                    "transaction_id": row.transaction_id,
                    "transaction_type": row.transaction_type,
                    "amount": row.amount,
                    "balance_before": row.balance_before,
                    "balance_after": row.balance_after,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: the org balance equals its latest ledger balance_after
    async fn check_balance_matches_ledger(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<BalanceMismatchRow> = sqlx::query_as(
            r#"
            SELECT
                o.id as org_id,
                o.name as org_name,
                COALESCE(o.credit_balance, 0) as credit_balance,
                latest.balance_after as ledger_balance
            FROM organizations o
            JOIN LATERAL (
                SELECT t.balance_after
                FROM credit_transactions t
                WHERE t.organization_id = o.id
                ORDER BY t.seq DESC
                LIMIT 1
            ) latest ON TRUE
            WHERE ABS(COALESCE(o.credit_balance, 0) - latest.balance_after) > $1
            "#,
        )
        .bind(BALANCE_EPSILON)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "balance_matches_ledger".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Organization '{}' has balance {:.4} but its ledger ends at {:.4}",
                    row.org_name, row.credit_balance, row.ledger_balance
                ),
                context: serde_json::json!({
                    "org_name": row.org_name,
                    "credit_balance": row.credit_balance,
                    "ledger_balance": row.ledger_balance,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: each row starts where the previous one for the org ended
    async fn check_ledger_continuity(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ContinuityRow> = sqlx::query_as(
            r#"
            SELECT org_id, transaction_id, balance_before, previous_balance_after
            FROM (
                SELECT
                    organization_id as org_id,
                    id as transaction_id,
                    balance_before,
                    LAG(balance_after) OVER (
                        PARTITION BY organization_id ORDER BY seq
                    ) as previous_balance_after
                FROM credit_transactions
                WHERE organization_id IS NOT NULL
            ) chained
            WHERE previous_balance_after IS NOT NULL
              AND ABS(balance_before - previous_balance_after) > $1
            "#,
        )
        .bind(BALANCE_EPSILON)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "ledger_continuity".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Ledger row {} starts at {:.4} but the previous row ended at {:.4}",
                    row.transaction_id, row.balance_before, row.previous_balance_after
                ),
                context: serde_json::json!({
                    "transaction_id": row.transaction_id,
                    "balance_before": row.balance_before,
                    "previous_balance_after": row.previous_balance_after,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: enabled auto-recharge has a usable amount
    async fn check_auto_recharge_configured(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<AutoRechargeConfigRow> = sqlx::query_as(
            r#"
            SELECT id as org_id, name as org_name, auto_recharge_amount
            FROM organizations
            WHERE auto_recharge_enabled = TRUE
              AND (auto_recharge_amount IS NULL OR auto_recharge_amount <= 0)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "auto_recharge_configured".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Organization '{}' has auto-recharge enabled without a positive amount",
                    row.org_name
                ),
                context: serde_json::json!({
                    "org_name": row.org_name,
                    "auto_recharge_amount": row.auto_recharge_amount,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 5: balances never go negative
    async fn check_non_negative_balance(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<NegativeBalanceRow> = sqlx::query_as(
            r#"
            SELECT id as org_id, name as org_name, credit_balance
            FROM organizations
            WHERE credit_balance < 0
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "non_negative_balance".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Organization '{}' has negative balance {:.4}",
                    row.org_name, row.credit_balance
                ),
                context: serde_json::json!({
                    "org_name": row.org_name,
                    "credit_balance": row.credit_balance,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "ledger_arithmetic" => self.check_ledger_arithmetic().await,
            "balance_matches_ledger" => self.check_balance_matches_ledger().await,
            "ledger_continuity" => self.check_ledger_continuity().await,
            "auto_recharge_configured" => self.check_auto_recharge_configured().await,
            "non_negative_balance" => self.check_non_negative_balance().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "ledger_arithmetic",
            "balance_matches_ledger",
            "ledger_continuity",
            "auto_recharge_configured",
            "non_negative_balance",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(name: &str) -> InvariantViolation {
        InvariantViolation {
            invariant: name.to_string(),
            org_ids: vec![Uuid::new_v4()],
            description: String::new(),
            context: serde_json::Value::Null,
            severity: ViolationSeverity::High,
        }
    }

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 5);
        assert!(checks.contains(&"ledger_arithmetic"));
        assert!(checks.contains(&"balance_matches_ledger"));
        assert!(checks.contains(&"non_negative_balance"));
    }

    #[test]
    fn test_summary_counts_failed_checks_once() {
        let summary = InvariantCheckSummary::from_violations(
            5,
            vec![
                violation("ledger_arithmetic"),
                violation("ledger_arithmetic"),
                violation("non_negative_balance"),
            ],
        );
        assert_eq!(summary.checks_failed, 2);
        assert_eq!(summary.checks_passed, 3);
        assert!(!summary.healthy);
    }

    #[test]
    fn test_summary_healthy_when_clean() {
        let summary = InvariantCheckSummary::from_violations(5, vec![]);
        assert!(summary.healthy);
        assert_eq!(summary.checks_passed, 5);
    }
}
