//! Auto-recharge
//!
//! Organizations that opt in get `auto_recharge_amount` credits added once
//! their balance drops below `low_credit_threshold`.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::credits::{CreditAddition, CreditAdditionResult, CreditReference, CreditService};
use crate::error::BillingResult;

pub const AUTO_RECHARGE_DESCRIPTION: &str = "Automatic credit recharge";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RechargeCandidate {
    pub id: Uuid,
    pub name: String,
    pub credit_balance: Option<f64>,
    pub auto_recharge_amount: Option<f64>,
    pub low_credit_threshold: Option<f64>,
}

impl RechargeCandidate {
    /// Amount to add, or None when the org does not currently qualify
    pub fn recharge_amount(&self) -> Option<f64> {
        let amount = self.auto_recharge_amount.filter(|a| a.is_finite() && *a > 0.0)?;
        let threshold = self.low_credit_threshold?;
        let balance = self.credit_balance.unwrap_or(0.0);
        (balance < threshold).then_some(amount)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RechargeOutcome {
    Recharged {
        org_id: Uuid,
        amount: f64,
        balance_after: f64,
    },
    Failed {
        org_id: Uuid,
        error: String,
    },
}

#[derive(Clone)]
pub struct AutoRechargeService {
    pool: PgPool,
}

impl AutoRechargeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn candidates(&self) -> BillingResult<Vec<RechargeCandidate>> {
        let rows = sqlx::query_as::<_, RechargeCandidate>(
            r#"
            SELECT id, name, credit_balance, auto_recharge_amount, low_credit_threshold
            FROM organizations
            WHERE COALESCE(is_active, TRUE)
              AND auto_recharge_enabled = TRUE
              AND auto_recharge_amount > 0
              AND low_credit_threshold IS NOT NULL
              AND COALESCE(credit_balance, 0) < low_credit_threshold
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Recharge one organization if it still qualifies.
    ///
    /// The organization row is locked and its settings re-read before
    /// crediting, so overlapping runs recharge it at most once.
    pub async fn recharge_if_below_threshold(
        conn: &mut PgConnection,
        org_id: Uuid,
    ) -> BillingResult<Option<CreditAdditionResult>> {
        let locked: Option<RechargeCandidate> = sqlx::query_as(
            r#"
            SELECT id, name, credit_balance, auto_recharge_amount, low_credit_threshold
            FROM organizations
            WHERE id = $1
              AND COALESCE(is_active, TRUE)
              AND auto_recharge_enabled = TRUE
            FOR UPDATE
            "#,
        )
        .bind(org_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(amount) = locked.as_ref().and_then(RechargeCandidate::recharge_amount) else {
            return Ok(None);
        };

        let addition = CreditAddition {
            org_id,
            amount,
            description: Some(AUTO_RECHARGE_DESCRIPTION.to_string()),
            reference: Some(CreditReference::auto_recharge(org_id)),
        };
        let result = CreditService::add_credits_in(conn, &addition).await?;
        Ok(Some(result))
    }

    async fn recharge_one(&self, org_id: Uuid) -> BillingResult<Option<CreditAdditionResult>> {
        let mut tx = self.pool.begin().await?;
        let result = Self::recharge_if_below_threshold(&mut *tx, org_id).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Recharge every qualifying organization.
    ///
    /// A failure for one org is recorded in its outcome and does not stop the run.
    pub async fn run(&self) -> BillingResult<Vec<RechargeOutcome>> {
        let candidates = self.candidates().await?;
        let mut outcomes = Vec::with_capacity(candidates.len());

        for org in candidates {
            match self.recharge_one(org.id).await {
                Ok(Some(result)) => {
                    let amount = result.transaction.amount;
                    tracing::info!(
                        org_id = %org.id,
                        org_name = %org.name,
                        amount,
                        balance_after = result.balance_after,
                        "Auto-recharge applied"
                    );
                    outcomes.push(RechargeOutcome::Recharged {
                        org_id: org.id,
                        amount,
                        balance_after: result.balance_after,
                    });
                }
                Ok(None) => {
                    tracing::debug!(org_id = %org.id, "Auto-recharge skipped: no longer below threshold");
                }
                Err(e) => {
                    tracing::error!(org_id = %org.id, error = %e, "Auto-recharge failed");
                    outcomes.push(RechargeOutcome::Failed {
                        org_id: org.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(outcomes)
    }
}
