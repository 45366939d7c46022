//! Per-call cost settlement
//!
//! Pricing and the balance debit both happen inside
//! `compute_and_deduct_call_cost`; this module only invokes it and decodes
//! the JSON it returns.

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Error code the procedure returns for an unknown external call id
pub const CALL_NOT_FOUND: &str = "call_not_found";

/// Error code the procedure returns when the balance cannot cover the call
pub const INSUFFICIENT_CREDITS: &str = "insufficient_credits";

/// Outcome reported by `compute_and_deduct_call_cost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCostSettlement {
    pub success: bool,
    #[serde(default)]
    pub call_cost: Option<f64>,
    #[serde(default)]
    pub credits_deducted: Option<f64>,
    #[serde(default)]
    pub balance_after: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub already_billed: bool,
}

impl CallCostSettlement {
    pub fn from_json(value: serde_json::Value) -> BillingResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| BillingError::UnexpectedResult(format!("{} in {}", e, value)))
    }

    pub fn is_insufficient_credits(&self) -> bool {
        self.error.as_deref() == Some(INSUFFICIENT_CREDITS)
    }
}

/// A finished call that has not been charged yet
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UnbilledCall {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub external_call_id: String,
    pub duration_seconds: Option<i32>,
    pub billing_status: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct CallCostService {
    pool: PgPool,
}

impl CallCostService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Price a call and debit its organization.
    ///
    /// An unknown call id becomes `CallNotFound`. A declined debit is still a
    /// successful settlement attempt and comes back with `success == false`.
    pub async fn settle(&self, external_call_id: &str) -> BillingResult<CallCostSettlement> {
        let mut conn = self.pool.acquire().await?;
        Self::settle_in(&mut *conn, external_call_id).await
    }

    /// Settlement on an existing connection or transaction
    pub async fn settle_in(
        conn: &mut PgConnection,
        external_call_id: &str,
    ) -> BillingResult<CallCostSettlement> {
        let raw: serde_json::Value = sqlx::query_scalar("SELECT compute_and_deduct_call_cost($1)")
            .bind(external_call_id)
            .fetch_one(&mut *conn)
            .await?;

        let settlement = CallCostSettlement::from_json(raw)?;

        if settlement.error.as_deref() == Some(CALL_NOT_FOUND) {
            return Err(BillingError::CallNotFound(external_call_id.to_string()));
        }

        if settlement.success {
            tracing::info!(
                external_call_id,
                call_cost = ?settlement.call_cost,
                balance_after = ?settlement.balance_after,
                already_billed = settlement.already_billed,
                "Call cost settled"
            );
        } else {
            tracing::warn!(
                external_call_id,
                call_cost = ?settlement.call_cost,
                error = ?settlement.error,
                "Call cost not deducted"
            );
        }

        Ok(settlement)
    }

    /// Calls with an external id that were never charged, oldest first
    pub async fn unbilled_calls(&self, limit: i64) -> BillingResult<Vec<UnbilledCall>> {
        let rows = sqlx::query_as::<_, UnbilledCall>(
            r#"
            SELECT id, organization_id, external_call_id, duration_seconds, billing_status, created_at
            FROM calls
            WHERE external_call_id IS NOT NULL
              AND (ended_at IS NOT NULL OR call_status IN ('ended', 'completed'))
              AND (billing_status IS NULL OR billing_status = 'pending')
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
