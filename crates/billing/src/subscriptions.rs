//! Subscription management
//!
//! There is no subscriptions table. A subscription is a view over an
//! organization's plan and auto-recharge settings: one per organization,
//! always active, with a 30-day period anchored at the org's creation time.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::credits::{CreditLedgerEntry, LedgerTotals};
use crate::error::{BillingError, BillingResult};
use crate::plans::Plan;

/// Length of a synthesized billing period
pub const BILLING_PERIOD_DAYS: i64 = 30;

pub const SUBSCRIPTION_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

/// Organization columns a subscription is derived from
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrgBillingRow {
    pub id: Uuid,
    pub name: String,
    pub plan: Option<String>,
    pub credit_balance: Option<f64>,
    pub auto_recharge_enabled: Option<bool>,
    pub auto_recharge_amount: Option<f64>,
    pub low_credit_threshold: Option<f64>,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub organization_name: String,
    /// Stored plan string, passed through as-is
    pub plan: Option<String>,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_start: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    pub amount: f64,
    pub currency: &'static str,
    pub auto_renew: Option<bool>,
    pub credit_balance: f64,
    pub auto_recharge_amount: Option<f64>,
    pub low_credit_threshold: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Subscription {
    pub fn from_org(org: OrgBillingRow) -> Self {
        let amount = Plan::from_db(org.plan.as_deref()).monthly_price_usd();
        let period_end = org
            .created_at
            .map(|start| start + Duration::days(BILLING_PERIOD_DAYS));

        Self {
            id: org.id,
            organization_id: org.id,
            organization_name: org.name,
            plan: org.plan,
            status: SubscriptionStatus::Active,
            current_period_start: org.created_at,
            current_period_end: period_end,
            amount,
            currency: SUBSCRIPTION_CURRENCY,
            auto_renew: org.auto_recharge_enabled,
            credit_balance: org.credit_balance.unwrap_or(0.0),
            auto_recharge_amount: org.auto_recharge_amount,
            low_credit_threshold: org.low_credit_threshold,
            created_at: org.created_at,
            updated_at: org.updated_at,
        }
    }
}

/// Header figures for the subscriptions page
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubscriptionSummary {
    pub total_revenue: f64,
    pub active_subscriptions: usize,
    pub total_credits_added: f64,
}

impl SubscriptionSummary {
    pub fn compute(subscriptions: &[Subscription], recent_ledger: &[CreditLedgerEntry]) -> Self {
        let totals = LedgerTotals::from_entries(
            recent_ledger
                .iter()
                .map(|e| (e.transaction_type.as_str(), e.amount)),
        );

        Self {
            total_revenue: subscriptions.iter().map(|s| s.amount).sum(),
            active_subscriptions: subscriptions
                .iter()
                .filter(|s| s.status == SubscriptionStatus::Active)
                .count(),
            total_credits_added: totals.total_added,
        }
    }
}

/// Auto-recharge settings change
#[derive(Debug, Clone, Copy)]
pub struct AutoRechargeUpdate {
    pub enabled: bool,
    /// Left untouched when None
    pub amount: Option<f64>,
}

impl AutoRechargeUpdate {
    pub fn validate(&self) -> BillingResult<()> {
        match self.amount {
            Some(a) if !a.is_finite() || a <= 0.0 => Err(BillingError::InvalidAmount(
                "auto-recharge amount must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Subscription service
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every organization as a subscription
    pub async fn list(&self) -> BillingResult<Vec<Subscription>> {
        let rows: Vec<OrgBillingRow> = sqlx::query_as(
            r#"
            SELECT
                id, name, plan, credit_balance,
                auto_recharge_enabled, auto_recharge_amount, low_credit_threshold,
                created_at, updated_at
            FROM organizations
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Subscription::from_org).collect())
    }

    /// Move an organization to another plan
    pub async fn change_plan(&self, org_id: Uuid, plan: Plan) -> BillingResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::change_plan_in(&mut *conn, org_id, plan).await
    }

    /// Plan change on an existing connection or transaction
    pub async fn change_plan_in(conn: &mut PgConnection, org_id: Uuid, plan: Plan) -> BillingResult<()> {
        let updated = sqlx::query(
            "UPDATE organizations SET plan = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(org_id)
        .bind(plan.as_str())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(BillingError::OrganizationNotFound(org_id));
        }

        tracing::info!(org_id = %org_id, plan = %plan, "Organization plan changed");
        Ok(())
    }

    /// Enable or disable auto-recharge, optionally updating the recharge amount
    pub async fn set_auto_recharge(
        &self,
        org_id: Uuid,
        update: AutoRechargeUpdate,
    ) -> BillingResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::set_auto_recharge_in(&mut *conn, org_id, update).await
    }

    pub async fn set_auto_recharge_in(
        conn: &mut PgConnection,
        org_id: Uuid,
        update: AutoRechargeUpdate,
    ) -> BillingResult<()> {
        update.validate()?;

        let updated = sqlx::query(
            r#"
            UPDATE organizations
            SET auto_recharge_enabled = $2,
                auto_recharge_amount = COALESCE($3, auto_recharge_amount),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .bind(update.enabled)
        .bind(update.amount)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(BillingError::OrganizationNotFound(org_id));
        }

        tracing::info!(
            org_id = %org_id,
            enabled = update.enabled,
            amount = ?update.amount,
            "Auto-recharge updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn org(plan: Option<&str>) -> OrgBillingRow {
        OrgBillingRow {
            id: Uuid::new_v4(),
            name: "Acme Dispatch".to_string(),
            plan: plan.map(String::from),
            credit_balance: None,
            auto_recharge_enabled: Some(true),
            auto_recharge_amount: Some(100.0),
            low_credit_threshold: Some(10.0),
            created_at: Some(datetime!(2025-03-01 12:00 UTC)),
            updated_at: None,
        }
    }

    #[test]
    fn test_subscription_amount_follows_plan() {
        assert_eq!(Subscription::from_org(org(Some("enterprise"))).amount, 299.0);
        assert_eq!(Subscription::from_org(org(Some("professional"))).amount, 99.0);
        assert_eq!(Subscription::from_org(org(Some("starter"))).amount, 29.0);
        assert_eq!(Subscription::from_org(org(Some("legacy"))).amount, 29.0);
        assert_eq!(Subscription::from_org(org(None)).amount, 29.0);
    }

    #[test]
    fn test_subscription_period_is_thirty_days_from_creation() {
        let sub = Subscription::from_org(org(Some("starter")));
        assert_eq!(sub.current_period_start, Some(datetime!(2025-03-01 12:00 UTC)));
        assert_eq!(sub.current_period_end, Some(datetime!(2025-03-31 12:00 UTC)));
    }

    #[test]
    fn test_subscription_mirrors_org_fields() {
        let row = org(Some("professional"));
        let id = row.id;
        let sub = Subscription::from_org(row);
        assert_eq!(sub.id, id);
        assert_eq!(sub.organization_id, id);
        assert_eq!(sub.organization_name, "Acme Dispatch");
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.currency, "USD");
        assert_eq!(sub.auto_renew, Some(true));
        assert_eq!(sub.credit_balance, 0.0);
    }

    #[test]
    fn test_missing_created_at_leaves_period_open() {
        let mut row = org(None);
        row.created_at = None;
        let sub = Subscription::from_org(row);
        assert!(sub.current_period_start.is_none());
        assert!(sub.current_period_end.is_none());
    }

    #[test]
    fn test_summary_totals() {
        let subs = vec![
            Subscription::from_org(org(Some("enterprise"))),
            Subscription::from_org(org(Some("starter"))),
        ];
        let entry = |kind: &str, amount: f64| CreditLedgerEntry {
            id: Uuid::new_v4(),
            organization_id: None,
            transaction_type: kind.to_string(),
            amount,
            balance_before: 0.0,
            balance_after: amount,
            description: None,
            reference_type: None,
            reference_id: None,
            created_at: None,
        };
        let ledger = vec![entry("addition", 40.0), entry("deduction", -3.0), entry("addition", 10.0)];

        let summary = SubscriptionSummary::compute(&subs, &ledger);
        assert_eq!(summary.total_revenue, 328.0);
        assert_eq!(summary.active_subscriptions, 2);
        assert_eq!(summary.total_credits_added, 50.0);
    }

    #[test]
    fn test_auto_recharge_update_validation() {
        assert!(AutoRechargeUpdate { enabled: true, amount: None }.validate().is_ok());
        assert!(AutoRechargeUpdate { enabled: false, amount: Some(50.0) }.validate().is_ok());
        assert!(AutoRechargeUpdate { enabled: true, amount: Some(0.0) }.validate().is_err());
        assert!(AutoRechargeUpdate { enabled: true, amount: Some(-5.0) }.validate().is_err());
    }
}
