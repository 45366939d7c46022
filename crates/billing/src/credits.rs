//! Prepaid credit ledger
//!
//! Every balance change on an organization is mirrored by an append-only
//! `credit_transactions` row carrying the balance before and after the change.
//! Additions are computed here; deductions go through the `deduct_credits`
//! stored procedure so per-call accounting stays in the database.

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Description used when an admin adds credits without giving one
pub const DEFAULT_ADDITION_DESCRIPTION: &str = "Manual credit addition";

/// Description of the ledger row written when an organization is created with credits
pub const INITIAL_ALLOCATION_DESCRIPTION: &str = "Initial credit allocation";

const LEDGER_COLUMNS: &str = "id, organization_id, transaction_type, amount, balance_before, \
     balance_after, description, reference_type, reference_id, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Addition,
    Deduction,
    Refund,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Addition => "addition",
            TransactionType::Deduction => "deduction",
            TransactionType::Refund => "refund",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "addition" => Some(TransactionType::Addition),
            "deduction" => Some(TransactionType::Deduction),
            "refund" => Some(TransactionType::Refund),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the credit ledger
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CreditLedgerEntry {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub transaction_type: String,
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub description: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl CreditLedgerEntry {
    pub fn kind(&self) -> Option<TransactionType> {
        TransactionType::from_db(&self.transaction_type)
    }
}

/// What a ledger row points back to (`reference_type` / `reference_id`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditReference {
    pub reference_type: String,
    pub reference_id: String,
}

impl CreditReference {
    /// Admin-initiated change, referencing the organization itself
    pub fn manual(org_id: Uuid) -> Self {
        Self {
            reference_type: "manual".to_string(),
            reference_id: org_id.to_string(),
        }
    }

    pub fn auto_recharge(org_id: Uuid) -> Self {
        Self {
            reference_type: "auto_recharge".to_string(),
            reference_id: org_id.to_string(),
        }
    }
}

/// Request to add credits to an organization
#[derive(Debug, Clone)]
pub struct CreditAddition {
    pub org_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    pub reference: Option<CreditReference>,
}

impl CreditAddition {
    pub fn manual(org_id: Uuid, amount: f64, description: Option<String>) -> Self {
        Self {
            org_id,
            amount,
            description,
            reference: None,
        }
    }

    fn description_or_default(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => DEFAULT_ADDITION_DESCRIPTION.to_string(),
        }
    }
}

/// Result of a credit addition
#[derive(Debug, Clone, Serialize)]
pub struct CreditAdditionResult {
    pub org_id: Uuid,
    pub balance_before: f64,
    pub balance_after: f64,
    pub transaction: CreditLedgerEntry,
}

/// Totals derived from a slice of ledger rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LedgerTotals {
    /// Sum of addition amounts
    pub total_added: f64,
    /// Sum of absolute deduction amounts
    pub total_spent: f64,
    pub transaction_count: usize,
}

impl LedgerTotals {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let mut totals = LedgerTotals::default();
        for (kind, amount) in entries {
            match TransactionType::from_db(kind) {
                Some(TransactionType::Addition) => totals.total_added += amount,
                Some(TransactionType::Deduction) => totals.total_spent += amount.abs(),
                _ => {}
            }
            totals.transaction_count += 1;
        }
        totals
    }
}

/// Reject amounts that are not strictly positive finite numbers
pub fn validate_credit_amount(amount: f64) -> BillingResult<()> {
    if !amount.is_finite() {
        return Err(BillingError::InvalidAmount(
            "amount must be a finite number".to_string(),
        ));
    }
    if amount <= 0.0 {
        return Err(BillingError::InvalidAmount(format!(
            "amount must be greater than 0 (got {})",
            amount
        )));
    }
    Ok(())
}

/// Balance after applying a signed ledger amount
pub fn apply_amount(balance_before: f64, amount: f64) -> f64 {
    balance_before + amount
}

/// Credit ledger operations
#[derive(Clone)]
pub struct CreditService {
    pool: PgPool,
}

impl CreditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add credits and record the ledger row in one transaction.
    ///
    /// The organization row is locked for the duration so concurrent
    /// additions see each other's balance.
    pub async fn add_credits(&self, addition: CreditAddition) -> BillingResult<CreditAdditionResult> {
        validate_credit_amount(addition.amount)?;

        let mut tx = self.pool.begin().await?;
        let result = Self::add_credits_in(&mut *tx, &addition).await?;
        tx.commit().await?;

        tracing::info!(
            org_id = %result.org_id,
            amount = addition.amount,
            balance_before = result.balance_before,
            balance_after = result.balance_after,
            "Credits added"
        );
        Ok(result)
    }

    /// Add credits on an existing connection or transaction
    pub async fn add_credits_in(
        conn: &mut PgConnection,
        addition: &CreditAddition,
    ) -> BillingResult<CreditAdditionResult> {
        validate_credit_amount(addition.amount)?;

        let row: Option<(Option<f64>,)> =
            sqlx::query_as("SELECT credit_balance FROM organizations WHERE id = $1 FOR UPDATE")
                .bind(addition.org_id)
                .fetch_optional(&mut *conn)
                .await?;

        let balance_before = row
            .ok_or(BillingError::OrganizationNotFound(addition.org_id))?
            .0
            .unwrap_or(0.0);
        let balance_after = apply_amount(balance_before, addition.amount);

        sqlx::query(
            "UPDATE organizations SET credit_balance = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(addition.org_id)
        .bind(balance_after)
        .execute(&mut *conn)
        .await?;

        let reference = addition
            .reference
            .clone()
            .unwrap_or_else(|| CreditReference::manual(addition.org_id));

        let transaction = insert_ledger_row(
            conn,
            addition.org_id,
            TransactionType::Addition,
            addition.amount,
            balance_before,
            balance_after,
            &addition.description_or_default(),
            &reference,
        )
        .await?;

        Ok(CreditAdditionResult {
            org_id: addition.org_id,
            balance_before,
            balance_after,
            transaction,
        })
    }

    /// Ledger row for credits granted at organization creation.
    ///
    /// The organization was inserted with the balance already set, so this
    /// only records the movement from 0. Nothing is written for a zero grant.
    pub async fn record_initial_allocation(
        conn: &mut PgConnection,
        org_id: Uuid,
        amount: f64,
    ) -> BillingResult<Option<CreditLedgerEntry>> {
        if amount <= 0.0 {
            return Ok(None);
        }

        let entry = insert_ledger_row(
            conn,
            org_id,
            TransactionType::Addition,
            amount,
            0.0,
            amount,
            INITIAL_ALLOCATION_DESCRIPTION,
            &CreditReference::manual(org_id),
        )
        .await?;
        Ok(Some(entry))
    }

    /// Most recent ledger rows for one organization
    pub async fn history(&self, org_id: Uuid, limit: i64) -> BillingResult<Vec<CreditLedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM credit_transactions WHERE organization_id = $1 \
             ORDER BY seq DESC LIMIT $2",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query_as::<_, CreditLedgerEntry>(&sql)
            .bind(org_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Most recent ledger rows across all organizations
    pub async fn recent(&self, limit: i64) -> BillingResult<Vec<CreditLedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM credit_transactions ORDER BY seq DESC LIMIT $1",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query_as::<_, CreditLedgerEntry>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Deduct credits through the `deduct_credits` stored procedure.
    ///
    /// Returns false when the procedure declines (unknown org or balance too low).
    pub async fn deduct(
        &self,
        org_id: Uuid,
        amount: f64,
        description: &str,
        reference: &CreditReference,
    ) -> BillingResult<bool> {
        validate_credit_amount(amount)?;

        let deducted: bool = sqlx::query_scalar("SELECT deduct_credits($1, $2, $3, $4, $5)")
            .bind(org_id)
            .bind(amount)
            .bind(description)
            .bind(&reference.reference_type)
            .bind(&reference.reference_id)
            .fetch_one(&self.pool)
            .await?;

        if !deducted {
            tracing::warn!(org_id = %org_id, amount, "Credit deduction declined");
        }
        Ok(deducted)
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_ledger_row(
    conn: &mut PgConnection,
    org_id: Uuid,
    kind: TransactionType,
    amount: f64,
    balance_before: f64,
    balance_after: f64,
    description: &str,
    reference: &CreditReference,
) -> BillingResult<CreditLedgerEntry> {
    let sql = format!(
        r#"
        INSERT INTO credit_transactions (
            organization_id, transaction_type, amount, balance_before, balance_after,
            description, reference_type, reference_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        LEDGER_COLUMNS
    );

    let entry = sqlx::query_as::<_, CreditLedgerEntry>(&sql)
        .bind(org_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(description)
        .bind(&reference.reference_type)
        .bind(&reference.reference_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(entry)
}
