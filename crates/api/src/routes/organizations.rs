//! Organization management routes
//!
//! Listing with per-org aggregates, detail view, creation with an initial
//! credit grant, and the credit and plan actions from the organizations page.

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use knightcall_billing::{
    validate_credit_amount, CreditAddition, CreditAdditionResult, CreditLedgerEntry,
    CreditService, LedgerTotals, Plan, SubscriptionService, DEFAULT_MONTHLY_CALL_LIMIT,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    admin::{log_db_err, require_platform_admin},
    dashboard::average_duration,
    validation::{is_valid_email, require_non_empty},
};
use crate::{
    audit::{action, log_admin_action, target_type, AuditContext},
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

const DEFAULT_PER_MINUTE_RATE: f64 = 0.05;
const DEFAULT_INITIAL_CREDITS: f64 = 100.0;
const DEFAULT_AUTO_RECHARGE_AMOUNT: f64 = 100.0;
const DEFAULT_LOW_CREDIT_THRESHOLD: f64 = 10.0;

const DETAIL_RECENT_CALLS: i64 = 10;
const DETAIL_RECENT_TRANSACTIONS: i64 = 15;
const CREDIT_HISTORY_DEFAULT_LIMIT: i64 = 20;
const CREDIT_HISTORY_MAX_LIMIT: i64 = 100;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListOrganizationsQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrganizationListResponse {
    pub organizations: Vec<OrganizationSummary>,
    pub stats: OrganizationStats,
    pub total: usize,
}

/// One row of the organizations table, defaults applied
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrganizationSummary {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub support_email: Option<String>,
    pub domain: Option<String>,
    pub plan: String,
    pub credit_balance: f64,
    pub monthly_call_limit: i32,
    pub current_month_calls: i32,
    pub is_active: bool,
    pub per_minute_rate: Option<f64>,
    pub auto_recharge_enabled: bool,
    pub agents_count: i64,
    pub users_count: i64,
    pub phone_numbers: Vec<String>,
    /// Billed calls only (non-null `call_cost`)
    pub total_calls: i64,
    #[serde(skip)]
    pub total_duration: i64,
    pub total_spend: f64,
    pub credits_added: f64,
    pub credits_spent: f64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_activity: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl OrganizationSummary {
    /// Case-insensitive match on name and contact emails
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }

        std::iter::once(Some(self.name.as_str()))
            .chain([self.email.as_deref(), self.support_email.as_deref()])
            .flatten()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

/// Header figures for the organizations page
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrganizationStats {
    pub total_organizations: usize,
    pub active_agents: i64,
    pub total_credits: f64,
    pub monthly_revenue: f64,
    pub total_calls: i64,
    /// Seconds per billed call
    pub average_call_duration: f64,
}

impl OrganizationStats {
    pub fn from_summaries(orgs: &[OrganizationSummary]) -> Self {
        let total_calls: i64 = orgs.iter().map(|o| o.total_calls).sum();
        let total_duration: i64 = orgs.iter().map(|o| o.total_duration).sum();

        Self {
            total_organizations: orgs.len(),
            active_agents: orgs.iter().map(|o| o.agents_count).sum(),
            total_credits: orgs.iter().map(|o| o.credit_balance).sum(),
            monthly_revenue: orgs.iter().map(|o| o.total_spend).sum(),
            total_calls,
            average_call_duration: average_duration(total_duration, total_calls),
        }
    }
}

/// Full organization row as shown on the detail page
#[derive(Debug, Serialize, FromRow)]
pub struct OrganizationRecord {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub support_email: Option<String>,
    pub domain: Option<String>,
    pub plan: Option<String>,
    pub per_minute_rate: Option<f64>,
    pub credit_balance: Option<f64>,
    pub current_month_calls: Option<i32>,
    pub monthly_call_limit: Option<i32>,
    pub is_active: Option<bool>,
    pub auto_recharge_enabled: Option<bool>,
    pub auto_recharge_amount: Option<f64>,
    pub low_credit_threshold: Option<f64>,
    pub branding: Option<serde_json::Value>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub data_storage_setting: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

const ORGANIZATION_RECORD_COLUMNS: &str = r#"
    id, name, email, support_email, domain, plan, per_minute_rate, credit_balance,
    current_month_calls, monthly_call_limit, is_active, auto_recharge_enabled,
    auto_recharge_amount, low_credit_threshold, branding, logo_url, primary_color,
    data_storage_setting, created_at, updated_at
"#;

#[derive(Debug, Serialize, FromRow)]
pub struct AgentSummary {
    pub id: Uuid,
    pub name: String,
    pub status: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PhoneNumberSummary {
    pub id: Uuid,
    pub number: String,
    pub nickname: Option<String>,
    pub status: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct OrganizationUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct CallSummary {
    pub id: Uuid,
    pub external_call_id: Option<String>,
    pub agent_name: Option<String>,
    pub from_number: String,
    pub to_number: String,
    pub direction: Option<String>,
    pub call_status: Option<String>,
    pub duration_seconds: Option<i32>,
    pub call_cost: Option<f64>,
    pub credits_deducted: Option<f64>,
    pub billing_status: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct OrganizationDetailResponse {
    pub organization: OrganizationRecord,
    pub agents: Vec<AgentSummary>,
    pub phone_numbers: Vec<PhoneNumberSummary>,
    pub users: Vec<OrganizationUser>,
    pub recent_calls: Vec<CallSummary>,
    pub recent_transactions: Vec<CreditLedgerEntry>,
}

/// Create-organization form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub email: String,
    pub support_email: String,
    pub domain: Option<String>,
    pub plan: Option<String>,
    pub per_minute_rate: Option<f64>,
    pub credit_balance: Option<f64>,
    pub monthly_call_limit: Option<i64>,
    #[serde(default)]
    pub auto_recharge_enabled: bool,
    pub auto_recharge_amount: Option<f64>,
    pub low_credit_threshold: Option<f64>,
    pub admin_email: String,
    pub admin_first_name: String,
    pub admin_last_name: String,
}

/// Validated organization ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrganization {
    pub name: String,
    pub email: String,
    pub support_email: String,
    pub domain: Option<String>,
    pub plan: Plan,
    pub per_minute_rate: f64,
    pub credit_balance: f64,
    pub monthly_call_limit: i32,
    pub auto_recharge_enabled: bool,
    pub auto_recharge_amount: Option<f64>,
    pub low_credit_threshold: f64,
    pub branding: serde_json::Value,
}

impl CreateOrganizationRequest {
    /// Check every field and apply form defaults
    pub fn validate(&self) -> Result<NewOrganization, String> {
        let name = self.name.trim();
        if name.chars().count() < 2 {
            return Err("Organization name must be at least 2 characters".to_string());
        }

        for (label, value) in [
            ("email", &self.email),
            ("support email", &self.support_email),
            ("admin email", &self.admin_email),
        ] {
            if !is_valid_email(value) {
                return Err(format!("Please enter a valid {}", label));
            }
        }

        let plan = match self.plan.as_deref().map(str::trim) {
            None | Some("") => Plan::default(),
            Some(p) => p.parse::<Plan>().map_err(|e| e.to_string())?,
        };

        let per_minute_rate = self.per_minute_rate.unwrap_or(DEFAULT_PER_MINUTE_RATE);
        if !per_minute_rate.is_finite() || per_minute_rate <= 0.0 {
            return Err("Per-minute rate must be greater than 0".to_string());
        }

        let credit_balance = self.credit_balance.unwrap_or(DEFAULT_INITIAL_CREDITS);
        if !credit_balance.is_finite() || credit_balance < 0.0 {
            return Err("Initial credit balance cannot be negative".to_string());
        }

        let monthly_call_limit = self
            .monthly_call_limit
            .unwrap_or(i64::from(DEFAULT_MONTHLY_CALL_LIMIT));
        let monthly_call_limit = i32::try_from(monthly_call_limit)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| "Monthly call limit must be a positive whole number".to_string())?;

        let positive_or_default = |value: Option<f64>, default: f64, label: &str| {
            match value {
                Some(v) if !v.is_finite() || v <= 0.0 => {
                    Err(format!("{} must be greater than 0", label))
                }
                Some(v) => Ok(v),
                None => Ok(default),
            }
        };
        let recharge_amount = positive_or_default(
            self.auto_recharge_amount,
            DEFAULT_AUTO_RECHARGE_AMOUNT,
            "Auto-recharge amount",
        )?;
        let low_credit_threshold = positive_or_default(
            self.low_credit_threshold,
            DEFAULT_LOW_CREDIT_THRESHOLD,
            "Low credit threshold",
        )?;

        require_non_empty("Admin first name", &self.admin_first_name)?;
        require_non_empty("Admin last name", &self.admin_last_name)?;

        let domain = self
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        Ok(NewOrganization {
            name: name.to_string(),
            email: self.email.trim().to_string(),
            support_email: self.support_email.trim().to_string(),
            domain,
            plan,
            per_minute_rate,
            credit_balance,
            monthly_call_limit,
            auto_recharge_enabled: self.auto_recharge_enabled,
            auto_recharge_amount: self.auto_recharge_enabled.then_some(recharge_amount),
            low_credit_threshold,
            branding: json!({
                "admin_contact": {
                    "email": self.admin_email.trim(),
                    "first_name": self.admin_first_name.trim(),
                    "last_name": self.admin_last_name.trim(),
                }
            }),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateOrganizationResponse {
    pub organization: OrganizationRecord,
    pub initial_transaction: Option<CreditLedgerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    pub amount: f64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreditHistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreditHistoryResponse {
    pub transactions: Vec<CreditLedgerEntry>,
    pub totals: LedgerTotals,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct PlanChangeResponse {
    pub organization_id: Uuid,
    pub previous_plan: Option<String>,
    pub plan: Plan,
    pub monthly_price_usd: f64,
}

// =============================================================================
// Shared Actions
// =============================================================================

/// Add credits and audit in one transaction.
///
/// Used by the organizations and subscriptions pages.
pub(crate) async fn apply_credit_addition(
    state: &AppState,
    auth_user: &AuthUser,
    headers: &HeaderMap,
    org_id: Uuid,
    amount: f64,
    description: Option<String>,
) -> ApiResult<CreditAdditionResult> {
    let admin_user_id = require_platform_admin(auth_user, true)?;
    let addition = CreditAddition::manual(org_id, amount, description);
    validate_credit_amount(addition.amount)?;

    let mut tx = state.pool.begin().await?;
    let result = CreditService::add_credits_in(&mut *tx, &addition).await?;

    log_admin_action(
        &mut *tx,
        admin_user_id,
        action::CREDITS_ADDED,
        target_type::ORGANIZATION,
        Some(org_id),
        Some(json!({
            "amount": amount,
            "balance_before": result.balance_before,
            "balance_after": result.balance_after,
            "description": result.transaction.description,
        })),
        &AuditContext::from_request(headers, auth_user),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        org_id = %org_id,
        admin_user_id = %admin_user_id,
        amount,
        balance_after = result.balance_after,
        "Credits added"
    );
    Ok(result)
}

/// Change plan and audit in one transaction
pub(crate) async fn apply_plan_change(
    state: &AppState,
    auth_user: &AuthUser,
    headers: &HeaderMap,
    org_id: Uuid,
    requested_plan: &str,
) -> ApiResult<PlanChangeResponse> {
    let admin_user_id = require_platform_admin(auth_user, true)?;
    let plan: Plan = requested_plan.parse()?;

    let mut tx = state.pool.begin().await?;

    let previous: Option<(Option<String>,)> =
        sqlx::query_as("SELECT plan FROM organizations WHERE id = $1 FOR UPDATE")
            .bind(org_id)
            .fetch_optional(&mut *tx)
            .await?;
    let (previous_plan,) = previous.ok_or(ApiError::NotFound)?;

    SubscriptionService::change_plan_in(&mut *tx, org_id, plan).await?;

    log_admin_action(
        &mut *tx,
        admin_user_id,
        action::PLAN_CHANGED,
        target_type::ORGANIZATION,
        Some(org_id),
        Some(json!({
            "previous_plan": previous_plan,
            "new_plan": plan.as_str(),
        })),
        &AuditContext::from_request(headers, auth_user),
    )
    .await?;

    tx.commit().await?;

    Ok(PlanChangeResponse {
        organization_id: org_id,
        previous_plan,
        plan,
        monthly_price_usd: plan.monthly_price_usd(),
    })
}

// =============================================================================
// Endpoints
// =============================================================================

/// List organizations with aggregates and page totals
pub async fn list_organizations(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListOrganizationsQuery>,
) -> ApiResult<Json<OrganizationListResponse>> {
    require_platform_admin(&auth_user, false)?;
    let req_id = Uuid::new_v4();

    let organizations: Vec<OrganizationSummary> = sqlx::query_as(
        r#"
        SELECT
            o.id, o.name, o.email, o.support_email, o.domain,
            COALESCE(o.plan, 'starter') AS plan,
            COALESCE(o.credit_balance, 0) AS credit_balance,
            COALESCE(o.monthly_call_limit, 1000) AS monthly_call_limit,
            COALESCE(o.current_month_calls, 0) AS current_month_calls,
            COALESCE(o.is_active, TRUE) AS is_active,
            o.per_minute_rate,
            COALESCE(o.auto_recharge_enabled, FALSE) AS auto_recharge_enabled,
            (SELECT COUNT(*) FROM agents a WHERE a.organization_id = o.id) AS agents_count,
            (SELECT COUNT(*) FROM users u WHERE u.organization_id = o.id) AS users_count,
            COALESCE(
                (SELECT array_agg(p.number ORDER BY p.created_at)
                 FROM phone_numbers p WHERE p.organization_id = o.id),
                ARRAY[]::TEXT[]
            ) AS phone_numbers,
            c.total_calls, c.total_duration, c.total_spend,
            l.credits_added, l.credits_spent,
            o.updated_at AS last_activity,
            o.created_at
        FROM organizations o
        LEFT JOIN LATERAL (
            SELECT COUNT(*) AS total_calls,
                   COALESCE(SUM(duration_seconds), 0)::BIGINT AS total_duration,
                   COALESCE(SUM(call_cost), 0)::DOUBLE PRECISION AS total_spend
            FROM calls
            WHERE organization_id = o.id AND call_cost IS NOT NULL
        ) c ON TRUE
        LEFT JOIN LATERAL (
            SELECT COALESCE(SUM(amount) FILTER (WHERE transaction_type <> 'deduction'), 0)
                       ::DOUBLE PRECISION AS credits_added,
                   COALESCE(SUM(ABS(amount)) FILTER (WHERE transaction_type = 'deduction'), 0)
                       ::DOUBLE PRECISION AS credits_spent
            FROM credit_transactions
            WHERE organization_id = o.id
        ) l ON TRUE
        ORDER BY o.created_at DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "list_organizations", e))?;

    // Totals cover every organization, not just the search results
    let stats = OrganizationStats::from_summaries(&organizations);

    let organizations: Vec<OrganizationSummary> = match query.search.as_deref() {
        Some(term) => organizations
            .into_iter()
            .filter(|o| o.matches_search(term))
            .collect(),
        None => organizations,
    };

    Ok(Json(OrganizationListResponse {
        total: organizations.len(),
        organizations,
        stats,
    }))
}

/// Organization detail with related records
pub async fn get_organization(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Json<OrganizationDetailResponse>> {
    require_platform_admin(&auth_user, false)?;
    let req_id = Uuid::new_v4();

    let organization: OrganizationRecord = sqlx::query_as(&format!(
        "SELECT {} FROM organizations WHERE id = $1",
        ORGANIZATION_RECORD_COLUMNS
    ))
    .bind(org_id)
    .fetch_optional(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "fetch_organization", e))?
    .ok_or(ApiError::NotFound)?;

    let agents: Vec<AgentSummary> = sqlx::query_as(
        r#"
        SELECT id, name, status, created_at
        FROM agents
        WHERE organization_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(org_id)
    .fetch_all(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "fetch_agents", e))?;

    let phone_numbers: Vec<PhoneNumberSummary> = sqlx::query_as(
        r#"
        SELECT id, number, nickname, status, created_at
        FROM phone_numbers
        WHERE organization_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(org_id)
    .fetch_all(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "fetch_phone_numbers", e))?;

    let users: Vec<OrganizationUser> = sqlx::query_as(
        r#"
        SELECT id, email, first_name, last_name, role, created_at
        FROM users
        WHERE organization_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(org_id)
    .fetch_all(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "fetch_users", e))?;

    let recent_calls: Vec<CallSummary> = sqlx::query_as(
        r#"
        SELECT id, external_call_id, agent_name, from_number, to_number, direction,
               call_status, duration_seconds, call_cost, credits_deducted,
               billing_status, created_at
        FROM calls
        WHERE organization_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(org_id)
    .bind(DETAIL_RECENT_CALLS)
    .fetch_all(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "fetch_recent_calls", e))?;

    let recent_transactions = state
        .billing
        .credits
        .history(org_id, DETAIL_RECENT_TRANSACTIONS)
        .await?;

    Ok(Json(OrganizationDetailResponse {
        organization,
        agents,
        phone_numbers,
        users,
        recent_calls,
        recent_transactions,
    }))
}

/// Create an organization and record its initial credit grant
pub async fn create_organization(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(req): Json<CreateOrganizationRequest>,
) -> ApiResult<(StatusCode, Json<CreateOrganizationResponse>)> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;
    let req_id = Uuid::new_v4();

    let new_org = req.validate().map_err(ApiError::Validation)?;

    let mut tx = state.pool.begin().await?;

    let organization: OrganizationRecord = sqlx::query_as(&format!(
        r#"
        INSERT INTO organizations (
            name, email, support_email, domain, plan, per_minute_rate,
            credit_balance, current_month_calls, monthly_call_limit, is_active,
            auto_recharge_enabled, auto_recharge_amount, low_credit_threshold, branding
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, TRUE, $9, $10, $11, $12)
        RETURNING {}
        "#,
        ORGANIZATION_RECORD_COLUMNS
    ))
    .bind(&new_org.name)
    .bind(&new_org.email)
    .bind(&new_org.support_email)
    .bind(new_org.domain.as_deref())
    .bind(new_org.plan.as_str())
    .bind(new_org.per_minute_rate)
    .bind(new_org.credit_balance)
    .bind(new_org.monthly_call_limit)
    .bind(new_org.auto_recharge_enabled)
    .bind(new_org.auto_recharge_amount)
    .bind(new_org.low_credit_threshold)
    .bind(&new_org.branding)
    .fetch_one(&mut *tx)
    .await
    .inspect_err(|e| log_db_err(req_id, "insert_organization", e))?;

    let initial_transaction =
        CreditService::record_initial_allocation(&mut *tx, organization.id, new_org.credit_balance)
            .await?;

    log_admin_action(
        &mut *tx,
        admin_user_id,
        action::ORGANIZATION_CREATED,
        target_type::ORGANIZATION,
        Some(organization.id),
        Some(json!({
            "name": new_org.name,
            "plan": new_org.plan.as_str(),
            "initial_credits": new_org.credit_balance,
            "admin_email": req.admin_email.trim(),
        })),
        &AuditContext::from_request(&headers, &auth_user),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        %req_id,
        org_id = %organization.id,
        plan = %new_org.plan,
        initial_credits = new_org.credit_balance,
        "Organization created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateOrganizationResponse {
            organization,
            initial_transaction,
        }),
    ))
}

/// Add credits to an organization
pub async fn add_credits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<AddCreditsRequest>,
) -> ApiResult<Json<CreditAdditionResult>> {
    let result =
        apply_credit_addition(&state, &auth_user, &headers, org_id, req.amount, req.description)
            .await?;
    Ok(Json(result))
}

/// Recent ledger entries for an organization
pub async fn credit_history(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<CreditHistoryQuery>,
) -> ApiResult<Json<CreditHistoryResponse>> {
    require_platform_admin(&auth_user, false)?;

    let limit = query
        .limit
        .unwrap_or(CREDIT_HISTORY_DEFAULT_LIMIT)
        .clamp(1, CREDIT_HISTORY_MAX_LIMIT);

    let transactions = state.billing.credits.history(org_id, limit).await?;
    let totals = LedgerTotals::from_entries(
        transactions
            .iter()
            .map(|t| (t.transaction_type.as_str(), t.amount)),
    );

    Ok(Json(CreditHistoryResponse {
        transactions,
        totals,
    }))
}

/// Move an organization to another plan
pub async fn change_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<ChangePlanRequest>,
) -> ApiResult<Json<PlanChangeResponse>> {
    let response = apply_plan_change(&state, &auth_user, &headers, org_id, &req.plan).await?;
    Ok(Json(response))
}
