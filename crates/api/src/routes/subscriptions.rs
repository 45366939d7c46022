//! Subscriptions page routes

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use knightcall_billing::{
    AutoRechargeUpdate, CreditAdditionResult, CreditLedgerEntry, Subscription, SubscriptionService,
    SubscriptionSummary,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{
    admin::require_platform_admin,
    organizations::{apply_credit_addition, apply_plan_change, ChangePlanRequest, PlanChangeResponse},
};
use crate::{
    audit::{action, log_admin_action, target_type, AuditContext},
    auth::AuthUser,
    error::ApiResult,
    state::AppState,
};

/// Ledger rows shown under the subscriptions table
const RECENT_TRANSACTIONS: i64 = 100;

#[derive(Debug, Serialize)]
pub struct SubscriptionsResponse {
    pub subscriptions: Vec<Subscription>,
    pub transactions: Vec<CreditLedgerEntry>,
    pub summary: SubscriptionSummary,
}

#[derive(Debug, Deserialize)]
pub struct AutoRechargeRequest {
    pub enabled: bool,
    pub amount: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AutoRechargeResponse {
    pub organization_id: Uuid,
    pub enabled: bool,
    pub amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionCreditsRequest {
    pub organization_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
}

/// Synthesized subscriptions, recent ledger activity and page totals
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<SubscriptionsResponse>> {
    require_platform_admin(&auth_user, false)?;

    let subscriptions = state.billing.subscriptions.list().await?;
    let transactions = state.billing.credits.recent(RECENT_TRANSACTIONS).await?;
    let summary = SubscriptionSummary::compute(&subscriptions, &transactions);

    Ok(Json(SubscriptionsResponse {
        subscriptions,
        transactions,
        summary,
    }))
}

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

/// Toggle auto-recharge; the amount is only changed when supplied
pub async fn set_auto_recharge(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<AutoRechargeRequest>,
) -> ApiResult<Json<AutoRechargeResponse>> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;

    let update = AutoRechargeUpdate {
        enabled: req.enabled,
        amount: req.amount,
    };
    update.validate()?;

    let mut tx = state.pool.begin().await?;
    SubscriptionService::set_auto_recharge_in(&mut *tx, org_id, update).await?;

    log_admin_action(
        &mut *tx,
        admin_user_id,
        action::AUTO_RECHARGE_UPDATED,
        target_type::ORGANIZATION,
        Some(org_id),
        Some(json!({
            "enabled": req.enabled,
            "amount": req.amount,
        })),
        &AuditContext::from_request(&headers, &auth_user),
    )
    .await?;

    tx.commit().await?;

    Ok(Json(AutoRechargeResponse {
        organization_id: org_id,
        enabled: req.enabled,
        amount: req.amount,
    }))
}

/// Add credits with the organization chosen in the form
pub async fn add_credits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(req): Json<SubscriptionCreditsRequest>,
) -> ApiResult<Json<CreditAdditionResult>> {
    let result = apply_credit_addition(
        &state,
        &auth_user,
        &headers,
        req.organization_id,
        req.amount,
        req.description,
    )
    .await?;
    Ok(Json(result))
}
