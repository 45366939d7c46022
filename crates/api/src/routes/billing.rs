//! Billing operations for platform admins
//!
//! Manual call settlement and on-demand ledger invariant checks.

use axum::{
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    Json,
};
use knightcall_billing::{
    CallCostService, CallCostSettlement, InvariantCheckSummary, InvariantChecker,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::admin::require_platform_admin;
use crate::{
    audit::{action, log_admin_action, target_type, AuditContext},
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct SettleCallResponse {
    pub call_id: Uuid,
    pub external_call_id: String,
    #[serde(flatten)]
    pub settlement: CallCostSettlement,
}

#[derive(Debug, Deserialize)]
pub struct InvariantQuery {
    /// Run a single named check instead of all of them
    pub check: Option<String>,
}

/// Run `compute_and_deduct_call_cost` for one call
pub async fn settle_call(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(external_call_id): Path<String>,
) -> ApiResult<Json<SettleCallResponse>> {
    let admin_user_id = require_platform_admin(&auth_user, true)?;

    let mut tx = state.pool.begin().await?;

    let call_id: Uuid = sqlx::query_scalar("SELECT id FROM calls WHERE external_call_id = $1")
        .bind(&external_call_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ApiError::NotFound)?;

    let settlement = CallCostService::settle_in(&mut *tx, &external_call_id).await?;

    log_admin_action(
        &mut *tx,
        admin_user_id,
        action::CALL_SETTLED,
        target_type::CALL,
        Some(call_id),
        Some(json!({
            "external_call_id": external_call_id,
            "success": settlement.success,
            "call_cost": settlement.call_cost,
            "credits_deducted": settlement.credits_deducted,
            "already_billed": settlement.already_billed,
            "error": settlement.error,
        })),
        &AuditContext::from_request(&headers, &auth_user),
    )
    .await?;

    tx.commit().await?;

    Ok(Json(SettleCallResponse {
        call_id,
        external_call_id,
        settlement,
    }))
}

/// Run ledger invariant checks
pub async fn check_invariants(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<InvariantQuery>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    require_platform_admin(&auth_user, false)?;

    let checker = state.billing.invariants();

    let summary = match query.check.as_deref().map(str::trim) {
        None | Some("") => checker.run_all_checks().await?,
        Some(name) => {
            if !InvariantChecker::available_checks()
                .iter()
                .any(|check| *check == name)
            {
                return Err(ApiError::Validation(format!(
                    "Unknown invariant check '{}' (available: {})",
                    name,
                    InvariantChecker::available_checks().join(", ")
                )));
            }
            let violations = checker.run_check(name).await?;
            InvariantCheckSummary::from_violations(1, violations)
        }
    };

    if !summary.healthy {
        tracing::warn!(
            admin_user_id = %auth_user.user_id,
            checks_failed = summary.checks_failed,
            violations = summary.violations.len(),
            "Ledger invariant violations found"
        );
    }

    Ok(Json(summary))
}
