//! Admin dashboard metrics

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Serialize;
use sqlx::FromRow;
use time::{OffsetDateTime, Time};
use uuid::Uuid;

use super::admin::{log_db_err, require_platform_admin};
use crate::{auth::AuthUser, error::ApiResult, state::AppState};

const TOP_ORGANIZATIONS: i64 = 5;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_organizations: i64,
    pub active_agents: i64,
    pub total_calls: i64,
    pub calls_today: i64,
    pub monthly_revenue: f64,
    pub total_credits: f64,
    /// Seconds; 0 when there are no calls
    pub average_call_duration: f64,
    pub top_organizations: Vec<TopOrganization>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TopOrganization {
    pub id: Uuid,
    pub name: String,
    pub plan: String,
    pub current_month_calls: i32,
    pub credit_balance: f64,
}

#[derive(Debug, FromRow)]
struct CallTotalsRow {
    total_calls: i64,
    total_duration: i64,
}

/// Midnight UTC of the given instant's day
pub(crate) fn start_of_day(now: OffsetDateTime) -> OffsetDateTime {
    now.to_offset(time::UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

/// Midnight UTC on the first of the given instant's month
pub(crate) fn start_of_month(now: OffsetDateTime) -> OffsetDateTime {
    let day = start_of_day(now);
    day.replace_day(1).unwrap_or(day)
}

pub(crate) fn average_duration(total_duration: i64, total_calls: i64) -> f64 {
    if total_calls > 0 {
        total_duration as f64 / total_calls as f64
    } else {
        0.0
    }
}

/// Platform-wide metrics for the dashboard landing page
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<DashboardStats>> {
    require_platform_admin(&auth_user, false)?;
    let req_id = Uuid::new_v4();

    let now = OffsetDateTime::now_utc();
    let today = start_of_day(now);
    let month_start = start_of_month(now);

    let total_organizations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations")
        .fetch_one(&state.pool)
        .await
        .inspect_err(|e| log_db_err(req_id, "count_organizations", e))?;

    let active_agents: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM agents WHERE status = 'active'")
            .fetch_one(&state.pool)
            .await
            .inspect_err(|e| log_db_err(req_id, "count_active_agents", e))?;

    let totals: CallTotalsRow = sqlx::query_as(
        r#"
        SELECT COUNT(*) AS total_calls,
               COALESCE(SUM(duration_seconds), 0)::BIGINT AS total_duration
        FROM calls
        "#,
    )
    .fetch_one(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "call_totals", e))?;

    let calls_today: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM calls WHERE created_at >= $1")
        .bind(today)
        .fetch_one(&state.pool)
        .await
        .inspect_err(|e| log_db_err(req_id, "calls_today", e))?;

    let monthly_revenue: f64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(call_cost), 0)::DOUBLE PRECISION
        FROM calls
        WHERE created_at >= $1 AND call_cost IS NOT NULL
        "#,
    )
    .bind(month_start)
    .fetch_one(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "monthly_revenue", e))?;

    let total_credits: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(credit_balance), 0)::DOUBLE PRECISION FROM organizations",
    )
    .fetch_one(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "total_credits", e))?;

    let top_organizations: Vec<TopOrganization> = sqlx::query_as(
        r#"
        SELECT id, name,
               COALESCE(plan, 'starter') AS plan,
               COALESCE(current_month_calls, 0) AS current_month_calls,
               COALESCE(credit_balance, 0) AS credit_balance
        FROM organizations
        ORDER BY COALESCE(current_month_calls, 0) DESC, name ASC
        LIMIT $1
        "#,
    )
    .bind(TOP_ORGANIZATIONS)
    .fetch_all(&state.pool)
    .await
    .inspect_err(|e| log_db_err(req_id, "top_organizations", e))?;

    Ok(Json(DashboardStats {
        total_organizations,
        active_agents,
        total_calls: totals.total_calls,
        calls_today,
        monthly_revenue,
        total_credits,
        average_call_duration: average_duration(totals.total_duration, totals.total_calls),
        top_organizations,
    }))
}
