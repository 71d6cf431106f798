//! Handlers for budgets and cost analytics.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lexigen_core::cost::BudgetPeriod;
use lexigen_core::types::{usd_to_micros, Timestamp};
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /batch/costs/budgets.
#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    pub name: String,
    /// `daily`, `monthly`, or `total`.
    pub period: String,
    pub limit_usd: f64,
    pub warning_threshold_pct: Option<u8>,
}

/// Query string for GET /batch/costs/analytics.
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub operation_id: Option<uuid::Uuid>,
    pub model: Option<String>,
}

/// Default analytics window when no range is given.
const DEFAULT_ANALYTICS_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

/// GET /api/v1/batch/costs/budgets
pub async fn list_budgets(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.orchestrator.ledger().list_budgets(),
    }))
}

/// POST /api/v1/batch/costs/budgets
pub async fn create_budget(
    State(state): State<AppState>,
    Json(input): Json<CreateBudgetRequest>,
) -> AppResult<impl IntoResponse> {
    let period = BudgetPeriod::parse(&input.period)?;
    state.orchestrator.ledger().create_budget(
        &input.name,
        period,
        usd_to_micros(input.limit_usd),
        input.warning_threshold_pct,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: state.orchestrator.ledger().list_budgets(),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

/// GET /api/v1/batch/costs/analytics
///
/// Read-only aggregation; an empty time range returns zeroed structures.
pub async fn cost_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> AppResult<impl IntoResponse> {
    let end = query.end.unwrap_or_else(chrono::Utc::now);
    let start = query
        .start
        .unwrap_or_else(|| end - chrono::Duration::days(DEFAULT_ANALYTICS_DAYS));
    let filter = lexigen_engine::AnalyticsFilter {
        operation_id: query.operation_id,
        model: query.model,
    };
    Ok(Json(DataResponse {
        data: state.orchestrator.ledger().analytics(start, end, &filter),
    }))
}
