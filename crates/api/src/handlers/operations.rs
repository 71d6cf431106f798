//! Handlers for the operation lifecycle: start, list, inspect,
//! pause/resume/cancel.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lexigen_core::operation::{
    CostLimits, NotificationConfig, OperationMeta, OperationSpec, OperationState, ProcessingConfig,
};
use lexigen_core::selection::SelectionCriteria;
use lexigen_engine::registry::OperationView;
use lexigen_engine::StartOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::ActorId;
use crate::error::{AppError, AppResult};
use crate::query::Pagination;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /batch/start.
#[derive(Debug, Deserialize)]
pub struct StartOperationRequest {
    pub section: String,
    pub selection: SelectionCriteria,
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub limits: CostLimits,
    #[serde(default)]
    pub notifications: NotificationConfig,
    pub reason: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Query string for GET /batch/operations.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Response body for GET /batch/operations.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub operations: Vec<OperationView>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// POST /api/v1/batch/start
///
/// Runs the admission controller: `202` with the new operation id on
/// success, `429` with `{reason, wait_secs}` on denial.
pub async fn start_operation(
    actor: ActorId,
    State(state): State<AppState>,
    Json(input): Json<StartOperationRequest>,
) -> AppResult<Response> {
    let spec = OperationSpec {
        section: input.section,
        selection: input.selection,
        processing: input.processing,
        limits: input.limits,
        notifications: input.notifications,
        meta: OperationMeta {
            initiated_by: actor.0,
            reason: input.reason,
            tags: input.tags,
        },
    };

    match state.orchestrator.start(spec).await? {
        StartOutcome::Accepted { operation_id } => Ok((
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: serde_json::json!({
                    "operation_id": operation_id,
                    "status": "pending",
                }),
            }),
        )
            .into_response()),
        StartOutcome::Denied(decision) => Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": decision.message,
                "code": "ADMISSION_DENIED",
                "reason": decision.reason.map(|r| r.as_str()),
                "wait_secs": decision.wait_secs,
            })),
        )
            .into_response()),
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// GET /api/v1/batch/operations
///
/// Paginated listing in creation order, filterable by status.
pub async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .map(OperationState::parse)
        .transpose()?;

    let views: Vec<OperationView> = state
        .orchestrator
        .registry()
        .list(status)
        .iter()
        .map(|op| op.view())
        .collect();

    let pagination = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let resp = ListResponse {
        total: views.len(),
        operations: pagination.slice(&views),
        page: pagination.page(),
        per_page: pagination.per_page(),
    };
    Ok(Json(DataResponse { data: resp }))
}

/// GET /api/v1/batch/operations/active
pub async fn active_operations(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let views: Vec<OperationView> = state
        .orchestrator
        .registry()
        .active()
        .iter()
        .map(|op| op.view())
        .collect();
    Ok(Json(DataResponse { data: views }))
}

/// GET /api/v1/batch/operations/{id}
///
/// Full detail: items, current progress, progress history, derived metrics.
pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let detail = state.orchestrator.operation_detail(id)?;
    Ok(Json(DataResponse { data: detail }))
}

// ---------------------------------------------------------------------------
// Lifecycle transitions
// ---------------------------------------------------------------------------

/// POST /api/v1/batch/operations/{id}/pause
pub async fn pause_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    if !state.orchestrator.pause(id)? {
        return Err(AppError::BadRequest(
            "Cannot pause the operation in its current state".to_string(),
        ));
    }
    transition_response(&state, id)
}

/// POST /api/v1/batch/operations/{id}/resume
///
/// Re-validates admission; budgets or the emergency stop may have changed
/// while the operation was paused.
pub async fn resume_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    if !state.orchestrator.resume(id)? {
        return Err(AppError::BadRequest(
            "Cannot resume the operation in its current state".to_string(),
        ));
    }
    transition_response(&state, id)
}

/// POST /api/v1/batch/operations/{id}/cancel
pub async fn cancel_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    if !state.orchestrator.cancel(id)? {
        return Err(AppError::BadRequest(
            "Cannot cancel the operation in its current state".to_string(),
        ));
    }
    transition_response(&state, id)
}

fn transition_response(state: &AppState, id: Uuid) -> AppResult<Json<DataResponse<OperationView>>> {
    let runtime = state
        .orchestrator
        .registry()
        .get(id)
        .ok_or(lexigen_engine::EngineError::OperationNotFound(id))?;
    Ok(Json(DataResponse {
        data: runtime.view(),
    }))
}
