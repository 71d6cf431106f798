//! Handlers for asynchronous cost/time estimation jobs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lexigen_core::error::CoreError;
use lexigen_core::selection::SelectionCriteria;
use lexigen_engine::EstimateRequest;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for POST /batch/estimate.
#[derive(Debug, Deserialize)]
pub struct SubmitEstimateRequest {
    pub section: String,
    pub selection: SelectionCriteria,
    #[serde(default)]
    pub regenerate_existing: bool,
    pub model: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,
}

fn default_worker_count() -> u32 {
    1
}

/// POST /api/v1/batch/estimate
///
/// `202` with a job id; the estimate resolves in the background.
pub async fn submit_estimate(
    State(state): State<AppState>,
    Json(input): Json<SubmitEstimateRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = state.estimates.submit(EstimateRequest {
        section: input.section,
        selection: input.selection,
        regenerate_existing: input.regenerate_existing,
        model: input.model,
        worker_count: input.worker_count,
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: serde_json::json!({
                "job_id": job_id,
                "status": "pending",
            }),
        }),
    ))
}

/// GET /api/v1/batch/estimate/{id}
///
/// Polls a job: `pending | completed | failed` plus the estimate result.
pub async fn get_estimate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let job = state.estimates.get(id).ok_or(CoreError::NotFound {
        entity: "estimate job",
        id: id.to_string(),
    })?;
    Ok(Json(DataResponse { data: job }))
}
