//! Handlers for the alert lifecycle: list and acknowledge.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::actor::ActorId;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query string for GET /batch/alerts.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub acknowledged: Option<bool>,
}

/// GET /api/v1/batch/alerts
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.orchestrator.alerts().list(query.acknowledged),
    }))
}

/// POST /api/v1/batch/alerts/{id}/acknowledge
pub async fn acknowledge_alert(
    actor: ActorId,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    if !state.orchestrator.alerts().acknowledge(id, &actor.0) {
        return Err(AppError::BadRequest(
            "Alert not found or already acknowledged".to_string(),
        ));
    }
    Ok(Json(DataResponse {
        data: serde_json::json!({ "acknowledged": true }),
    }))
}
