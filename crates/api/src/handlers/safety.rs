//! Handlers for safety status, the emergency stop, and safety limits.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use lexigen_core::safety::SafetyLimits;
use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /batch/safety/emergency-stop.
#[derive(Debug, Deserialize)]
pub struct EmergencyStopRequest {
    pub reason: Option<String>,
}

/// Response for GET /batch/safety/status.
#[derive(Debug, Serialize)]
pub struct SafetyStatusResponse {
    pub emergency_stop: lexigen_engine::safety::EmergencyStopState,
    pub limits: SafetyLimits,
    pub active_operations: u32,
    pub can_start_operation: bool,
    pub open_alerts: usize,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/batch/safety/status
pub async fn get_safety_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let safety = state.orchestrator.safety();
    let resp = SafetyStatusResponse {
        emergency_stop: safety.emergency_stop(),
        limits: safety.limits(),
        active_operations: safety.active_operations(),
        can_start_operation: safety.can_start_operation(),
        open_alerts: state.orchestrator.alerts().open_count(),
    };
    Ok(Json(DataResponse { data: resp }))
}

// ---------------------------------------------------------------------------
// Emergency stop
// ---------------------------------------------------------------------------

/// POST /api/v1/batch/safety/emergency-stop
///
/// Body `{reason}` is required (`400` otherwise). Activates the kill
/// switch and pauses every running operation at its next checkpoint.
pub async fn activate_emergency_stop(
    actor: ActorId,
    State(state): State<AppState>,
    Json(input): Json<EmergencyStopRequest>,
) -> AppResult<impl IntoResponse> {
    let reason = input
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::BadRequest("A reason is required".to_string()))?;

    let first_activation = state
        .orchestrator
        .safety()
        .activate_emergency_stop(reason, &actor.0);
    let paused = state.orchestrator.halt_all("emergency stop");

    Ok(Json(DataResponse {
        data: serde_json::json!({
            "active": true,
            "first_activation": first_activation,
            "paused_operations": paused,
        }),
    }))
}

/// POST /api/v1/batch/safety/emergency-stop/deactivate
pub async fn deactivate_emergency_stop(
    actor: ActorId,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let deactivated = state
        .orchestrator
        .safety()
        .deactivate_emergency_stop(&actor.0);
    Ok(Json(DataResponse {
        data: serde_json::json!({
            "active": false,
            "deactivated": deactivated,
        }),
    }))
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// PUT /api/v1/batch/safety/limits
///
/// Operator mutation of the system-wide ceilings; reads always see the
/// latest value.
pub async fn update_safety_limits(
    actor: ActorId,
    State(state): State<AppState>,
    Json(limits): Json<SafetyLimits>,
) -> AppResult<impl IntoResponse> {
    state.orchestrator.safety().set_limits(limits)?;
    tracing::info!(actor = %actor.0, "Safety limits updated via API");
    Ok(Json(DataResponse { data: limits }))
}
