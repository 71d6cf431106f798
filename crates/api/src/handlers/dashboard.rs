//! Dashboard aggregate handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/batch/dashboard
///
/// Current operations + safety status + cost summary in one response.
pub async fn get_dashboard(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.orchestrator.dashboard(),
    }))
}
