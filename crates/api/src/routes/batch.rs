//! Route table for the batch-operation surface.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{alerts, costs, dashboard, estimation, operations, safety};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        // Estimation
        .route("/batch/estimate", post(estimation::submit_estimate))
        .route("/batch/estimate/{id}", get(estimation::get_estimate))
        // Lifecycle
        .route("/batch/start", post(operations::start_operation))
        .route("/batch/operations", get(operations::list_operations))
        .route(
            "/batch/operations/active",
            get(operations::active_operations),
        )
        .route("/batch/operations/{id}", get(operations::get_operation))
        .route(
            "/batch/operations/{id}/pause",
            post(operations::pause_operation),
        )
        .route(
            "/batch/operations/{id}/resume",
            post(operations::resume_operation),
        )
        .route(
            "/batch/operations/{id}/cancel",
            post(operations::cancel_operation),
        )
        // Dashboard
        .route("/batch/dashboard", get(dashboard::get_dashboard))
        // Safety
        .route("/batch/safety/status", get(safety::get_safety_status))
        .route(
            "/batch/safety/emergency-stop",
            post(safety::activate_emergency_stop),
        )
        .route(
            "/batch/safety/emergency-stop/deactivate",
            post(safety::deactivate_emergency_stop),
        )
        .route("/batch/safety/limits", put(safety::update_safety_limits))
        // Costs
        .route(
            "/batch/costs/budgets",
            get(costs::list_budgets).post(costs::create_budget),
        )
        .route("/batch/costs/analytics", get(costs::cost_analytics))
        // Alerts
        .route("/batch/alerts", get(alerts::list_alerts))
        .route(
            "/batch/alerts/{id}/acknowledge",
            post(alerts::acknowledge_alert),
        )
}
