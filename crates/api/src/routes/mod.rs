//! Route tables, one module per resource group.

pub mod batch;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// All /api/v1 routes.
pub fn api_routes() -> Router<AppState> {
    batch::router()
}
