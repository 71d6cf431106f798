use std::sync::Arc;

use lexigen_engine::{EstimateService, Orchestrator};
use lexigen_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already
/// `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// The orchestration control plane (registry, ledger, safety, alerts).
    pub orchestrator: Orchestrator,
    /// Async estimation job runner.
    pub estimates: Arc<EstimateService>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Centralized event bus for publishing domain events.
    pub event_bus: Arc<EventBus>,
}
