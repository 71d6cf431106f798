use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lexigen_api::config::ServerConfig;
use lexigen_api::router::build_app_router;
use lexigen_api::state::AppState;
use lexigen_engine::{
    AdmissionController, AlertRegistry, CostLedger, EstimateService, Orchestrator,
    OrchestratorConfig, ProgressTracker, RateLimitPolicy, SafetyMonitor,
};
use lexigen_events::{EventBus, NotificationRouter};
use lexigen_provider::http::{HttpProvider, HttpProviderConfig};
use lexigen_provider::mock::MockProvider;
use lexigen_provider::GenerationProvider;
use lexigen_store::memory::InMemoryTermStore;
use lexigen_store::TermStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lexigen_api=debug,lexigen_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // --- Engine registries ---
    let alerts = Arc::new(AlertRegistry::new(Arc::clone(&event_bus)));
    let ledger = Arc::new(CostLedger::new(Arc::clone(&alerts)));
    let progress = Arc::new(ProgressTracker::new());
    let safety = Arc::new(SafetyMonitor::new(
        lexigen_core::safety::SafetyLimits::default(),
        Arc::clone(&alerts),
        Arc::clone(&event_bus),
    ));

    let rate_limit = (config.max_starts_per_hour > 0).then_some(RateLimitPolicy {
        max_starts: config.max_starts_per_hour,
        window_secs: 3_600,
    });
    let admission =
        AdmissionController::new(Arc::clone(&safety), Arc::clone(&ledger), rate_limit);

    // --- Term store ---
    // The durable persistence layer is an external collaborator; the
    // in-memory store backs local development and tests.
    let store = Arc::new(InMemoryTermStore::new());
    store.seed_terms(config.seed_terms, "general");
    let store: Arc<dyn TermStore> = store;
    tracing::info!(terms = config.seed_terms, "In-memory term store seeded");

    // --- Generation provider ---
    let provider: Arc<dyn GenerationProvider> = match &config.provider_base_url {
        Some(base_url) => {
            let api_key = config.provider_api_key.clone().unwrap_or_default();
            let provider = HttpProvider::new(HttpProviderConfig::new(base_url.clone(), api_key))
                .expect("Failed to build provider HTTP client");
            tracing::info!(base_url = %base_url, "Using HTTP generation provider");
            Arc::new(provider)
        }
        None => {
            tracing::warn!("PROVIDER_BASE_URL not set; using the mock generation provider");
            Arc::new(MockProvider::new())
        }
    };

    // --- Orchestrator + estimation ---
    let engine_config = OrchestratorConfig::default();
    let estimates = Arc::new(EstimateService::new(
        Arc::clone(&store),
        engine_config.prices.clone(),
        engine_config.calibration,
    ));
    let orchestrator = Orchestrator::new(
        engine_config,
        ledger,
        progress,
        safety,
        admission,
        alerts,
        provider,
        store,
        Arc::clone(&event_bus),
    );

    // --- Notification router ---
    let router_handle = tokio::spawn(NotificationRouter::new().run(event_bus.subscribe()));
    tracing::info!("Notification router started");

    // --- App state ---
    let state = AppState {
        orchestrator: orchestrator.clone(),
        estimates,
        config: Arc::new(config.clone()),
        event_bus: Arc::clone(&event_bus),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Pause running operations so workers stop at their next checkpoint;
    // in-flight generation calls are allowed to finish.
    let paused = orchestrator.halt_all("server shutdown");
    tracing::info!(paused, "Running operations paused for shutdown");

    // Drop the event bus sender to close the broadcast channel, which
    // signals the notification router to stop.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), router_handle).await;
    tracing::info!("Notification router stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
