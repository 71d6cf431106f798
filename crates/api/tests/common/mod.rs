use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use lexigen_api::config::ServerConfig;
use lexigen_api::router::build_app_router;
use lexigen_api::state::AppState;
use lexigen_core::item::RetryPolicy;
use lexigen_core::safety::SafetyLimits;
use lexigen_engine::{
    AdmissionController, AlertRegistry, CostLedger, EstimateService, Orchestrator,
    OrchestratorConfig, ProgressTracker, SafetyMonitor,
};
use lexigen_events::EventBus;
use lexigen_provider::mock::MockProvider;
use lexigen_store::memory::InMemoryTermStore;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        provider_base_url: None,
        provider_api_key: None,
        seed_terms: 0,
        max_starts_per_hour: 0,
    }
}

/// Mirror of the wiring in `main.rs`, over fresh in-memory registries, a
/// seeded term store, and a scriptable mock provider. The retry policy is
/// fast so retry paths settle in milliseconds.
pub fn build_test_app_with(provider: MockProvider, term_count: usize) -> Router {
    let config = test_config();
    let bus = Arc::new(EventBus::default());
    let alerts = Arc::new(AlertRegistry::new(Arc::clone(&bus)));
    let ledger = Arc::new(CostLedger::new(Arc::clone(&alerts)));
    let progress = Arc::new(ProgressTracker::new());
    let safety = Arc::new(SafetyMonitor::new(
        SafetyLimits::default(),
        Arc::clone(&alerts),
        Arc::clone(&bus),
    ));
    let admission = AdmissionController::new(Arc::clone(&safety), Arc::clone(&ledger), None);

    let store = Arc::new(InMemoryTermStore::new());
    store.seed_terms(term_count, "general");
    let store: Arc<dyn lexigen_store::TermStore> = store;

    let engine_config = OrchestratorConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
        },
        ..Default::default()
    };
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
        Arc::new(provider),
        store,
        Arc::clone(&bus),
    );

    let state = AppState {
        orchestrator,
        estimates,
        config: Arc::new(config.clone()),
        event_bus: bus,
    };

    build_app_router(state, &config)
}

pub fn build_test_app() -> Router {
    build_test_app_with(MockProvider::new(), 30)
}

/// Issue one request and return `(status, parsed JSON body)`.
pub async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", "test-admin");
    let request = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(json.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

/// A minimal valid start request over explicit term ids.
pub fn start_body(term_ids: &[i64]) -> serde_json::Value {
    serde_json::json!({
        "section": "definition",
        "selection": { "kind": "explicit_ids", "term_ids": term_ids },
        "processing": {
            "batch_size": 10,
            "model": "gpt-4o-mini",
            "temperature": 0.7,
            "max_tokens": 1024,
            "regenerate_existing": true,
            "max_concurrent_workers": 2
        }
    })
}

/// Poll `uri` until `predicate` passes or the attempt budget runs out.
pub async fn poll_until(
    router: &Router,
    uri: &str,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..500 {
        let (status, json) = request(router, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK, "poll target returned {status}");
        if predicate(&json) {
            return json;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition never satisfied for {uri}");
}
