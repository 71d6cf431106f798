//! End-to-end orchestrator scenarios against the in-memory store and the
//! scriptable mock provider.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use lexigen_core::item::{ItemState, RetryPolicy};
use lexigen_core::operation::{
    CostLimits, NotificationConfig, OperationMeta, OperationSpec, OperationState, ProcessingConfig,
};
use lexigen_core::safety::{DenialReason, SafetyLimits};
use lexigen_core::selection::SelectionCriteria;
use lexigen_core::types::usd_to_micros;
use lexigen_engine::{
    AdmissionController, AlertRegistry, CostLedger, Orchestrator, OrchestratorConfig,
    ProgressTracker, SafetyMonitor, StartOutcome,
};
use lexigen_events::EventBus;
use lexigen_provider::mock::MockProvider;
use lexigen_store::memory::InMemoryTermStore;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    orchestrator: Orchestrator,
    store: Arc<InMemoryTermStore>,
    provider: Arc<MockProvider>,
}

/// Fresh registries per test; fast retry policy so retry paths settle in
/// milliseconds.
fn fixture(provider: MockProvider, term_count: usize) -> Fixture {
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
    let provider = Arc::new(provider);

    let config = OrchestratorConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
        },
        ..Default::default()
    };

    let orchestrator = Orchestrator::new(
        config,
        ledger,
        progress,
        safety,
        admission,
        alerts,
        Arc::clone(&provider) as Arc<dyn lexigen_provider::GenerationProvider>,
        Arc::clone(&store) as Arc<dyn lexigen_store::TermStore>,
        bus,
    );

    Fixture {
        orchestrator,
        store,
        provider,
    }
}

fn spec(batch_size: u32, workers: u32) -> OperationSpec {
    OperationSpec {
        section: "definition".to_string(),
        selection: SelectionCriteria::Category {
            category: "general".to_string(),
        },
        processing: ProcessingConfig {
            batch_size,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            regenerate_existing: true,
            pause_on_error: false,
            max_concurrent_workers: workers,
        },
        limits: CostLimits::default(),
        notifications: NotificationConfig::default(),
        meta: OperationMeta {
            initiated_by: "admin".to_string(),
            reason: Some("test run".to_string()),
            tags: vec![],
        },
    }
}

async fn start_accepted(fixture: &Fixture, spec: OperationSpec) -> Uuid {
    match fixture.orchestrator.start(spec).await.unwrap() {
        StartOutcome::Accepted { operation_id } => operation_id,
        StartOutcome::Denied(decision) => panic!("unexpected denial: {decision:?}"),
    }
}

async fn wait_for_state(fixture: &Fixture, id: Uuid, state: OperationState) {
    for _ in 0..500 {
        if fixture.orchestrator.registry().get(id).unwrap().state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "operation never reached {state:?}; current: {:?}",
        fixture.orchestrator.registry().get(id).unwrap().state()
    );
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn twenty_five_items_two_workers_complete_exactly_once() {
    let fixture = fixture(MockProvider::new(), 25);
    let id = start_accepted(&fixture, spec(10, 2)).await;

    wait_for_state(&fixture, id, OperationState::Completed).await;

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    let counts = runtime.counts();
    assert_eq!(counts.total, 25);
    assert_eq!(counts.succeeded, 25);
    assert_eq!(counts.failed, 0);

    // Every item exactly once: 25 provider calls, 25 content writes.
    assert_eq!(fixture.provider.call_count(), 25);
    assert_eq!(fixture.store.written().len(), 25);

    let lifecycle = runtime.lifecycle();
    assert!(lifecycle.started_at.unwrap() <= lifecycle.finished_at.unwrap());

    // Snapshots: monotonically non-decreasing progress, strictly
    // increasing timestamps.
    let history = fixture.orchestrator.progress().history(id);
    assert!(!history.is_empty());
    for pair in history.windows(2) {
        assert!(pair[1].items_processed >= pair[0].items_processed);
        assert!(pair[1].recorded_at > pair[0].recorded_at);
    }
    assert_eq!(history.last().unwrap().items_processed, 25);
}

#[tokio::test]
async fn completed_operation_has_positive_recorded_cost() {
    let fixture = fixture(MockProvider::new(), 5);
    let id = start_accepted(&fixture, spec(5, 1)).await;
    wait_for_state(&fixture, id, OperationState::Completed).await;

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    assert!(runtime.total_cost() > 0);
    assert_eq!(
        fixture.orchestrator.ledger().operation_total(id),
        runtime.total_cost()
    );
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn denied_start_creates_no_operation() {
    let fixture = fixture(MockProvider::new(), 5);
    fixture
        .orchestrator
        .safety()
        .activate_emergency_stop("drill", "ops");

    let outcome = fixture.orchestrator.start(spec(5, 1)).await.unwrap();
    assert_matches!(outcome, StartOutcome::Denied(decision) => {
        assert_eq!(decision.reason, Some(DenialReason::EmergencyStop));
    });

    // The operation list is unchanged.
    assert!(fixture.orchestrator.registry().is_empty());
    assert_eq!(fixture.provider.call_count(), 0);
}

#[tokio::test]
async fn invalid_config_rejected_without_state() {
    let fixture = fixture(MockProvider::new(), 5);
    let mut bad = spec(5, 1);
    bad.processing.batch_size = 0;

    assert!(fixture.orchestrator.start(bad).await.is_err());
    assert!(fixture.orchestrator.registry().is_empty());
}

// ---------------------------------------------------------------------------
// Cost ceilings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn per_term_cost_breach_pauses_before_next_item() {
    // term-2's generation reports a huge completion: ~$1.20 at the
    // gpt-4o-mini output rate, over the $1.00 per-term ceiling.
    let provider = MockProvider::new().tokens_when("term-2\"", 1_000, 2_000_000);
    let fixture = fixture(provider, 5);

    let mut spec = spec(5, 1);
    spec.limits = CostLimits {
        max_total_cost: Some(usd_to_micros(100.0)),
        max_cost_per_term: Some(usd_to_micros(1.0)),
        warning_threshold_pct: None,
    };
    let id = start_accepted(&fixture, spec).await;

    wait_for_state(&fixture, id, OperationState::Paused).await;

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    let items = runtime.items_snapshot();
    // The breaching item is recorded once, with its real cost.
    assert_eq!(items[1].state, ItemState::Succeeded);
    assert!(items[1].cost > usd_to_micros(1.0));
    // No item after the breach was started.
    for item in &items[2..] {
        assert_eq!(item.state, ItemState::Queued);
    }

    let alerts = fixture.orchestrator.alerts().list(None);
    assert!(alerts
        .iter()
        .any(|a| a.kind == lexigen_core::alert::AlertKind::CostExceeded
            && a.operation_id == Some(id)));
}

#[tokio::test]
async fn cumulative_cost_breach_fires_within_one_item() {
    // Every item costs ~$0.30; the $1.00 operation ceiling breaks on the
    // fourth item.
    let provider = MockProvider::new().tokens_when("term", 0, 500_000);
    let fixture = fixture(provider, 10);

    let mut spec = spec(10, 1);
    spec.limits = CostLimits {
        max_total_cost: Some(usd_to_micros(1.0)),
        max_cost_per_term: Some(usd_to_micros(10.0)),
        warning_threshold_pct: None,
    };
    let id = start_accepted(&fixture, spec).await;

    wait_for_state(&fixture, id, OperationState::Paused).await;

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    // The ceiling may be exceeded by at most the single in-flight item
    // that caused the breach.
    let max_total = usd_to_micros(1.0);
    let per_item = usd_to_micros(0.3);
    assert!(runtime.total_cost() > max_total);
    assert!(runtime.total_cost() <= max_total + per_item + usd_to_micros(0.01));

    let counts = runtime.counts();
    assert_eq!(counts.succeeded, 4);
    assert_eq!(counts.queued, 6);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_on_error_freezes_remaining_items() {
    let provider = MockProvider::new().fail_when("term-3\"");
    let fixture = fixture(provider, 10);

    let mut spec = spec(10, 1);
    spec.processing.pause_on_error = true;
    let id = start_accepted(&fixture, spec).await;

    wait_for_state(&fixture, id, OperationState::Paused).await;

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    let items = runtime.items_snapshot();
    assert_eq!(items[0].state, ItemState::Succeeded);
    assert_eq!(items[1].state, ItemState::Succeeded);
    assert_eq!(items[2].state, ItemState::Failed);
    // The failed item exhausted its retry budget.
    assert_eq!(items[2].attempts, 3);
    assert!(items[2].last_error.is_some());
    for item in &items[3..] {
        assert_eq!(item.state, ItemState::Queued);
    }
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let provider = MockProvider::new().fail_first(2);
    let fixture = fixture(provider, 3);

    let id = start_accepted(&fixture, spec(3, 1)).await;
    wait_for_state(&fixture, id, OperationState::Completed).await;

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    assert_eq!(runtime.counts().succeeded, 3);
    // 3 items + 2 retried failures.
    assert_eq!(fixture.provider.call_count(), 5);
    // The retried item kept its queue position; only attempts increased.
    let items = runtime.items_snapshot();
    assert_eq!(items[0].attempts, 3);
    assert_eq!(items[1].attempts, 1);
}

#[tokio::test]
async fn failure_rate_breach_auto_pauses() {
    let provider = MockProvider::new().fail_when("term-");
    let fixture = fixture(provider, 10);

    // pause_on_error stays false; the rolling failure rate (25% default
    // ceiling) is what must trip.
    let id = start_accepted(&fixture, spec(10, 1)).await;
    wait_for_state(&fixture, id, OperationState::Paused).await;

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    let counts = runtime.counts();
    // Breach needs the minimum sample count, then pauses promptly.
    assert!(counts.failed >= 5);
    assert!(counts.queued > 0);

    let alerts = fixture.orchestrator.alerts().list(None);
    assert!(alerts
        .iter()
        .any(|a| a.kind == lexigen_core::alert::AlertKind::FailureRate));
}

// ---------------------------------------------------------------------------
// Pause / resume / cancel semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transition_noops_report_failure() {
    let provider = MockProvider::new().with_delay(Duration::from_millis(30));
    let fixture = fixture(provider, 50);
    let id = start_accepted(&fixture, spec(10, 1)).await;

    // Running: resume is a no-op.
    assert!(!fixture.orchestrator.resume(id).unwrap());

    assert!(fixture.orchestrator.pause(id).unwrap());
    // Pausing a paused operation reports failure.
    assert!(!fixture.orchestrator.pause(id).unwrap());

    assert!(fixture.orchestrator.resume(id).unwrap());
    wait_for_state(&fixture, id, OperationState::Running).await;

    assert!(fixture.orchestrator.cancel(id).unwrap());
    // Cancel is idempotent: a second cancel reports failure, not an error.
    assert!(!fixture.orchestrator.cancel(id).unwrap());

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    assert_eq!(runtime.state(), OperationState::Cancelled);
}

#[tokio::test]
async fn cancel_discards_queued_but_finishes_in_flight() {
    let provider = MockProvider::new().with_delay(Duration::from_millis(50));
    let fixture = fixture(provider, 20);
    let id = start_accepted(&fixture, spec(10, 2)).await;

    // Let a couple of items get in flight.
    tokio::time::sleep(Duration::from_millis(75)).await;
    assert!(fixture.orchestrator.cancel(id).unwrap());

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    // In-flight items are allowed to finish; give them a moment.
    for _ in 0..100 {
        if runtime.all_items_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let counts = runtime.counts();
    assert_eq!(counts.in_progress, 0);
    assert_eq!(counts.queued, 0);
    assert!(counts.skipped > 0);
    // Finished in-flight results were recorded, not discarded.
    assert_eq!(counts.succeeded as usize, fixture.store.written().len());
}

#[tokio::test]
async fn resume_revalidates_against_latest_state() {
    let provider = MockProvider::new().with_delay(Duration::from_millis(30));
    let fixture = fixture(provider, 20);
    let id = start_accepted(&fixture, spec(10, 1)).await;

    assert!(fixture.orchestrator.pause(id).unwrap());

    // Conditions changed while paused: the emergency stop is now active,
    // so the resume re-validation denies.
    fixture
        .orchestrator
        .safety()
        .activate_emergency_stop("incident", "ops");
    assert!(!fixture.orchestrator.resume(id).unwrap());

    fixture.orchestrator.safety().deactivate_emergency_stop("ops");
    assert!(fixture.orchestrator.resume(id).unwrap());
    wait_for_state(&fixture, id, OperationState::Completed).await;
}

// ---------------------------------------------------------------------------
// Emergency stop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn emergency_stop_halts_running_operations() {
    let provider = MockProvider::new().with_delay(Duration::from_millis(30));
    let fixture = fixture(provider, 100);
    let id = start_accepted(&fixture, spec(10, 2)).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    fixture
        .orchestrator
        .safety()
        .activate_emergency_stop("runaway spend", "ops");
    fixture.orchestrator.halt_all("emergency stop");

    wait_for_state(&fixture, id, OperationState::Paused).await;

    let runtime = fixture.orchestrator.registry().get(id).unwrap();
    // Let any in-flight items finish before sampling the processed count.
    for _ in 0..100 {
        if runtime.counts().in_progress == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let processed_at_stop = runtime.counts().processed();

    // Workers observed the flag; nothing further is processed.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(runtime.counts().processed(), processed_at_stop);

    // The gate stays closed for new work until deactivation.
    let outcome = fixture.orchestrator.start(spec(10, 1)).await.unwrap();
    assert_matches!(outcome, StartOutcome::Denied(_));
}

// ---------------------------------------------------------------------------
// Concurrency ceiling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operation_ceiling_denies_extra_starts() {
    let provider = MockProvider::new().with_delay(Duration::from_millis(50));
    let fixture = fixture(provider, 200);

    // Default ceiling is 3 concurrent operations.
    let mut ids = Vec::new();
    for _ in 0..3 {
        let mut s = spec(10, 1);
        s.selection = SelectionCriteria::Category {
            category: "general".to_string(),
        };
        ids.push(start_accepted(&fixture, s).await);
    }

    let outcome = fixture.orchestrator.start(spec(10, 1)).await.unwrap();
    assert_matches!(outcome, StartOutcome::Denied(decision) => {
        assert_eq!(decision.reason, Some(DenialReason::ConcurrencyCeiling));
        assert!(decision.wait_secs.is_some());
    });

    // Cancelling one frees a slot.
    assert!(fixture.orchestrator.cancel(ids[0]).unwrap());
    let outcome = fixture.orchestrator.start(spec(10, 1)).await.unwrap();
    assert_matches!(outcome, StartOutcome::Accepted { .. });
}
