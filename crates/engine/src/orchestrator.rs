//! Operation orchestrator: the top-level state machine.
//!
//! On admission it creates a batch operation, drives bounded-concurrency
//! processing of per-item work units, consults the cost ledger and safety
//! monitor after every item, and reports to the progress tracker.
//!
//! Cancellation is cooperative: workers re-check the operation state and
//! the emergency-stop flag before claiming each item; an item already
//! mid-flight is allowed to finish so its (paid-for) result is recorded.

use std::sync::Arc;
use std::time::Duration;

use lexigen_core::alert::AlertKind;
use lexigen_core::cost::{compute_cost, PriceTable};
use lexigen_core::error::CoreError;
use lexigen_core::estimation::{estimate_operation, estimate_term};
use lexigen_core::item::{RetryPolicy, WorkItem};
use lexigen_core::operation::{OperationSpec, OperationState};
use lexigen_core::progress::{milestones_crossed, DetailedMetrics, ProgressSnapshot};
use lexigen_core::types::{micros_to_usd, MicroUsd, TermId};
use lexigen_events::{event_types, DomainEvent, EventBus};
use lexigen_provider::types::GenerationRequest;
use lexigen_provider::GenerationProvider;
use lexigen_store::error::StoreError;
use lexigen_store::models::GeneratedContent;
use lexigen_store::TermStore;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::admission::{AdmissionController, AdmissionDecision, AdmissionRequest};
use crate::alerts::AlertRegistry;
use crate::error::EngineError;
use crate::ledger::{BudgetView, CostLedger};
use crate::progress::ProgressTracker;
use crate::registry::{OperationRegistry, OperationRuntime, OperationView};
use crate::safety::{EmergencyStopState, SafetyMonitor};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which limits a `resume` re-validates against.
///
/// Budgets and the emergency stop may have changed while the operation was
/// paused; the safer default re-checks admission against the latest state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Re-run admission against the latest limits (default).
    LatestLimits,
    /// Trust the admission decision made at start; only the emergency stop
    /// is re-checked.
    CapturedAtStart,
}

/// Calibration averages used for admission-time and endpoint estimates.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationDefaults {
    pub avg_input_tokens: u64,
    pub avg_output_tokens: u64,
    pub avg_generation_secs: f64,
    pub sample_count: i32,
}

impl Default for CalibrationDefaults {
    fn default() -> Self {
        Self {
            avg_input_tokens: 250,
            avg_output_tokens: 600,
            avg_generation_secs: 6.0,
            sample_count: 0,
        }
    }
}

/// Orchestrator knobs, injected at construction.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub resume_policy: ResumePolicy,
    pub prices: PriceTable,
    pub calibration: CalibrationDefaults,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            resume_policy: ResumePolicy::LatestLimits,
            prices: PriceTable::default(),
            calibration: CalibrationDefaults::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results / views
// ---------------------------------------------------------------------------

/// Outcome of a `start` call.
#[derive(Debug)]
pub enum StartOutcome {
    /// The operation was created and is processing.
    Accepted { operation_id: Uuid },
    /// Admission denied; no state was created.
    Denied(AdmissionDecision),
}

/// Full read-model for `GET /batch/operations/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDetail {
    pub operation: OperationView,
    pub items: Vec<WorkItem>,
    pub current_progress: Option<ProgressSnapshot>,
    pub progress_history: Vec<ProgressSnapshot>,
    pub metrics: DetailedMetrics,
}

/// Safety block of the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyStatusView {
    pub emergency_stop: EmergencyStopState,
    pub limits: lexigen_core::safety::SafetyLimits,
    pub active_operations: u32,
    pub open_alerts: usize,
}

/// Cost block of the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct CostSummaryView {
    pub today_usd: f64,
    pub this_month_usd: f64,
    pub budgets: Vec<BudgetView>,
}

/// `GET /batch/dashboard` aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub active_operations: Vec<OperationView>,
    pub safety: SafetyStatusView,
    pub costs: CostSummaryView,
}

// ---------------------------------------------------------------------------
// Item outcome (internal)
// ---------------------------------------------------------------------------

enum ItemOutcome {
    Succeeded { cost: MicroUsd },
    Failed { error: String },
    /// Unrecoverable orchestration error; the whole operation fails.
    Fault(String),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// The orchestration control plane. Cheaply cloneable; all state lives
/// behind `Arc`.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: OrchestratorConfig,
    registry: OperationRegistry,
    ledger: Arc<CostLedger>,
    progress: Arc<ProgressTracker>,
    safety: Arc<SafetyMonitor>,
    admission: AdmissionController,
    alerts: Arc<AlertRegistry>,
    provider: Arc<dyn GenerationProvider>,
    store: Arc<dyn TermStore>,
    bus: Arc<EventBus>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        ledger: Arc<CostLedger>,
        progress: Arc<ProgressTracker>,
        safety: Arc<SafetyMonitor>,
        admission: AdmissionController,
        alerts: Arc<AlertRegistry>,
        provider: Arc<dyn GenerationProvider>,
        store: Arc<dyn TermStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: OperationRegistry::new(),
                ledger,
                progress,
                safety,
                admission,
                alerts,
                provider,
                store,
                bus,
            }),
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.inner.registry
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.inner.progress
    }

    pub fn safety(&self) -> &SafetyMonitor {
        &self.inner.safety
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.inner.ledger
    }

    pub fn alerts(&self) -> &AlertRegistry {
        &self.inner.alerts
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    // -- lifecycle entry points ----------------------------------------------

    /// Validate, gate through admission, create the operation, and begin
    /// processing. On denial no state is created.
    pub async fn start(&self, spec: OperationSpec) -> Result<StartOutcome, EngineError> {
        spec.validate()?;
        let inner = &self.inner;

        let term_ids = match inner
            .store
            .resolve_selection(
                &spec.section,
                &spec.selection,
                spec.processing.regenerate_existing,
            )
            .await
        {
            Ok(ids) => ids,
            Err(StoreError::TermNotFound(id)) => {
                return Err(CoreError::Validation(format!("Unknown term id: {id}")).into());
            }
            Err(StoreError::Unavailable(msg)) => return Err(EngineError::Fault(msg)),
        };
        if term_ids.is_empty() {
            return Err(CoreError::Validation("Selection matched no terms".to_string()).into());
        }

        let safety_limits = inner.safety.limits();
        if term_ids.len() as u32 > safety_limits.max_items_per_operation {
            return Err(CoreError::Validation(format!(
                "Selection matched {} terms; limit is {} per operation",
                term_ids.len(),
                safety_limits.max_items_per_operation
            ))
            .into());
        }

        let (estimated_cost, estimated_secs) = inner.estimate_for(
            term_ids.len() as u32,
            &spec.processing.model,
            spec.processing.max_concurrent_workers,
        );
        let request = AdmissionRequest {
            section: spec.section.clone(),
            term_count: term_ids.len() as u32,
            estimated_cost,
            estimated_duration_secs: estimated_secs,
        };
        let decision = inner
            .admission
            .check_permission(&spec.meta.initiated_by, &request);
        if !decision.allowed {
            tracing::info!(
                user = %spec.meta.initiated_by,
                reason = ?decision.reason,
                "Operation admission denied",
            );
            return Ok(StartOutcome::Denied(decision));
        }

        // Reserve the concurrency slot; this is the exactly-once ceiling
        // enforcement. A lost race with another start is a denial too.
        if !inner.safety.start_operation() {
            return Ok(StartOutcome::Denied(AdmissionDecision::concurrency_denied()));
        }

        let limits = spec.limits.resolve();
        let runtime = OperationRuntime::new(spec, limits, term_ids);
        runtime.mark_slot_held();
        inner.registry.insert(Arc::clone(&runtime));
        inner.admission.note_start(&runtime.spec.meta.initiated_by);

        tracing::info!(
            operation_id = %runtime.id,
            section = %runtime.spec.section,
            items = runtime.counts().total,
            workers = runtime.spec.processing.max_concurrent_workers,
            estimated_cost_usd = micros_to_usd(estimated_cost),
            "Batch operation created",
        );
        inner.bus.publish(
            DomainEvent::new(event_types::OPERATION_STARTED)
                .with_operation(runtime.id)
                .with_actor(runtime.spec.meta.initiated_by.clone())
                .with_payload(inner.notification_payload(&runtime, false)),
        );

        runtime.transition(OperationState::Running, "");
        inner.record_snapshot(&runtime);
        self.spawn_driver(Arc::clone(&runtime));

        Ok(StartOutcome::Accepted {
            operation_id: runtime.id,
        })
    }

    /// Pause a running operation. Returns false (no-op) when the operation
    /// is not running.
    pub fn pause(&self, operation_id: Uuid) -> Result<bool, EngineError> {
        let runtime = self.runtime(operation_id)?;
        Ok(self.inner.pause_operation(&runtime, "operator request"))
    }

    /// Resume a paused operation. Re-validates admission per the configured
    /// [`ResumePolicy`]; returns false when the operation is not paused or
    /// admission denies the resume.
    pub fn resume(&self, operation_id: Uuid) -> Result<bool, EngineError> {
        let inner = &self.inner;
        let runtime = self.runtime(operation_id)?;
        if runtime.state() != OperationState::Paused {
            return Ok(false);
        }

        match inner.config.resume_policy {
            ResumePolicy::LatestLimits => {
                let counts = runtime.counts();
                let remaining = counts.total - counts.processed();
                let (estimated_cost, estimated_secs) = inner.estimate_for(
                    remaining,
                    &runtime.spec.processing.model,
                    runtime.spec.processing.max_concurrent_workers,
                );
                let request = AdmissionRequest {
                    section: runtime.spec.section.clone(),
                    term_count: remaining,
                    estimated_cost,
                    estimated_duration_secs: estimated_secs,
                };
                let decision = inner
                    .admission
                    .check_permission(&runtime.spec.meta.initiated_by, &request);
                if !decision.allowed {
                    tracing::warn!(
                        operation_id = %runtime.id,
                        reason = ?decision.reason,
                        "Resume denied by admission re-validation",
                    );
                    return Ok(false);
                }
            }
            ResumePolicy::CapturedAtStart => {
                if inner.safety.emergency_stop_active() {
                    return Ok(false);
                }
            }
        }

        if !inner.safety.start_operation() {
            return Ok(false);
        }
        if !runtime.transition(OperationState::Running, "resumed") {
            inner.safety.stop_operation();
            return Ok(false);
        }
        runtime.mark_slot_held();

        inner.bus.publish(
            DomainEvent::new(event_types::OPERATION_RESUMED)
                .with_operation(runtime.id)
                .with_payload(inner.notification_payload(&runtime, false)),
        );
        self.spawn_driver(runtime);
        Ok(true)
    }

    /// Cancel an operation. Irreversible: queued items are discarded; an
    /// item already mid-flight finishes and its result is recorded.
    /// Returns false (no-op) when already in a terminal state.
    pub fn cancel(&self, operation_id: Uuid) -> Result<bool, EngineError> {
        let inner = &self.inner;
        let runtime = self.runtime(operation_id)?;

        if !runtime.transition(OperationState::Cancelled, "operator request") {
            return Ok(false);
        }
        runtime.cancel_token().cancel();
        let skipped = runtime.skip_queued();
        if runtime.take_slot() {
            inner.safety.stop_operation();
        }
        inner.safety.clear_operation(runtime.id);
        inner.record_snapshot(&runtime);

        tracing::info!(
            operation_id = %runtime.id,
            skipped,
            "Operation cancelled; queued items discarded",
        );
        inner.bus.publish(
            DomainEvent::new(event_types::OPERATION_CANCELLED)
                .with_operation(runtime.id)
                .with_payload(inner.notification_payload(&runtime, false)),
        );
        Ok(true)
    }

    /// Pause every running operation (emergency stop path). Returns the
    /// number of operations paused.
    pub fn halt_all(&self, reason: &str) -> usize {
        let mut paused = 0;
        for runtime in self.inner.registry.active() {
            if self.inner.pause_operation(&runtime, reason) {
                paused += 1;
            }
        }
        tracing::warn!(paused, reason, "All running operations halted");
        paused
    }

    // -- read models ----------------------------------------------------------

    pub fn operation_detail(&self, operation_id: Uuid) -> Result<OperationDetail, EngineError> {
        let runtime = self.runtime(operation_id)?;
        Ok(OperationDetail {
            operation: runtime.view(),
            items: runtime.items_snapshot(),
            current_progress: self.inner.progress.current(operation_id),
            progress_history: self.inner.progress.history(operation_id),
            metrics: self.inner.progress.detailed_metrics(operation_id),
        })
    }

    pub fn dashboard(&self) -> DashboardView {
        let inner = &self.inner;
        let now = chrono::Utc::now();
        DashboardView {
            active_operations: inner.registry.active().iter().map(|op| op.view()).collect(),
            safety: SafetyStatusView {
                emergency_stop: inner.safety.emergency_stop(),
                limits: inner.safety.limits(),
                active_operations: inner.safety.active_operations(),
                open_alerts: inner.alerts.open_count(),
            },
            costs: CostSummaryView {
                today_usd: micros_to_usd(
                    inner
                        .ledger
                        .spend_in_period(lexigen_core::cost::BudgetPeriod::Daily, now),
                ),
                this_month_usd: micros_to_usd(
                    inner
                        .ledger
                        .spend_in_period(lexigen_core::cost::BudgetPeriod::Monthly, now),
                ),
                budgets: inner.ledger.list_budgets(),
            },
        }
    }

    // -- internals ------------------------------------------------------------

    fn runtime(&self, operation_id: Uuid) -> Result<Arc<OperationRuntime>, EngineError> {
        self.inner
            .registry
            .get(operation_id)
            .ok_or(EngineError::OperationNotFound(operation_id))
    }

    fn spawn_driver(&self, runtime: Arc<OperationRuntime>) {
        let inner = Arc::clone(&self.inner);
        // New driver generation: workers of a superseded pool (pause then
        // quick resume) stop at their next checkpoint.
        let epoch = runtime.begin_epoch();
        tokio::spawn(async move {
            Inner::drive(inner, runtime, epoch).await;
        });
    }
}

impl Inner {
    /// Run the bounded worker pool for one operation, then finalize it.
    async fn drive(inner: Arc<Inner>, runtime: Arc<OperationRuntime>, epoch: u32) {
        let workers = runtime.spec.processing.max_concurrent_workers.max(1);
        let mut pool = tokio::task::JoinSet::new();
        for worker_idx in 0..workers {
            let inner = Arc::clone(&inner);
            let runtime = Arc::clone(&runtime);
            pool.spawn(async move {
                inner.worker_loop(&runtime, epoch, worker_idx).await;
            });
        }
        while pool.join_next().await.is_some() {}
        inner.finalize(&runtime);
    }

    /// One worker: claim and process queued items until a cooperative
    /// checkpoint says stop.
    async fn worker_loop(&self, runtime: &Arc<OperationRuntime>, epoch: u32, worker_idx: u32) {
        loop {
            // Cooperative checkpoint, re-checked before every item.
            if runtime.cancel_token().is_cancelled()
                || self.safety.emergency_stop_active()
                || runtime.state() != OperationState::Running
                || runtime.current_epoch() != epoch
            {
                break;
            }
            let Some((idx, term_id)) = runtime.claim_next_queued() else {
                break;
            };

            let outcome = self.process_item(runtime, idx, term_id).await;
            self.after_item(runtime, outcome);
        }
        tracing::debug!(
            operation_id = %runtime.id,
            worker = worker_idx,
            "Worker stopped",
        );
    }

    /// Process one work item: call the provider with bounded retries,
    /// persist the content, and settle the item's terminal state.
    async fn process_item(
        &self,
        runtime: &Arc<OperationRuntime>,
        idx: usize,
        term_id: TermId,
    ) -> ItemOutcome {
        let term = match self.store.get_term(term_id).await {
            Ok(term) => term,
            Err(StoreError::TermNotFound(_)) => {
                let _ = runtime.with_item(idx, |item| item.fail("term no longer exists"));
                return ItemOutcome::Failed {
                    error: "term no longer exists".to_string(),
                };
            }
            Err(StoreError::Unavailable(msg)) => return ItemOutcome::Fault(msg),
        };

        let processing = &runtime.spec.processing;
        let request = GenerationRequest {
            model: processing.model.clone(),
            prompt: build_prompt(&term.name, &runtime.spec.section),
            temperature: processing.temperature,
            max_tokens: processing.max_tokens,
        };
        let price = self.config.prices.price_for(&processing.model);
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            runtime.with_item(idx, |item| {
                item.attempts = attempt;
                item.next_retry_at = None;
            });

            match self.provider.generate(&request).await {
                Ok(output) => {
                    let cost = compute_cost(price, output.input_tokens, output.output_tokens);
                    match self
                        .store
                        .write_content(GeneratedContent {
                            term_id,
                            section: runtime.spec.section.clone(),
                            content: output.content,
                            model: processing.model.clone(),
                            input_tokens: output.input_tokens,
                            output_tokens: output.output_tokens,
                        })
                        .await
                    {
                        Ok(()) => {}
                        Err(StoreError::TermNotFound(_)) => {
                            let _ = runtime
                                .with_item(idx, |item| item.fail("term vanished before write"));
                            return ItemOutcome::Failed {
                                error: "term vanished before write".to_string(),
                            };
                        }
                        Err(StoreError::Unavailable(msg)) => return ItemOutcome::Fault(msg),
                    }

                    let _ = runtime.with_item(idx, |item| {
                        item.succeed(cost, output.input_tokens, output.output_tokens)
                    });
                    return ItemOutcome::Succeeded { cost };
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        operation_id = %runtime.id,
                        term_id,
                        attempt,
                        error = %e,
                        "Generation attempt failed",
                    );
                    if attempt < max_attempts {
                        let delay = self.config.retry.delay_ms(attempt);
                        let jitter = rand::rng().random_range(0..=(delay / 4).max(1));
                        let wait = Duration::from_millis(delay + jitter);
                        runtime.with_item(idx, |item| {
                            item.next_retry_at = Some(
                                chrono::Utc::now()
                                    + chrono::Duration::milliseconds(wait.as_millis() as i64),
                            );
                        });
                        tokio::select! {
                            _ = runtime.cancel_token().cancelled() => break,
                            _ = tokio::time::sleep(wait) => {}
                        }
                    }
                }
            }
        }

        let _ = runtime.with_item(idx, |item| item.fail(last_error.clone()));
        ItemOutcome::Failed { error: last_error }
    }

    /// Post-item accounting: cost tracking, ceiling checks, failure-rate
    /// evaluation, progress snapshot, milestone events.
    fn after_item(&self, runtime: &Arc<OperationRuntime>, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded { cost } => {
                let total = runtime.add_cost(cost);
                self.ledger
                    .track_cost(runtime.id, &runtime.spec.processing.model, cost);
                self.safety.record_item_outcome(runtime.id, false);

                // Ceiling checks fire within one item's granularity: the
                // breaching item is recorded, then the operation pauses
                // before the next queued item starts.
                if cost > runtime.limits.max_cost_per_term {
                    self.pause_for_breach(
                        runtime,
                        AlertKind::CostExceeded,
                        format!(
                            "Item cost ${:.4} exceeds per-term limit ${:.4}",
                            micros_to_usd(cost),
                            micros_to_usd(runtime.limits.max_cost_per_term),
                        ),
                    );
                } else if total > runtime.limits.max_total_cost {
                    self.pause_for_breach(
                        runtime,
                        AlertKind::CostExceeded,
                        format!(
                            "Cumulative cost ${:.4} exceeds operation limit ${:.4}",
                            micros_to_usd(total),
                            micros_to_usd(runtime.limits.max_total_cost),
                        ),
                    );
                }
            }
            ItemOutcome::Failed { error } => {
                let breached = self.safety.track_failure(runtime.id, &error);
                if runtime.spec.processing.pause_on_error {
                    self.pause_operation(runtime, "item failed and pause_on_error is set");
                } else if breached {
                    self.pause_for_breach(
                        runtime,
                        AlertKind::FailureRate,
                        format!(
                            "Rolling failure rate exceeded {}%",
                            self.safety.limits().max_failure_rate_pct,
                        ),
                    );
                }
            }
            ItemOutcome::Fault(msg) => {
                if runtime.transition(OperationState::Failed, &msg) {
                    if runtime.take_slot() {
                        self.safety.stop_operation();
                    }
                    self.safety.clear_operation(runtime.id);
                    self.alerts.raise_for_operation(
                        runtime.id,
                        AlertKind::OperationFault,
                        format!("Operation failed: {msg}"),
                    );
                    self.bus.publish(
                        DomainEvent::new(event_types::OPERATION_FAILED)
                            .with_operation(runtime.id)
                            .with_payload(self.notification_payload(runtime, false)),
                    );
                }
            }
        }

        self.record_snapshot(runtime);
        self.publish_milestones(runtime);
    }

    /// Completion / emergency-stop settlement after the worker pool drains.
    fn finalize(&self, runtime: &Arc<OperationRuntime>) {
        if self.safety.emergency_stop_active() && runtime.state() == OperationState::Running {
            self.pause_operation(runtime, "emergency stop");
            return;
        }

        if runtime.state() == OperationState::Running && runtime.all_items_terminal() {
            if runtime.transition(OperationState::Completed, "") {
                if runtime.take_slot() {
                    self.safety.stop_operation();
                }
                self.safety.clear_operation(runtime.id);
                self.record_snapshot(runtime);

                let counts = runtime.counts();
                tracing::info!(
                    operation_id = %runtime.id,
                    succeeded = counts.succeeded,
                    failed = counts.failed,
                    cost_usd = micros_to_usd(runtime.total_cost()),
                    "Operation completed",
                );
                self.bus.publish(
                    DomainEvent::new(event_types::OPERATION_COMPLETED)
                        .with_operation(runtime.id)
                        .with_payload(self.notification_payload(runtime, true)),
                );
            }
        }
    }

    /// Pause with a breach alert. The alert is raised only by the caller
    /// that actually performed the transition, so a breach observed by two
    /// workers produces one alert.
    fn pause_for_breach(&self, runtime: &Arc<OperationRuntime>, kind: AlertKind, message: String) {
        if self.pause_operation(runtime, &message) {
            self.alerts.raise_for_operation(runtime.id, kind, message);
        }
    }

    fn pause_operation(&self, runtime: &Arc<OperationRuntime>, reason: &str) -> bool {
        if !runtime.transition(OperationState::Paused, reason) {
            return false;
        }
        if runtime.take_slot() {
            self.safety.stop_operation();
        }
        self.record_snapshot(runtime);
        self.bus.publish(
            DomainEvent::new(event_types::OPERATION_PAUSED)
                .with_operation(runtime.id)
                .with_payload(serde_json::json!({
                    "reason": reason,
                    "webhook_url": runtime.spec.notifications.webhook_url,
                })),
        );
        true
    }

    fn record_snapshot(&self, runtime: &Arc<OperationRuntime>) {
        let counts = runtime.counts();
        self.progress.record(
            runtime.id,
            ProgressSnapshot {
                recorded_at: chrono::Utc::now(),
                items_processed: counts.processed(),
                items_total: counts.total,
                cost: runtime.total_cost(),
                avg_quality: None,
                state: runtime.state(),
            },
        );
    }

    /// Publish one `operation.milestone` event per percentage crossed.
    fn publish_milestones(&self, runtime: &Arc<OperationRuntime>) {
        let milestones = &runtime.spec.notifications.milestone_percents;
        if milestones.is_empty() {
            return;
        }
        let counts = runtime.counts();
        let new_pct = if counts.total == 0 {
            100
        } else {
            (counts.processed() as u64 * 100 / counts.total as u64).min(100) as u8
        };
        let prev_pct = runtime.swap_progress_pct(new_pct);
        for milestone in milestones_crossed(prev_pct, new_pct, milestones) {
            self.bus.publish(
                DomainEvent::new(event_types::OPERATION_MILESTONE)
                    .with_operation(runtime.id)
                    .with_payload(serde_json::json!({
                        "milestone_pct": milestone,
                        "items_processed": counts.processed(),
                        "items_total": counts.total,
                        "webhook_url": runtime.spec.notifications.webhook_url,
                    })),
            );
        }
    }

    /// Event payload carrying counts, cost, and the delivery hints the
    /// notification router acts on.
    fn notification_payload(
        &self,
        runtime: &Arc<OperationRuntime>,
        completion: bool,
    ) -> serde_json::Value {
        let counts = runtime.counts();
        let notifications = &runtime.spec.notifications;
        let mut payload = serde_json::json!({
            "section": runtime.spec.section,
            "items_total": counts.total,
            "items_processed": counts.processed(),
            "succeeded": counts.succeeded,
            "failed": counts.failed,
            "cost_usd": micros_to_usd(runtime.total_cost()),
            "webhook_url": notifications.webhook_url,
        });
        if completion && notifications.email_on_completion {
            payload["notify_email"] =
                serde_json::Value::String(runtime.spec.meta.initiated_by.clone());
        }
        payload
    }

    /// Admission-time estimate from calibration defaults and the price table.
    fn estimate_for(&self, term_count: u32, model: &str, workers: u32) -> (MicroUsd, f64) {
        let calibration = self.config.calibration;
        let price = self.config.prices.price_for(model);
        let per_term = estimate_term(
            calibration.avg_input_tokens,
            calibration.avg_output_tokens,
            price,
            calibration.avg_generation_secs,
            calibration.sample_count,
        );
        let terms = vec![per_term; term_count as usize];
        let estimate = estimate_operation(&terms, workers);
        (estimate.total_cost, estimate.wall_clock_secs)
    }
}

/// Prompt sent to the provider for one `(term, section)` pair.
fn build_prompt(term_name: &str, section: &str) -> String {
    format!("Write the {section} section for the glossary term \"{term_name}\".")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
