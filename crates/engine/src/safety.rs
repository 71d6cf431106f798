//! Safety monitor: emergency stop, mutable safety limits, the exact-once
//! concurrency gate, and rolling failure-rate tracking.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use lexigen_core::alert::{Alert, AlertKind};
use lexigen_core::error::CoreError;
use lexigen_core::safety::{failure_rate_breached, SafetyLimits, FAILURE_WINDOW};
use lexigen_core::types::Timestamp;
use lexigen_events::{event_types, DomainEvent, EventBus};
use serde::Serialize;
use uuid::Uuid;

use crate::alerts::AlertRegistry;

// ---------------------------------------------------------------------------
// Emergency stop
// ---------------------------------------------------------------------------

/// Snapshot of the system-wide kill switch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmergencyStopState {
    pub active: bool,
    pub reason: Option<String>,
    pub activated_by: Option<String>,
    pub activated_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// SafetyMonitor
// ---------------------------------------------------------------------------

/// Owns the emergency stop and safety limits, aggregates system-wide
/// signals, and gates operation concurrency.
pub struct SafetyMonitor {
    limits: RwLock<SafetyLimits>,
    /// Fast-path flag mirrored from `estop`; read by every worker checkpoint.
    estop_active: AtomicBool,
    estop: Mutex<EmergencyStopState>,
    active_ops: AtomicU32,
    /// Rolling per-operation item outcomes; true = failure.
    outcomes: Mutex<HashMap<Uuid, VecDeque<bool>>>,
    alerts: Arc<AlertRegistry>,
    bus: Arc<EventBus>,
}

impl SafetyMonitor {
    pub fn new(limits: SafetyLimits, alerts: Arc<AlertRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            limits: RwLock::new(limits),
            estop_active: AtomicBool::new(false),
            estop: Mutex::new(EmergencyStopState::default()),
            active_ops: AtomicU32::new(0),
            outcomes: Mutex::new(HashMap::new()),
            alerts,
            bus,
        }
    }

    // -- limits ---------------------------------------------------------------

    /// Latest limits; there is no versioning.
    pub fn limits(&self) -> SafetyLimits {
        *self.limits.read().unwrap()
    }

    /// Replace the limits. Takes effect for all subsequent reads.
    pub fn set_limits(&self, limits: SafetyLimits) -> Result<(), CoreError> {
        limits.validate()?;
        *self.limits.write().unwrap() = limits;
        tracing::info!(
            max_concurrent_operations = limits.max_concurrent_operations,
            max_failure_rate_pct = limits.max_failure_rate_pct,
            "Safety limits updated",
        );
        Ok(())
    }

    // -- emergency stop -------------------------------------------------------

    /// Lock-free read used at every worker checkpoint.
    pub fn emergency_stop_active(&self) -> bool {
        self.estop_active.load(Ordering::SeqCst)
    }

    pub fn emergency_stop(&self) -> EmergencyStopState {
        self.estop.lock().unwrap().clone()
    }

    /// Activate the kill switch. Returns true on the activation edge; calls
    /// while already active update the reason but create no second
    /// activation event beyond a log line.
    pub fn activate_emergency_stop(&self, reason: &str, actor: &str) -> bool {
        let mut estop = self.estop.lock().unwrap();
        if estop.active {
            tracing::warn!(
                reason,
                actor,
                "Emergency stop already active; reason updated",
            );
            estop.reason = Some(reason.to_string());
            return false;
        }

        *estop = EmergencyStopState {
            active: true,
            reason: Some(reason.to_string()),
            activated_by: Some(actor.to_string()),
            activated_at: Some(Utc::now()),
        };
        self.estop_active.store(true, Ordering::SeqCst);
        drop(estop);

        tracing::error!(reason, actor, "EMERGENCY STOP activated");
        self.alerts.raise(Alert::new(
            AlertKind::EmergencyStop,
            format!("Emergency stop activated by {actor}: {reason}"),
        ));
        self.bus.publish(
            DomainEvent::new(event_types::EMERGENCY_STOP_ACTIVATED)
                .with_actor(actor)
                .with_payload(serde_json::json!({ "reason": reason })),
        );
        true
    }

    /// Clear the kill switch. Returns false if it was not active.
    pub fn deactivate_emergency_stop(&self, actor: &str) -> bool {
        let mut estop = self.estop.lock().unwrap();
        if !estop.active {
            return false;
        }
        *estop = EmergencyStopState::default();
        self.estop_active.store(false, Ordering::SeqCst);
        drop(estop);

        tracing::info!(actor, "Emergency stop deactivated");
        self.bus
            .publish(DomainEvent::new(event_types::EMERGENCY_STOP_CLEARED).with_actor(actor));
        true
    }

    // -- concurrency gate -----------------------------------------------------

    pub fn active_operations(&self) -> u32 {
        self.active_ops.load(Ordering::SeqCst)
    }

    /// Whether a new operation could start right now.
    pub fn can_start_operation(&self) -> bool {
        !self.emergency_stop_active()
            && self.active_operations() < self.limits().max_concurrent_operations
    }

    /// Reserve a concurrency slot. Compare-and-swap against the ceiling so
    /// the limit is enforced exactly once at admission, never approximated
    /// by polling. Fails (no state change) when the ceiling is reached.
    pub fn start_operation(&self) -> bool {
        let max = self.limits().max_concurrent_operations;
        self.active_ops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < max).then_some(current + 1)
            })
            .is_ok()
    }

    /// Release a concurrency slot.
    pub fn stop_operation(&self) {
        let _ = self
            .active_ops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });
    }

    // -- failure tracking -----------------------------------------------------

    /// Record one item outcome for an operation. Returns true when the
    /// operation's rolling failure rate now breaches the ceiling and the
    /// orchestrator must pause it.
    pub fn record_item_outcome(&self, operation_id: Uuid, failed: bool) -> bool {
        let mut outcomes = self.outcomes.lock().unwrap();
        let window = outcomes.entry(operation_id).or_default();
        if window.len() == FAILURE_WINDOW {
            window.pop_front();
        }
        window.push_back(failed);

        let failures = window.iter().filter(|f| **f).count();
        failure_rate_breached(failures, window.len(), self.limits().max_failure_rate_pct)
    }

    /// Record a failed item (spec surface; delegates to
    /// [`record_item_outcome`](Self::record_item_outcome)).
    pub fn track_failure(&self, operation_id: Uuid, error: &str) -> bool {
        tracing::debug!(operation_id = %operation_id, error, "Item failure recorded");
        self.record_item_outcome(operation_id, true)
    }

    /// Drop the rolling window of a finished operation.
    pub fn clear_operation(&self, operation_id: Uuid) {
        self.outcomes.lock().unwrap().remove(&operation_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> SafetyMonitor {
        let bus = Arc::new(EventBus::default());
        SafetyMonitor::new(
            SafetyLimits::default(),
            Arc::new(AlertRegistry::new(Arc::clone(&bus))),
            bus,
        )
    }

    fn monitor_with_alerts() -> (SafetyMonitor, Arc<AlertRegistry>) {
        let bus = Arc::new(EventBus::default());
        let alerts = Arc::new(AlertRegistry::new(Arc::clone(&bus)));
        (
            SafetyMonitor::new(SafetyLimits::default(), Arc::clone(&alerts), bus),
            alerts,
        )
    }

    // -- emergency stop -------------------------------------------------------

    #[test]
    fn activation_edge_then_reason_update() {
        let (monitor, alerts) = monitor_with_alerts();

        assert!(monitor.activate_emergency_stop("cost runaway", "ops"));
        assert!(monitor.emergency_stop_active());
        assert_eq!(alerts.list(None).len(), 1);

        // Second activation: reason updated, no second activation event.
        assert!(!monitor.activate_emergency_stop("still bad", "ops2"));
        assert_eq!(alerts.list(None).len(), 1);
        let state = monitor.emergency_stop();
        assert_eq!(state.reason.as_deref(), Some("still bad"));
        assert_eq!(state.activated_by.as_deref(), Some("ops"));
    }

    #[test]
    fn deactivate_clears_state() {
        let monitor = monitor();
        monitor.activate_emergency_stop("drill", "ops");
        assert!(monitor.deactivate_emergency_stop("ops"));
        assert!(!monitor.emergency_stop_active());
        assert!(monitor.emergency_stop().reason.is_none());
        // Deactivating an inactive stop is a no-op.
        assert!(!monitor.deactivate_emergency_stop("ops"));
    }

    #[test]
    fn emergency_stop_blocks_can_start() {
        let monitor = monitor();
        assert!(monitor.can_start_operation());
        monitor.activate_emergency_stop("drill", "ops");
        assert!(!monitor.can_start_operation());
    }

    // -- concurrency gate -----------------------------------------------------

    #[test]
    fn slots_enforce_ceiling_exactly() {
        let monitor = monitor();
        let max = monitor.limits().max_concurrent_operations;

        for _ in 0..max {
            assert!(monitor.start_operation());
        }
        // Ceiling reached: reservation fails with no state change.
        assert!(!monitor.start_operation());
        assert_eq!(monitor.active_operations(), max);

        monitor.stop_operation();
        assert!(monitor.start_operation());
    }

    #[test]
    fn stop_operation_never_underflows() {
        let monitor = monitor();
        monitor.stop_operation();
        assert_eq!(monitor.active_operations(), 0);
    }

    #[test]
    fn limits_update_applies_to_gate() {
        let monitor = monitor();
        let mut limits = monitor.limits();
        limits.max_concurrent_operations = 1;
        monitor.set_limits(limits).unwrap();

        assert!(monitor.start_operation());
        assert!(!monitor.start_operation());
    }

    #[test]
    fn invalid_limits_rejected() {
        let monitor = monitor();
        let mut limits = monitor.limits();
        limits.max_failure_rate_pct = 0;
        assert!(monitor.set_limits(limits).is_err());
    }

    // -- failure tracking -----------------------------------------------------

    #[test]
    fn failure_rate_breach_needs_min_samples() {
        let monitor = monitor();
        let op = Uuid::now_v7();
        // Three failures out of three: still under the sample floor.
        assert!(!monitor.record_item_outcome(op, true));
        assert!(!monitor.record_item_outcome(op, true));
        assert!(!monitor.record_item_outcome(op, true));
    }

    #[test]
    fn failure_rate_breach_fires_over_ceiling() {
        let monitor = monitor();
        let op = Uuid::now_v7();
        // 25% ceiling; 3 failures in 6 items = 50%.
        for _ in 0..3 {
            monitor.record_item_outcome(op, false);
        }
        monitor.record_item_outcome(op, true);
        monitor.record_item_outcome(op, true);
        assert!(monitor.record_item_outcome(op, true));
    }

    #[test]
    fn successes_dilute_the_window() {
        let monitor = monitor();
        let op = Uuid::now_v7();
        monitor.record_item_outcome(op, true);
        for _ in 0..(FAILURE_WINDOW - 1) {
            assert!(!monitor.record_item_outcome(op, false));
        }
        // The old failure scrolled out of the window.
        assert!(!monitor.record_item_outcome(op, false));
    }

    #[test]
    fn windows_are_per_operation() {
        let monitor = monitor();
        let noisy = Uuid::now_v7();
        let quiet = Uuid::now_v7();
        for _ in 0..6 {
            monitor.track_failure(noisy, "boom");
        }
        assert!(!monitor.record_item_outcome(quiet, false));
    }

    #[test]
    fn clear_operation_resets_window() {
        let monitor = monitor();
        let op = Uuid::now_v7();
        for _ in 0..6 {
            monitor.track_failure(op, "boom");
        }
        monitor.clear_operation(op);
        assert!(!monitor.record_item_outcome(op, true));
    }
}
