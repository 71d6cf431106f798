//! Admission controller: the policy gate in front of `start`.
//!
//! [`check_permission`](AdmissionController::check_permission) is a pure
//! decision function with no side effects; recording an admitted start is
//! a separate call made by the orchestrator after the operation is created.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use lexigen_core::cost::BudgetPeriod;
use lexigen_core::safety::DenialReason;
use lexigen_core::types::{MicroUsd, Timestamp};
use serde::Serialize;

use crate::ledger::CostLedger;
use crate::safety::SafetyMonitor;

// ---------------------------------------------------------------------------
// Advisory wait times
// ---------------------------------------------------------------------------

/// Suggested wait when the concurrency ceiling is the binding constraint.
const CONCURRENCY_WAIT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Request / decision
// ---------------------------------------------------------------------------

/// What a prospective operation asks the gate.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub section: String,
    pub term_count: u32,
    pub estimated_cost: MicroUsd,
    pub estimated_duration_secs: f64,
}

/// The gate's answer. `wait_secs` is advisory: an estimate of when the
/// binding constraint clears, never a guarantee.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<DenialReason>,
    pub message: Option<String>,
    pub wait_secs: Option<u64>,
}

impl AdmissionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
            wait_secs: None,
        }
    }

    fn deny(reason: DenialReason, wait_secs: Option<u64>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            message: Some(reason.message().to_string()),
            wait_secs,
        }
    }

    /// Denial used when a concurrency-slot reservation loses a race after a
    /// positive permission check.
    pub(crate) fn concurrency_denied() -> Self {
        Self::deny(DenialReason::ConcurrencyCeiling, Some(CONCURRENCY_WAIT_SECS))
    }
}

// ---------------------------------------------------------------------------
// Per-identity throttle
// ---------------------------------------------------------------------------

/// Optional per-identity start throttle.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_starts: u32,
    pub window_secs: u64,
}

// ---------------------------------------------------------------------------
// AdmissionController
// ---------------------------------------------------------------------------

/// Thin policy layer over the safety monitor and cost ledger.
pub struct AdmissionController {
    safety: Arc<SafetyMonitor>,
    ledger: Arc<CostLedger>,
    rate_limit: Option<RateLimitPolicy>,
    recent_starts: Mutex<HashMap<String, VecDeque<Timestamp>>>,
}

impl AdmissionController {
    pub fn new(
        safety: Arc<SafetyMonitor>,
        ledger: Arc<CostLedger>,
        rate_limit: Option<RateLimitPolicy>,
    ) -> Self {
        Self {
            safety,
            ledger,
            rate_limit,
            recent_starts: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether `user_id` may start the described operation.
    ///
    /// Pure: performs no state change. Denial reasons are evaluated in
    /// priority order: emergency stop, concurrency ceiling, budget
    /// headroom, per-identity throttle.
    pub fn check_permission(&self, user_id: &str, request: &AdmissionRequest) -> AdmissionDecision {
        if self.safety.emergency_stop_active() {
            return AdmissionDecision::deny(DenialReason::EmergencyStop, None);
        }

        let limits = self.safety.limits();
        if self.safety.active_operations() >= limits.max_concurrent_operations {
            return AdmissionDecision::deny(
                DenialReason::ConcurrencyCeiling,
                Some(CONCURRENCY_WAIT_SECS),
            );
        }

        // Budget headroom: named budgets first, then the system-wide
        // daily/monthly spend ceilings.
        if let Some((name, rollover)) = self.ledger.budget_shortfall(request.estimated_cost) {
            let mut decision = AdmissionDecision::deny(
                DenialReason::BudgetExhausted,
                rollover.map(|s| s.max(0) as u64),
            );
            decision.message = Some(format!(
                "Estimated cost exceeds remaining budget '{name}'"
            ));
            return decision;
        }
        let now = Utc::now();
        let daily_spent = self.ledger.spend_in_period(BudgetPeriod::Daily, now);
        if daily_spent + request.estimated_cost > limits.max_daily_spend {
            let wait = BudgetPeriod::Daily
                .secs_until_rollover(now)
                .map(|s| s.max(0) as u64);
            return AdmissionDecision::deny(DenialReason::BudgetExhausted, wait);
        }
        let monthly_spent = self.ledger.spend_in_period(BudgetPeriod::Monthly, now);
        if monthly_spent + request.estimated_cost > limits.max_monthly_spend {
            let wait = BudgetPeriod::Monthly
                .secs_until_rollover(now)
                .map(|s| s.max(0) as u64);
            return AdmissionDecision::deny(DenialReason::BudgetExhausted, wait);
        }

        if let Some(policy) = self.rate_limit {
            if let Some(wait) = self.throttle_wait(user_id, policy, now) {
                return AdmissionDecision::deny(DenialReason::RateLimited, Some(wait));
            }
        }

        AdmissionDecision::allow()
    }

    /// Record an admitted start for the per-identity throttle.
    pub fn note_start(&self, user_id: &str) {
        if self.rate_limit.is_none() {
            return;
        }
        self.recent_starts
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push_back(Utc::now());
    }

    /// Seconds until the identity regains an allowance, if currently over.
    fn throttle_wait(
        &self,
        user_id: &str,
        policy: RateLimitPolicy,
        now: Timestamp,
    ) -> Option<u64> {
        let mut recent = self.recent_starts.lock().unwrap();
        let Some(starts) = recent.get_mut(user_id) else {
            return None;
        };

        let window = chrono::Duration::seconds(policy.window_secs as i64);
        while let Some(front) = starts.front() {
            if now - *front > window {
                starts.pop_front();
            } else {
                break;
            }
        }

        if (starts.len() as u32) < policy.max_starts {
            return None;
        }
        starts
            .front()
            .map(|oldest| ((*oldest + window) - now).num_seconds().max(0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
