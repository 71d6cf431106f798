//! System-wide safety limits, failure-rate arithmetic, and admission
//! denial reasons.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::MicroUsd;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Rolling window of recent item outcomes kept per operation.
pub const FAILURE_WINDOW: usize = 20;

/// Minimum number of observed outcomes before the failure rate is
/// considered statistically significant. Below this, no breach is reported
/// regardless of the rate.
pub const MIN_FAILURE_SAMPLES: usize = 5;

// ---------------------------------------------------------------------------
// Safety limits
// ---------------------------------------------------------------------------

/// System-wide ceilings enforced by the safety monitor. Mutable by an
/// operator; reads always see the latest value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Ceiling on simultaneously running operations.
    pub max_concurrent_operations: u32,
    /// Ceiling on system-wide spend per calendar day (micro-USD).
    pub max_daily_spend: MicroUsd,
    /// Ceiling on system-wide spend per calendar month (micro-USD).
    pub max_monthly_spend: MicroUsd,
    /// Failure-rate percentage above which an operation is auto-paused.
    pub max_failure_rate_pct: u8,
    /// Ceiling on the item count of a single operation.
    pub max_items_per_operation: u32,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 3,
            max_daily_spend: 50_000_000,    // $50
            max_monthly_spend: 500_000_000, // $500
            max_failure_rate_pct: 25,
            max_items_per_operation: 1_000,
        }
    }
}

impl SafetyLimits {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrent_operations == 0 {
            return Err(CoreError::Validation(
                "max_concurrent_operations must be at least 1".to_string(),
            ));
        }
        if self.max_daily_spend <= 0 || self.max_monthly_spend <= 0 {
            return Err(CoreError::Validation(
                "spend ceilings must be positive".to_string(),
            ));
        }
        if self.max_failure_rate_pct == 0 || self.max_failure_rate_pct > 100 {
            return Err(CoreError::Validation(
                "max_failure_rate_pct must be between 1 and 100".to_string(),
            ));
        }
        if self.max_items_per_operation == 0 {
            return Err(CoreError::Validation(
                "max_items_per_operation must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Failure rate
// ---------------------------------------------------------------------------

/// Whether a rolling failure count breaches the configured ceiling.
///
/// Applies the [`MIN_FAILURE_SAMPLES`] guard: tiny samples never breach.
pub fn failure_rate_breached(failures: usize, total: usize, max_failure_rate_pct: u8) -> bool {
    if total < MIN_FAILURE_SAMPLES {
        return false;
    }
    failures * 100 > total * max_failure_rate_pct as usize
}

// ---------------------------------------------------------------------------
// Denial reasons
// ---------------------------------------------------------------------------

/// Why the admission controller refused a new operation, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The emergency stop is active; nothing starts until it is cleared.
    EmergencyStop,
    /// The system-wide concurrent-operation ceiling is reached.
    ConcurrencyCeiling,
    /// The estimated cost would push a budget or spend ceiling over its limit.
    BudgetExhausted,
    /// The requesting identity has no remaining rate-limit allowance.
    RateLimited,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmergencyStop => "emergency_stop",
            Self::ConcurrencyCeiling => "concurrency_ceiling",
            Self::BudgetExhausted => "budget_exhausted",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Human-readable message for the denial response.
    pub fn message(self) -> &'static str {
        match self {
            Self::EmergencyStop => "Emergency stop is active; new operations are blocked",
            Self::ConcurrencyCeiling => "Concurrent operation limit reached",
            Self::BudgetExhausted => "Estimated cost exceeds remaining budget",
            Self::RateLimited => "Operation rate limit reached for this user",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
