//! Progress snapshots and derived observability metrics.
//!
//! Snapshots are append-only records; throughput, ETA, and health are
//! derived, non-authoritative signals computed on read.

use serde::Serialize;

use crate::operation::OperationState;
use crate::types::{MicroUsd, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// An operation with no snapshot inside this window is classified stalled.
pub const STALL_WINDOW_SECS: i64 = 120;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One immutable progress record for an operation.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub recorded_at: Timestamp,
    pub items_processed: u32,
    pub items_total: u32,
    /// Cumulative realized cost at the time of the snapshot.
    pub cost: MicroUsd,
    /// Running average quality score, when quality scoring is enabled.
    pub avg_quality: Option<f64>,
    pub state: OperationState,
}

impl ProgressSnapshot {
    /// Processed percentage, 0-100. Zero-item operations report 100.
    pub fn percent_complete(&self) -> u8 {
        if self.items_total == 0 {
            return 100;
        }
        (self.items_processed as u64 * 100 / self.items_total as u64).min(100) as u8
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Derived liveness classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// A snapshot was recorded within the recent window.
    Healthy,
    /// No snapshot within the window while the operation is non-terminal.
    Stalled,
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

/// Throughput/ETA/health derived from an operation's snapshot history.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedMetrics {
    /// Items per minute over the observed history.
    pub throughput_per_min: f64,
    /// Seconds until completion at the current throughput, if computable.
    pub eta_secs: Option<u64>,
    pub health: HealthStatus,
}

/// Derive metrics from the snapshot history.
///
/// Throughput uses the first and latest snapshot; with fewer than two
/// snapshots (or no elapsed time) it is zero and the ETA is unknown.
/// Terminal operations are always healthy: a finished run is not stalled.
pub fn compute_metrics(snapshots: &[ProgressSnapshot], now: Timestamp) -> DetailedMetrics {
    let Some(latest) = snapshots.last() else {
        return DetailedMetrics {
            throughput_per_min: 0.0,
            eta_secs: None,
            health: HealthStatus::Stalled,
        };
    };

    let health = if latest.state.is_terminal()
        || (now - latest.recorded_at).num_seconds() <= STALL_WINDOW_SECS
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Stalled
    };

    let first = &snapshots[0];
    let elapsed_secs = (latest.recorded_at - first.recorded_at).num_seconds();
    let processed_delta = latest.items_processed.saturating_sub(first.items_processed);

    let throughput_per_min = if elapsed_secs > 0 {
        processed_delta as f64 * 60.0 / elapsed_secs as f64
    } else {
        0.0
    };

    let remaining = latest.items_total.saturating_sub(latest.items_processed);
    let eta_secs = if remaining == 0 {
        Some(0)
    } else if throughput_per_min > 0.0 {
        Some((remaining as f64 * 60.0 / throughput_per_min).ceil() as u64)
    } else {
        None
    };

    DetailedMetrics {
        throughput_per_min,
        eta_secs,
        health,
    }
}

// ---------------------------------------------------------------------------
// Milestones
// ---------------------------------------------------------------------------

/// Milestone percentages crossed by moving from `prev_pct` to `new_pct`.
///
/// Returned in ascending order; each milestone is reported once per
/// crossing because the caller advances `prev_pct` monotonically.
pub fn milestones_crossed(prev_pct: u8, new_pct: u8, milestones: &[u8]) -> Vec<u8> {
    let mut crossed: Vec<u8> = milestones
        .iter()
        .copied()
        .filter(|m| prev_pct < *m && new_pct >= *m)
        .collect();
    crossed.sort_unstable();
    crossed.dedup();
    crossed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
