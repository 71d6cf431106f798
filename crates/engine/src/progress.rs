//! Progress tracker: append-only snapshot log per operation.
//!
//! A single driver writes for any given operation, so snapshots for one
//! operation are strictly ordered by recording time. History is never
//! rewritten.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use lexigen_core::progress::{compute_metrics, DetailedMetrics, ProgressSnapshot};
use uuid::Uuid;

/// Records append-only progress snapshots and serves derived metrics.
#[derive(Default)]
pub struct ProgressTracker {
    snapshots: Mutex<HashMap<Uuid, Vec<ProgressSnapshot>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot. History is never mutated.
    ///
    /// The recording timestamp is settled under the lock, and counters are
    /// clamped against the previous snapshot: concurrent workers may
    /// observe item counts out of order, but the log itself must stay
    /// monotonic (non-decreasing progress, strictly increasing time).
    pub fn record(&self, operation_id: Uuid, mut snapshot: ProgressSnapshot) {
        let mut snapshots = self.snapshots.lock().unwrap();
        let history = snapshots.entry(operation_id).or_default();

        snapshot.recorded_at = Utc::now();
        if let Some(last) = history.last() {
            if snapshot.recorded_at <= last.recorded_at {
                snapshot.recorded_at = last.recorded_at + chrono::Duration::nanoseconds(1);
            }
            snapshot.items_processed = snapshot.items_processed.max(last.items_processed);
            snapshot.cost = snapshot.cost.max(last.cost);
        }
        history.push(snapshot);
    }

    /// The latest snapshot, or `None` for operations that have not recorded
    /// anything yet ("no data yet").
    pub fn current(&self, operation_id: Uuid) -> Option<ProgressSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(&operation_id)
            .and_then(|s| s.last().cloned())
    }

    /// Full snapshot history in recording order.
    pub fn history(&self, operation_id: Uuid) -> Vec<ProgressSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(&operation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Derived throughput/ETA/health. Non-authoritative; observability only.
    pub fn detailed_metrics(&self, operation_id: Uuid) -> DetailedMetrics {
        let snapshots = self.history(operation_id);
        compute_metrics(&snapshots, Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lexigen_core::operation::OperationState;
    use lexigen_core::progress::HealthStatus;

    fn snapshot(processed: u32, total: u32) -> ProgressSnapshot {
        ProgressSnapshot {
            recorded_at: Utc::now(),
            items_processed: processed,
            items_total: total,
            cost: 0,
            avg_quality: None,
            state: OperationState::Running,
        }
    }

    #[test]
    fn no_data_yet_is_none() {
        let tracker = ProgressTracker::new();
        assert!(tracker.current(Uuid::now_v7()).is_none());
        assert!(tracker.history(Uuid::now_v7()).is_empty());
    }

    #[test]
    fn record_appends_in_order() {
        let tracker = ProgressTracker::new();
        let op = Uuid::now_v7();
        tracker.record(op, snapshot(1, 10));
        tracker.record(op, snapshot(2, 10));
        tracker.record(op, snapshot(3, 10));

        let history = tracker.history(op);
        assert_eq!(history.len(), 3);
        let processed: Vec<u32> = history.iter().map(|s| s.items_processed).collect();
        assert_eq!(processed, vec![1, 2, 3]);
        assert_eq!(tracker.current(op).unwrap().items_processed, 3);
    }

    #[test]
    fn snapshots_are_monotonic_in_processed_and_time() {
        let tracker = ProgressTracker::new();
        let op = Uuid::now_v7();
        for i in 0..5 {
            tracker.record(op, snapshot(i, 5));
        }
        let history = tracker.history(op);
        for pair in history.windows(2) {
            assert!(pair[1].items_processed >= pair[0].items_processed);
            assert!(pair[1].recorded_at > pair[0].recorded_at);
        }
    }

    #[test]
    fn operations_are_isolated() {
        let tracker = ProgressTracker::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        tracker.record(a, snapshot(1, 2));
        assert!(tracker.current(b).is_none());
        assert_eq!(tracker.current(a).unwrap().items_processed, 1);
    }

    #[test]
    fn fresh_snapshot_is_healthy() {
        let tracker = ProgressTracker::new();
        let op = Uuid::now_v7();
        tracker.record(op, snapshot(1, 10));
        let metrics = tracker.detailed_metrics(op);
        assert_eq!(metrics.health, HealthStatus::Healthy);
    }
}
