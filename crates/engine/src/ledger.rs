//! Cost ledger: per-operation spend, named period budgets, and read-only
//! analytics.
//!
//! Budget counters are atomic integers (micro-USD); concurrent operations
//! never lose updates. Warning alerts are idempotent per threshold
//! crossing: a counter that resets at a period boundary and climbs past
//! the threshold again raises a new alert.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use lexigen_core::alert::{Alert, AlertKind};
use lexigen_core::cost::{warning_crossed, BudgetPeriod};
use lexigen_core::error::CoreError;
use lexigen_core::types::{micros_to_usd, MicroUsd, Timestamp};
use serde::Serialize;
use uuid::Uuid;

use crate::alerts::AlertRegistry;

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

/// Default warning threshold for budgets created without one.
const DEFAULT_BUDGET_WARNING_PCT: u8 = 80;

struct BudgetState {
    name: String,
    period: BudgetPeriod,
    limit: MicroUsd,
    warning_threshold_pct: u8,
    spent: AtomicI64,
    /// An instant inside the period the `spent` counter covers.
    anchor: Mutex<Timestamp>,
}

impl BudgetState {
    /// Reset the counter when `now` has left the anchored period.
    ///
    /// Caller must hold no other budget lock; the anchor mutex serializes
    /// rollover against concurrent additions.
    fn roll_if_needed(&self, now: Timestamp) {
        let mut anchor = self.anchor.lock().unwrap();
        if !self.period.same_period(*anchor, now) {
            self.spent.store(0, Ordering::SeqCst);
            *anchor = now;
        }
    }

    /// Add spend; returns true when the warning threshold was crossed by
    /// this addition.
    fn add(&self, cost: MicroUsd, now: Timestamp) -> bool {
        // Hold the anchor lock across the add so a rollover cannot
        // interleave between the reset and the increment.
        let mut anchor = self.anchor.lock().unwrap();
        if !self.period.same_period(*anchor, now) {
            self.spent.store(0, Ordering::SeqCst);
            *anchor = now;
        }
        let prev = self.spent.fetch_add(cost, Ordering::SeqCst);
        warning_crossed(prev, prev + cost, self.limit, self.warning_threshold_pct)
    }

    fn spent_now(&self, now: Timestamp) -> MicroUsd {
        self.roll_if_needed(now);
        self.spent.load(Ordering::SeqCst)
    }
}

/// Read-model of a budget for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetView {
    pub name: String,
    pub period: BudgetPeriod,
    pub limit_usd: f64,
    pub spent_usd: f64,
    pub remaining_usd: f64,
    pub warning_threshold_pct: u8,
}

// ---------------------------------------------------------------------------
// Cost entries
// ---------------------------------------------------------------------------

/// One recorded `track_cost` call; the analytics source of truth.
#[derive(Debug, Clone)]
struct CostEntry {
    at: Timestamp,
    operation_id: Uuid,
    model: String,
    cost: MicroUsd,
}

/// Optional filters for [`CostLedger::analytics`].
#[derive(Debug, Clone, Default)]
pub struct AnalyticsFilter {
    pub operation_id: Option<Uuid>,
    pub model: Option<String>,
}

/// Read-only aggregation over a time range.
#[derive(Debug, Clone, Serialize)]
pub struct CostAnalytics {
    pub total_cost_usd: f64,
    pub call_count: usize,
    /// Cost by model, highest first.
    pub by_model: Vec<(String, f64)>,
    /// Cost by operation, highest first.
    pub by_operation: Vec<(Uuid, f64)>,
}

// ---------------------------------------------------------------------------
// CostLedger
// ---------------------------------------------------------------------------

/// Tracks spend against budgets, independent of scheduling.
pub struct CostLedger {
    budgets: Mutex<Vec<Arc<BudgetState>>>,
    entries: Mutex<Vec<CostEntry>>,
    op_totals: Mutex<HashMap<Uuid, MicroUsd>>,
    alerts: Arc<AlertRegistry>,
}

impl CostLedger {
    pub fn new(alerts: Arc<AlertRegistry>) -> Self {
        Self {
            budgets: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
            op_totals: Mutex::new(HashMap::new()),
            alerts,
        }
    }

    // -- budgets --------------------------------------------------------------

    /// Create a named budget. Names are unique.
    pub fn create_budget(
        &self,
        name: &str,
        period: BudgetPeriod,
        limit: MicroUsd,
        warning_threshold_pct: Option<u8>,
    ) -> Result<(), CoreError> {
        if name.is_empty() {
            return Err(CoreError::Validation(
                "budget name must not be empty".to_string(),
            ));
        }
        if limit <= 0 {
            return Err(CoreError::Validation(
                "budget limit must be positive".to_string(),
            ));
        }
        let pct = warning_threshold_pct.unwrap_or(DEFAULT_BUDGET_WARNING_PCT);
        if pct == 0 || pct > 100 {
            return Err(CoreError::Validation(
                "warning_threshold_pct must be between 1 and 100".to_string(),
            ));
        }

        let mut budgets = self.budgets.lock().unwrap();
        if budgets.iter().any(|b| b.name == name) {
            return Err(CoreError::Conflict(format!(
                "Budget '{name}' already exists"
            )));
        }
        budgets.push(Arc::new(BudgetState {
            name: name.to_string(),
            period,
            limit,
            warning_threshold_pct: pct,
            spent: AtomicI64::new(0),
            anchor: Mutex::new(Utc::now()),
        }));

        tracing::info!(
            budget = name,
            period = period.as_str(),
            limit_usd = micros_to_usd(limit),
            "Budget created",
        );
        Ok(())
    }

    /// All budgets with current-period spend.
    pub fn list_budgets(&self) -> Vec<BudgetView> {
        let now = Utc::now();
        self.budgets
            .lock()
            .unwrap()
            .iter()
            .map(|b| {
                let spent = b.spent_now(now);
                BudgetView {
                    name: b.name.clone(),
                    period: b.period,
                    limit_usd: micros_to_usd(b.limit),
                    spent_usd: micros_to_usd(spent),
                    remaining_usd: micros_to_usd((b.limit - spent).max(0)),
                    warning_threshold_pct: b.warning_threshold_pct,
                }
            })
            .collect()
    }

    /// The budget (name, seconds-to-rollover) that cannot absorb
    /// `estimated_cost`, if any. Used by admission control.
    pub fn budget_shortfall(&self, estimated_cost: MicroUsd) -> Option<(String, Option<i64>)> {
        let now = Utc::now();
        let budgets = self.budgets.lock().unwrap();
        for b in budgets.iter() {
            let remaining = b.limit - b.spent_now(now);
            if estimated_cost > remaining {
                return Some((b.name.clone(), b.period.secs_until_rollover(now)));
            }
        }
        None
    }

    // -- recording ------------------------------------------------------------

    /// Record one item's realized cost: adds to the operation's running
    /// total and to every budget whose period contains now. Raises one
    /// `cost_warning` alert per threshold crossing.
    pub fn track_cost(&self, operation_id: Uuid, model: &str, cost: MicroUsd) {
        let now = Utc::now();

        self.entries.lock().unwrap().push(CostEntry {
            at: now,
            operation_id,
            model: model.to_string(),
            cost,
        });
        *self
            .op_totals
            .lock()
            .unwrap()
            .entry(operation_id)
            .or_insert(0) += cost;

        let crossed: Vec<Arc<BudgetState>> = {
            let budgets = self.budgets.lock().unwrap();
            budgets
                .iter()
                .filter(|b| b.add(cost, now))
                .cloned()
                .collect()
        };

        for budget in crossed {
            self.alerts.raise(
                Alert::new(
                    AlertKind::CostWarning,
                    format!(
                        "Budget '{}' crossed {}% of its ${:.2} limit",
                        budget.name,
                        budget.warning_threshold_pct,
                        micros_to_usd(budget.limit),
                    ),
                )
                .for_operation(operation_id),
            );
        }
    }

    /// An operation's cumulative recorded cost.
    pub fn operation_total(&self, operation_id: Uuid) -> MicroUsd {
        self.op_totals
            .lock()
            .unwrap()
            .get(&operation_id)
            .copied()
            .unwrap_or(0)
    }

    // -- read-only aggregation ------------------------------------------------

    /// System-wide spend within the period containing `now`.
    pub fn spend_in_period(&self, period: BudgetPeriod, now: Timestamp) -> MicroUsd {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| period.same_period(e.at, now))
            .map(|e| e.cost)
            .sum()
    }

    /// Aggregate recorded costs over `[start, end]`, optionally filtered
    /// by operation and/or model. Tolerant of an empty result set:
    /// returns zeroed structures, never errors.
    pub fn analytics(
        &self,
        start: Timestamp,
        end: Timestamp,
        filter: &AnalyticsFilter,
    ) -> CostAnalytics {
        let entries = self.entries.lock().unwrap();
        let in_range: Vec<&CostEntry> = entries
            .iter()
            .filter(|e| e.at >= start && e.at <= end)
            .filter(|e| filter.operation_id.is_none_or(|id| e.operation_id == id))
            .filter(|e| {
                filter
                    .model
                    .as_deref()
                    .is_none_or(|model| e.model == model)
            })
            .collect();

        let total: MicroUsd = in_range.iter().map(|e| e.cost).sum();

        let mut by_model: HashMap<&str, MicroUsd> = HashMap::new();
        let mut by_operation: HashMap<Uuid, MicroUsd> = HashMap::new();
        for e in &in_range {
            *by_model.entry(e.model.as_str()).or_insert(0) += e.cost;
            *by_operation.entry(e.operation_id).or_insert(0) += e.cost;
        }

        let mut by_model: Vec<(String, f64)> = by_model
            .into_iter()
            .map(|(m, c)| (m.to_string(), micros_to_usd(c)))
            .collect();
        by_model.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut by_operation: Vec<(Uuid, f64)> = by_operation
            .into_iter()
            .map(|(id, c)| (id, micros_to_usd(c)))
            .collect();
        by_operation.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        CostAnalytics {
            total_cost_usd: micros_to_usd(total),
            call_count: in_range.len(),
            by_model,
            by_operation,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lexigen_events::EventBus;

    fn ledger() -> CostLedger {
        CostLedger::new(Arc::new(AlertRegistry::new(Arc::new(EventBus::default()))))
    }

    fn ledger_with_alerts() -> (CostLedger, Arc<AlertRegistry>) {
        let alerts = Arc::new(AlertRegistry::new(Arc::new(EventBus::default())));
        (CostLedger::new(Arc::clone(&alerts)), alerts)
    }

    // -- budgets --------------------------------------------------------------

    #[test]
    fn duplicate_budget_name_rejected() {
        let ledger = ledger();
        ledger
            .create_budget("daily-ops", BudgetPeriod::Daily, 1_000_000, None)
            .unwrap();
        let err = ledger
            .create_budget("daily-ops", BudgetPeriod::Daily, 2_000_000, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn non_positive_limit_rejected() {
        let ledger = ledger();
        assert!(ledger
            .create_budget("bad", BudgetPeriod::Daily, 0, None)
            .is_err());
    }

    #[test]
    fn budget_view_tracks_spend() {
        let ledger = ledger();
        ledger
            .create_budget("total", BudgetPeriod::Total, 10_000_000, None)
            .unwrap();
        ledger.track_cost(Uuid::now_v7(), "gpt-4o-mini", 1_500_000);

        let views = ledger.list_budgets();
        assert_eq!(views.len(), 1);
        assert!((views[0].spent_usd - 1.5).abs() < 1e-9);
        assert!((views[0].remaining_usd - 8.5).abs() < 1e-9);
    }

    #[test]
    fn budget_shortfall_detects_exhaustion() {
        let ledger = ledger();
        ledger
            .create_budget("total", BudgetPeriod::Total, 1_000_000, None)
            .unwrap();
        assert!(ledger.budget_shortfall(500_000).is_none());
        assert!(ledger.budget_shortfall(1_500_000).is_some());

        ledger.track_cost(Uuid::now_v7(), "gpt-4o-mini", 900_000);
        let (name, wait) = ledger.budget_shortfall(500_000).unwrap();
        assert_eq!(name, "total");
        // A total budget never rolls over, so there is no advisory wait.
        assert!(wait.is_none());
    }

    // -- warning alerts -------------------------------------------------------

    #[test]
    fn warning_alert_fires_once_per_crossing() {
        let (ledger, alerts) = ledger_with_alerts();
        ledger
            .create_budget("total", BudgetPeriod::Total, 10_000_000, Some(80))
            .unwrap();
        let op = Uuid::now_v7();

        // 0 -> 7M: below the 8M level, no alert.
        ledger.track_cost(op, "gpt-4o-mini", 7_000_000);
        assert_eq!(alerts.list(None).len(), 0);

        // 7M -> 8.5M: crossing, one alert.
        ledger.track_cost(op, "gpt-4o-mini", 1_500_000);
        assert_eq!(alerts.list(None).len(), 1);

        // Already above: no re-alert.
        ledger.track_cost(op, "gpt-4o-mini", 500_000);
        assert_eq!(alerts.list(None).len(), 1);
    }

    // -- totals and analytics -------------------------------------------------

    #[test]
    fn operation_totals_accumulate() {
        let ledger = ledger();
        let op = Uuid::now_v7();
        ledger.track_cost(op, "gpt-4o-mini", 100);
        ledger.track_cost(op, "gpt-4o-mini", 250);
        assert_eq!(ledger.operation_total(op), 350);
        assert_eq!(ledger.operation_total(Uuid::now_v7()), 0);
    }

    #[test]
    fn sum_of_recorded_costs_is_preserved() {
        let ledger = ledger();
        let ops: Vec<Uuid> = (0..4).map(|_| Uuid::now_v7()).collect();
        for (i, op) in ops.iter().enumerate() {
            ledger.track_cost(*op, "gpt-4o-mini", (i as i64 + 1) * 1_000);
        }
        let now = Utc::now();
        assert_eq!(ledger.spend_in_period(BudgetPeriod::Total, now), 10_000);
    }

    #[test]
    fn analytics_empty_range_is_zeroed() {
        let ledger = ledger();
        let now = Utc::now();
        let analytics = ledger.analytics(
            now - chrono::Duration::hours(2),
            now,
            &AnalyticsFilter::default(),
        );
        assert_eq!(analytics.total_cost_usd, 0.0);
        assert_eq!(analytics.call_count, 0);
        assert!(analytics.by_model.is_empty());
        assert!(analytics.by_operation.is_empty());
    }

    #[test]
    fn analytics_groups_by_model_and_operation() {
        let ledger = ledger();
        let op_a = Uuid::now_v7();
        let op_b = Uuid::now_v7();
        ledger.track_cost(op_a, "gpt-4o-mini", 1_000_000);
        ledger.track_cost(op_a, "gpt-4o", 3_000_000);
        ledger.track_cost(op_b, "gpt-4o-mini", 2_000_000);

        let now = Utc::now();
        let start = now - chrono::Duration::hours(1);
        let analytics = ledger.analytics(start, now, &AnalyticsFilter::default());
        assert_eq!(analytics.call_count, 3);
        assert!((analytics.total_cost_usd - 6.0).abs() < 1e-9);
        // Highest-spend model first.
        assert_eq!(analytics.by_model[0].0, "gpt-4o");
        assert_eq!(analytics.by_operation[0].0, op_a);
    }

    #[test]
    fn analytics_filters_by_operation_and_model() {
        let ledger = ledger();
        let op_a = Uuid::now_v7();
        let op_b = Uuid::now_v7();
        ledger.track_cost(op_a, "gpt-4o-mini", 1_000_000);
        ledger.track_cost(op_a, "gpt-4o", 3_000_000);
        ledger.track_cost(op_b, "gpt-4o-mini", 2_000_000);

        let now = Utc::now();
        let start = now - chrono::Duration::hours(1);

        let only_a = ledger.analytics(
            start,
            now,
            &AnalyticsFilter {
                operation_id: Some(op_a),
                model: None,
            },
        );
        assert_eq!(only_a.call_count, 2);
        assert!((only_a.total_cost_usd - 4.0).abs() < 1e-9);

        let only_mini = ledger.analytics(
            start,
            now,
            &AnalyticsFilter {
                operation_id: None,
                model: Some("gpt-4o-mini".to_string()),
            },
        );
        assert_eq!(only_mini.call_count, 2);
        assert!((only_mini.total_cost_usd - 3.0).abs() < 1e-9);
    }
}
