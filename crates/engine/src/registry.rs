//! Runtime representation of batch operations and the process-wide
//! operation registry.
//!
//! The registry is an owned value injected by reference into the
//! orchestrator and the API layer; tests construct a fresh one per case.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use lexigen_core::item::{ItemState, WorkItem};
use lexigen_core::operation::{OperationSpec, OperationState, ResolvedCostLimits};
use lexigen_core::types::{micros_to_usd, MicroUsd, TermId, Timestamp};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleSnapshot {
    pub state: OperationState,
    /// Why the operation is in its current state (pause/cancel/fail reason).
    pub state_reason: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Item counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ItemCounts {
    pub total: u32,
    pub queued: u32,
    pub in_progress: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl ItemCounts {
    /// Items that reached a terminal state.
    pub fn processed(&self) -> u32 {
        self.succeeded + self.failed + self.skipped
    }
}

// ---------------------------------------------------------------------------
// OperationRuntime
// ---------------------------------------------------------------------------

/// One batch operation's live state: lifecycle, work items, cost counter,
/// and cancellation token. Owned by the registry, shared with the driver
/// task via `Arc`.
pub struct OperationRuntime {
    pub id: Uuid,
    pub spec: OperationSpec,
    pub limits: ResolvedCostLimits,
    lifecycle: Mutex<LifecycleSnapshot>,
    items: Mutex<Vec<WorkItem>>,
    cost: AtomicI64,
    /// Last processed-percentage reported for milestone bookkeeping.
    last_pct: AtomicU32,
    /// Whether this operation currently holds a safety-monitor slot.
    slot_held: AtomicBool,
    /// Driver generation. Bumped on every (re)start of the worker pool so
    /// workers from a superseded pool stop at their next checkpoint.
    epoch: AtomicU32,
    cancel: CancellationToken,
}

impl OperationRuntime {
    pub fn new(spec: OperationSpec, limits: ResolvedCostLimits, term_ids: Vec<TermId>) -> Arc<Self> {
        let section = spec.section.clone();
        let items = term_ids
            .into_iter()
            .map(|id| WorkItem::new(id, section.clone()))
            .collect();

        Arc::new(Self {
            id: Uuid::now_v7(),
            spec,
            limits,
            lifecycle: Mutex::new(LifecycleSnapshot {
                state: OperationState::Pending,
                state_reason: None,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
            }),
            items: Mutex::new(items),
            cost: AtomicI64::new(0),
            last_pct: AtomicU32::new(0),
            slot_held: AtomicBool::new(false),
            epoch: AtomicU32::new(0),
            cancel: CancellationToken::new(),
        })
    }

    // -- lifecycle ------------------------------------------------------------

    pub fn state(&self) -> OperationState {
        self.lifecycle.lock().unwrap().state
    }

    pub fn lifecycle(&self) -> LifecycleSnapshot {
        self.lifecycle.lock().unwrap().clone()
    }

    /// Attempt a state transition. Returns false (no-op, not an error) when
    /// the transition is invalid from the current state, so callers can
    /// distinguish a no-op from genuine action.
    pub fn transition(&self, to: OperationState, reason: &str) -> bool {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if !lifecycle.state.can_transition(to) {
            return false;
        }
        tracing::info!(
            operation_id = %self.id,
            from = lifecycle.state.as_str(),
            to = to.as_str(),
            reason,
            "Operation state transition",
        );
        lifecycle.state = to;
        lifecycle.state_reason = (!reason.is_empty()).then(|| reason.to_string());
        let now = Utc::now();
        if to == OperationState::Running && lifecycle.started_at.is_none() {
            lifecycle.started_at = Some(now);
        }
        if to.is_terminal() {
            lifecycle.finished_at = Some(now);
        }
        true
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // -- items ----------------------------------------------------------------

    /// Claim the first queued item, marking it in-progress. Items are
    /// claimed in enumeration order; a retried item keeps its position.
    pub fn claim_next_queued(&self) -> Option<(usize, TermId)> {
        let mut items = self.items.lock().unwrap();
        for (idx, item) in items.iter_mut().enumerate() {
            if item.state == ItemState::Queued {
                // start() cannot fail on a queued item.
                item.start().ok()?;
                return Some((idx, item.term_id));
            }
        }
        None
    }

    /// Run `f` against one item under the items lock.
    pub fn with_item<R>(&self, idx: usize, f: impl FnOnce(&mut WorkItem) -> R) -> R {
        let mut items = self.items.lock().unwrap();
        f(&mut items[idx])
    }

    pub fn items_snapshot(&self) -> Vec<WorkItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn counts(&self) -> ItemCounts {
        let items = self.items.lock().unwrap();
        let mut counts = ItemCounts {
            total: items.len() as u32,
            queued: 0,
            in_progress: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };
        for item in items.iter() {
            match item.state {
                ItemState::Queued => counts.queued += 1,
                ItemState::InProgress => counts.in_progress += 1,
                ItemState::Succeeded => counts.succeeded += 1,
                ItemState::Failed => counts.failed += 1,
                ItemState::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn all_items_terminal(&self) -> bool {
        self.items
            .lock()
            .unwrap()
            .iter()
            .all(|i| i.state.is_terminal())
    }

    /// Discard all still-queued items (cancellation). Returns the count.
    pub fn skip_queued(&self) -> usize {
        let mut items = self.items.lock().unwrap();
        let mut skipped = 0;
        for item in items.iter_mut() {
            if item.state == ItemState::Queued && item.skip().is_ok() {
                skipped += 1;
            }
        }
        skipped
    }

    // -- cost -----------------------------------------------------------------

    /// Add realized cost; returns the new cumulative total.
    pub fn add_cost(&self, delta: MicroUsd) -> MicroUsd {
        self.cost.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn total_cost(&self) -> MicroUsd {
        self.cost.load(Ordering::SeqCst)
    }

    // -- milestone bookkeeping ------------------------------------------------

    /// Swap in the latest processed percentage, returning the previous one.
    pub fn swap_progress_pct(&self, new_pct: u8) -> u8 {
        self.last_pct.swap(new_pct as u32, Ordering::SeqCst) as u8
    }

    // -- driver epoch ---------------------------------------------------------

    /// Start a new driver generation, invalidating workers of any previous
    /// pool. Returns the new epoch.
    pub fn begin_epoch(&self) -> u32 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_epoch(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }

    // -- concurrency slot -----------------------------------------------------

    pub fn mark_slot_held(&self) {
        self.slot_held.store(true, Ordering::SeqCst);
    }

    /// Clear the slot flag; returns true if this call cleared it, so the
    /// safety-monitor release happens exactly once.
    pub fn take_slot(&self) -> bool {
        self.slot_held.swap(false, Ordering::SeqCst)
    }

    // -- views ----------------------------------------------------------------

    pub fn view(&self) -> OperationView {
        let lifecycle = self.lifecycle();
        let counts = self.counts();
        OperationView {
            id: self.id,
            section: self.spec.section.clone(),
            state: lifecycle.state,
            state_reason: lifecycle.state_reason,
            model: self.spec.processing.model.clone(),
            items: counts,
            cost_usd: micros_to_usd(self.total_cost()),
            initiated_by: self.spec.meta.initiated_by.clone(),
            tags: self.spec.meta.tags.clone(),
            created_at: lifecycle.created_at,
            started_at: lifecycle.started_at,
            finished_at: lifecycle.finished_at,
        }
    }
}

/// Read-model of an operation for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct OperationView {
    pub id: Uuid,
    pub section: String,
    pub state: OperationState,
    pub state_reason: Option<String>,
    pub model: String,
    pub items: ItemCounts,
    pub cost_usd: f64,
    pub initiated_by: String,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Process-wide map of operations, preserving creation order for listings.
#[derive(Default)]
pub struct OperationRegistry {
    ops: RwLock<HashMap<Uuid, Arc<OperationRuntime>>>,
    order: Mutex<Vec<Uuid>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, runtime: Arc<OperationRuntime>) {
        self.order.lock().unwrap().push(runtime.id);
        self.ops.write().unwrap().insert(runtime.id, runtime);
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<OperationRuntime>> {
        self.ops.read().unwrap().get(&id).cloned()
    }

    /// All operations in creation order, optionally filtered by state.
    pub fn list(&self, state: Option<OperationState>) -> Vec<Arc<OperationRuntime>> {
        let ops = self.ops.read().unwrap();
        self.order
            .lock()
            .unwrap()
            .iter()
            .filter_map(|id| ops.get(id).cloned())
            .filter(|op| state.is_none_or(|s| op.state() == s))
            .collect()
    }

    /// Operations that are not in a terminal state.
    pub fn active(&self) -> Vec<Arc<OperationRuntime>> {
        self.list(None)
            .into_iter()
            .filter(|op| !op.state().is_terminal())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ops.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
