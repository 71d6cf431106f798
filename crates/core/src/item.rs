//! Per-item work units and the retry policy.
//!
//! Retry state is explicit data on the work item (`attempts`), not control
//! flow, so an item's position in the queue and its retry budget are both
//! inspectable at any point.

use serde::Serialize;

use crate::error::CoreError;
use crate::types::{MicroUsd, TermId, Timestamp};

// ---------------------------------------------------------------------------
// Item state
// ---------------------------------------------------------------------------

/// State of one `(term, section)` work unit within an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Skipped,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Succeeded, failed, and skipped items never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

// ---------------------------------------------------------------------------
// Work item
// ---------------------------------------------------------------------------

/// One term x section generation unit.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem {
    pub term_id: TermId,
    pub section: String,
    pub state: ItemState,
    /// Attempts made so far (0 until the first provider call).
    pub attempts: u32,
    /// When the next retry is due, while the item waits out a backoff.
    /// Explicit state rather than control flow, so a queued item's retry
    /// timer is inspectable.
    pub next_retry_at: Option<Timestamp>,
    pub last_error: Option<String>,
    /// Realized cost, recorded once on the transition out of `InProgress`.
    pub cost: MicroUsd,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl WorkItem {
    pub fn new(term_id: TermId, section: impl Into<String>) -> Self {
        Self {
            term_id,
            section: section.into(),
            state: ItemState::Queued,
            attempts: 0,
            next_retry_at: None,
            last_error: None,
            cost: 0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Claim the item for processing. Only a queued item can be claimed.
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.state != ItemState::Queued {
            return Err(CoreError::Conflict(format!(
                "Item for term {} is {}, not queued",
                self.term_id,
                self.state.as_str()
            )));
        }
        self.state = ItemState::InProgress;
        Ok(())
    }

    /// Record a successful generation. Terminal at most once.
    pub fn succeed(
        &mut self,
        cost: MicroUsd,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), CoreError> {
        self.ensure_in_progress()?;
        self.state = ItemState::Succeeded;
        self.next_retry_at = None;
        self.cost = cost;
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        Ok(())
    }

    /// Record a final failure after the retry budget is exhausted.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.ensure_in_progress()?;
        self.state = ItemState::Failed;
        self.next_retry_at = None;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Discard a queued item (operation cancelled before it was claimed).
    pub fn skip(&mut self) -> Result<(), CoreError> {
        if self.state != ItemState::Queued {
            return Err(CoreError::Conflict(format!(
                "Only queued items can be skipped; item for term {} is {}",
                self.term_id,
                self.state.as_str()
            )));
        }
        self.state = ItemState::Skipped;
        Ok(())
    }

    fn ensure_in_progress(&self) -> Result<(), CoreError> {
        if self.state != ItemState::InProgress {
            return Err(CoreError::Conflict(format!(
                "Item for term {} is {}, not in progress",
                self.term_id,
                self.state.as_str()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Default number of provider attempts per item.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base backoff delay before the second attempt.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Ceiling on a single backoff delay.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Bounded exponential backoff for item retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after `failed_attempts` failures:
    /// `base * 2^(failed_attempts - 1)`, capped at `max_delay_ms`.
    pub fn delay_ms(&self, failed_attempts: u32) -> u64 {
        if failed_attempts == 0 {
            return 0;
        }
        let exp = failed_attempts.saturating_sub(1).min(16);
        self.base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
