//! Batch operation lifecycle state machine, configuration types, and
//! validation.
//!
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the engine and the API layer without duplication.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::selection::SelectionCriteria;
use crate::types::MicroUsd;

// ---------------------------------------------------------------------------
// Processing bounds
// ---------------------------------------------------------------------------

/// Minimum number of items dispatched per scheduling round.
pub const MIN_BATCH_SIZE: u32 = 1;
/// Maximum number of items dispatched per scheduling round.
pub const MAX_BATCH_SIZE: u32 = 200;

/// Minimum number of concurrent item workers per operation.
pub const MIN_CONCURRENT_WORKERS: u32 = 1;
/// Maximum number of concurrent item workers per operation.
pub const MAX_CONCURRENT_WORKERS: u32 = 5;

/// Inclusive sampling temperature range accepted by the provider.
pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 2.0;

/// Hard ceiling on the per-call completion budget.
pub const MAX_MAX_TOKENS: u32 = 32_768;

/// Maximum length of a single metadata tag.
const MAX_TAG_LEN: usize = 64;
/// Maximum number of tags on one operation.
const MAX_TAGS: usize = 16;

// ---------------------------------------------------------------------------
// Default cost limits
// ---------------------------------------------------------------------------

/// Default ceiling on an operation's cumulative cost when the request does
/// not carry one (micro-USD): $25.00.
pub const DEFAULT_MAX_TOTAL_COST: MicroUsd = 25_000_000;

/// Default ceiling on a single item's realized cost (micro-USD): $0.50.
pub const DEFAULT_MAX_COST_PER_TERM: MicroUsd = 500_000;

/// Default warning threshold as a percentage of the total-cost ceiling.
pub const DEFAULT_WARNING_THRESHOLD_PCT: u8 = 80;

// ---------------------------------------------------------------------------
// Lifecycle state machine
// ---------------------------------------------------------------------------

/// Lifecycle state of a batch operation.
///
/// Transitions are monotonic: an operation never re-enters `Pending`, and
/// the three terminal states have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Created and admitted, items not yet being processed.
    Pending,
    /// Item workers are actively pulling work.
    Running,
    /// Suspended by an operator, a cost/failure breach, or the emergency stop.
    Paused,
    /// Every item reached a terminal state.
    Completed,
    /// Explicitly cancelled; queued items were discarded.
    Cancelled,
    /// Unrecoverable orchestration error.
    Failed,
}

impl OperationState {
    /// Snake-case string used in API payloads and filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Parse an API status string. Unknown values are a validation error.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown operation status: '{other}'"
            ))),
        }
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// The set of valid target states reachable from this state.
    pub fn valid_transitions(self) -> &'static [OperationState] {
        match self {
            Self::Pending => &[Self::Running, Self::Cancelled, Self::Failed],
            Self::Running => &[
                Self::Paused,
                Self::Completed,
                Self::Cancelled,
                Self::Failed,
            ],
            Self::Paused => &[Self::Running, Self::Cancelled, Self::Failed],
            Self::Completed | Self::Cancelled | Self::Failed => &[],
        }
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(self, to: OperationState) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// Validate a state transition, returning a descriptive error for invalid
/// ones.
pub fn validate_transition(from: OperationState, to: OperationState) -> Result<(), CoreError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Invalid transition: {} -> {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

// ---------------------------------------------------------------------------
// Processing configuration
// ---------------------------------------------------------------------------

/// Per-operation processing knobs supplied by the start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Items dispatched per scheduling round (1-200).
    pub batch_size: u32,
    /// Provider model identifier.
    pub model: String,
    /// Sampling temperature forwarded to the provider.
    pub temperature: f64,
    /// Per-call completion token budget.
    pub max_tokens: u32,
    /// Regenerate terms that already have content.
    #[serde(default)]
    pub regenerate_existing: bool,
    /// Pause the whole operation on the first exhausted-retries failure.
    #[serde(default)]
    pub pause_on_error: bool,
    /// Concurrent item workers for this operation (1-5).
    pub max_concurrent_workers: u32,
}

impl ProcessingConfig {
    /// Validate all range constraints.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(CoreError::Validation(format!(
                "batch_size must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}"
            )));
        }
        if self.model.is_empty() {
            return Err(CoreError::Validation(
                "model must not be empty".to_string(),
            ));
        }
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(CoreError::Validation(format!(
                "temperature must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}"
            )));
        }
        if self.max_tokens == 0 || self.max_tokens > MAX_MAX_TOKENS {
            return Err(CoreError::Validation(format!(
                "max_tokens must be between 1 and {MAX_MAX_TOKENS}"
            )));
        }
        if !(MIN_CONCURRENT_WORKERS..=MAX_CONCURRENT_WORKERS).contains(&self.max_concurrent_workers)
        {
            return Err(CoreError::Validation(format!(
                "max_concurrent_workers must be between {MIN_CONCURRENT_WORKERS} and {MAX_CONCURRENT_WORKERS}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cost limits
// ---------------------------------------------------------------------------

/// Optional per-operation cost ceilings. Absent fields fall back to the
/// system defaults at resolution time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostLimits {
    /// Ceiling on the operation's cumulative cost (micro-USD).
    pub max_total_cost: Option<MicroUsd>,
    /// Ceiling on a single item's realized cost (micro-USD).
    pub max_cost_per_term: Option<MicroUsd>,
    /// Warning threshold as a percentage of `max_total_cost`.
    pub warning_threshold_pct: Option<u8>,
}

/// Cost limits with defaults applied; what the orchestrator actually
/// enforces.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResolvedCostLimits {
    pub max_total_cost: MicroUsd,
    pub max_cost_per_term: MicroUsd,
    pub warning_threshold_pct: u8,
}

impl CostLimits {
    /// Validate the fields that are present.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(c) = self.max_total_cost {
            if c <= 0 {
                return Err(CoreError::Validation(
                    "max_total_cost must be positive".to_string(),
                ));
            }
        }
        if let Some(c) = self.max_cost_per_term {
            if c <= 0 {
                return Err(CoreError::Validation(
                    "max_cost_per_term must be positive".to_string(),
                ));
            }
        }
        if let Some(pct) = self.warning_threshold_pct {
            if pct == 0 || pct > 100 {
                return Err(CoreError::Validation(
                    "warning_threshold_pct must be between 1 and 100".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Apply system defaults to absent fields.
    pub fn resolve(&self) -> ResolvedCostLimits {
        ResolvedCostLimits {
            max_total_cost: self.max_total_cost.unwrap_or(DEFAULT_MAX_TOTAL_COST),
            max_cost_per_term: self.max_cost_per_term.unwrap_or(DEFAULT_MAX_COST_PER_TERM),
            warning_threshold_pct: self
                .warning_threshold_pct
                .unwrap_or(DEFAULT_WARNING_THRESHOLD_PCT),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification configuration
// ---------------------------------------------------------------------------

/// How the initiator wants to hear about operation lifecycle events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Send a completion email (requires SMTP to be configured).
    #[serde(default)]
    pub email_on_completion: bool,
    /// POST lifecycle events to this URL.
    pub webhook_url: Option<String>,
    /// Publish a milestone event when processed percentage crosses each
    /// of these values (1-100).
    #[serde(default)]
    pub milestone_percents: Vec<u8>,
}

impl NotificationConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(url) = &self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CoreError::Validation(
                    "webhook_url must be an http(s) URL".to_string(),
                ));
            }
        }
        for pct in &self.milestone_percents {
            if *pct == 0 || *pct > 100 {
                return Err(CoreError::Validation(
                    "milestone percentages must be between 1 and 100".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Audit metadata attached at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMeta {
    /// Identity of the caller, from the identity layer.
    pub initiated_by: String,
    /// Free-text reason for the run.
    pub reason: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl OperationMeta {
    /// Validate tag count, length, and uniqueness.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.initiated_by.is_empty() {
            return Err(CoreError::Validation(
                "initiated_by must not be empty".to_string(),
            ));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(CoreError::Validation(format!(
                "An operation may have at most {MAX_TAGS} tags"
            )));
        }
        let mut seen = std::collections::HashSet::with_capacity(self.tags.len());
        for (i, tag) in self.tags.iter().enumerate() {
            if tag.is_empty() {
                return Err(CoreError::Validation(format!(
                    "Tag at index {i} must not be empty"
                )));
            }
            if tag.len() > MAX_TAG_LEN {
                return Err(CoreError::Validation(format!(
                    "Tag at index {i} exceeds {MAX_TAG_LEN} characters"
                )));
            }
            if !seen.insert(tag.as_str()) {
                return Err(CoreError::Validation(format!("Duplicate tag: \"{tag}\"")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Operation spec
// ---------------------------------------------------------------------------

/// The immutable configuration snapshot of one batch operation, as accepted
/// by `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Glossary section the operation generates content for.
    pub section: String,
    /// Which terms to process.
    pub selection: SelectionCriteria,
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub limits: CostLimits,
    #[serde(default)]
    pub notifications: NotificationConfig,
    pub meta: OperationMeta,
}

impl OperationSpec {
    /// Validate the whole spec. Rejected specs create no state.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.section.is_empty() {
            return Err(CoreError::Validation(
                "section must not be empty".to_string(),
            ));
        }
        self.selection.validate()?;
        self.processing.validate()?;
        self.limits.validate()?;
        self.notifications.validate()?;
        self.meta.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionCriteria;

    fn valid_processing() -> ProcessingConfig {
        ProcessingConfig {
            batch_size: 10,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            regenerate_existing: false,
            pause_on_error: false,
            max_concurrent_workers: 2,
        }
    }

    fn valid_spec() -> OperationSpec {
        OperationSpec {
            section: "definition".to_string(),
            selection: SelectionCriteria::ExplicitIds {
                term_ids: vec![1, 2, 3],
            },
            processing: valid_processing(),
            limits: CostLimits::default(),
            notifications: NotificationConfig::default(),
            meta: OperationMeta {
                initiated_by: "admin".to_string(),
                reason: None,
                tags: vec![],
            },
        }
    }

    // -- state machine --------------------------------------------------------

    #[test]
    fn pending_to_running() {
        assert!(OperationState::Pending.can_transition(OperationState::Running));
    }

    #[test]
    fn running_to_paused_and_back() {
        assert!(OperationState::Running.can_transition(OperationState::Paused));
        assert!(OperationState::Paused.can_transition(OperationState::Running));
    }

    #[test]
    fn running_to_terminal_states() {
        assert!(OperationState::Running.can_transition(OperationState::Completed));
        assert!(OperationState::Running.can_transition(OperationState::Cancelled));
        assert!(OperationState::Running.can_transition(OperationState::Failed));
    }

    #[test]
    fn paused_to_cancelled() {
        assert!(OperationState::Paused.can_transition(OperationState::Cancelled));
    }

    #[test]
    fn no_state_reenters_pending() {
        for from in [
            OperationState::Running,
            OperationState::Paused,
            OperationState::Completed,
            OperationState::Cancelled,
            OperationState::Failed,
        ] {
            assert!(!from.can_transition(OperationState::Pending));
        }
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(OperationState::Completed.valid_transitions().is_empty());
        assert!(OperationState::Cancelled.valid_transitions().is_empty());
        assert!(OperationState::Failed.valid_transitions().is_empty());
    }

    #[test]
    fn pending_cannot_pause() {
        assert!(!OperationState::Pending.can_transition(OperationState::Paused));
    }

    #[test]
    fn validate_transition_err_is_descriptive() {
        let err =
            validate_transition(OperationState::Completed, OperationState::Running).unwrap_err();
        assert!(err.to_string().contains("completed"));
        assert!(err.to_string().contains("running"));
    }

    #[test]
    fn state_round_trips_through_strings() {
        for s in [
            OperationState::Pending,
            OperationState::Running,
            OperationState::Paused,
            OperationState::Completed,
            OperationState::Cancelled,
            OperationState::Failed,
        ] {
            assert_eq!(OperationState::parse(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn unknown_state_string_rejected() {
        assert!(OperationState::parse("bogus").is_err());
    }

    // -- processing config ----------------------------------------------------

    #[test]
    fn valid_processing_config_passes() {
        assert!(valid_processing().validate().is_ok());
    }

    #[test]
    fn batch_size_bounds_enforced() {
        let mut cfg = valid_processing();
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());
        cfg.batch_size = MAX_BATCH_SIZE + 1;
        assert!(cfg.validate().is_err());
        cfg.batch_size = MAX_BATCH_SIZE;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn concurrency_bounds_enforced() {
        let mut cfg = valid_processing();
        cfg.max_concurrent_workers = 0;
        assert!(cfg.validate().is_err());
        cfg.max_concurrent_workers = MAX_CONCURRENT_WORKERS + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let mut cfg = valid_processing();
        cfg.temperature = -0.1;
        assert!(cfg.validate().is_err());
        cfg.temperature = 2.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_model_rejected() {
        let mut cfg = valid_processing();
        cfg.model = String::new();
        assert!(cfg.validate().is_err());
    }

    // -- cost limits ----------------------------------------------------------

    #[test]
    fn empty_limits_resolve_to_defaults() {
        let resolved = CostLimits::default().resolve();
        assert_eq!(resolved.max_total_cost, DEFAULT_MAX_TOTAL_COST);
        assert_eq!(resolved.max_cost_per_term, DEFAULT_MAX_COST_PER_TERM);
        assert_eq!(resolved.warning_threshold_pct, DEFAULT_WARNING_THRESHOLD_PCT);
    }

    #[test]
    fn explicit_limits_survive_resolution() {
        let limits = CostLimits {
            max_total_cost: Some(1_000_000),
            max_cost_per_term: Some(10_000),
            warning_threshold_pct: Some(50),
        };
        let resolved = limits.resolve();
        assert_eq!(resolved.max_total_cost, 1_000_000);
        assert_eq!(resolved.max_cost_per_term, 10_000);
        assert_eq!(resolved.warning_threshold_pct, 50);
    }

    #[test]
    fn non_positive_limits_rejected() {
        let limits = CostLimits {
            max_total_cost: Some(0),
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn threshold_pct_bounds_enforced() {
        let limits = CostLimits {
            warning_threshold_pct: Some(101),
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    // -- notifications --------------------------------------------------------

    #[test]
    fn non_http_webhook_rejected() {
        let cfg = NotificationConfig {
            webhook_url: Some("ftp://example.com/hook".to_string()),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn milestone_zero_rejected() {
        let cfg = NotificationConfig {
            milestone_percents: vec![0],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    // -- metadata -------------------------------------------------------------

    #[test]
    fn duplicate_tags_rejected() {
        let meta = OperationMeta {
            initiated_by: "admin".to_string(),
            reason: None,
            tags: vec!["seo".to_string(), "seo".to_string()],
        };
        assert!(meta.validate().is_err());
    }

    #[test]
    fn empty_initiator_rejected() {
        let meta = OperationMeta {
            initiated_by: String::new(),
            reason: None,
            tags: vec![],
        };
        assert!(meta.validate().is_err());
    }

    // -- spec -----------------------------------------------------------------

    #[test]
    fn valid_spec_passes() {
        assert!(valid_spec().validate().is_ok());
    }

    #[test]
    fn empty_section_rejected() {
        let mut spec = valid_spec();
        spec.section = String::new();
        assert!(spec.validate().is_err());
    }
}
