//! Cost and duration estimation for batch operations, with confidence
//! levels based on the number of calibration samples.

use serde::Serialize;

use crate::cost::{compute_cost, ModelPrice};
use crate::error::CoreError;
use crate::types::MicroUsd;

// ---------------------------------------------------------------------------
// Confidence thresholds
// ---------------------------------------------------------------------------

/// Sample count at or above which confidence is "High".
pub const HIGH_CONFIDENCE_SAMPLES: i32 = 10;
/// Sample count at or above which confidence is "Medium" (below High).
pub const MEDIUM_CONFIDENCE_SAMPLES: i32 = 3;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum number of terms allowed in a single estimation request.
pub const MAX_ESTIMATE_TERMS: usize = 500;

// ---------------------------------------------------------------------------
// Confidence enum
// ---------------------------------------------------------------------------

/// Confidence level for an estimate, derived from the number of
/// historical calibration samples available for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateConfidence {
    High,
    Medium,
    Low,
    None,
}

impl EstimateConfidence {
    /// Derive confidence from the number of calibration samples.
    pub fn from_sample_count(count: i32) -> Self {
        if count >= HIGH_CONFIDENCE_SAMPLES {
            Self::High
        } else if count >= MEDIUM_CONFIDENCE_SAMPLES {
            Self::Medium
        } else if count > 0 {
            Self::Low
        } else {
            Self::None
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
            Self::None => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Estimate types
// ---------------------------------------------------------------------------

/// Projected cost and duration for a single term.
#[derive(Debug, Clone, Serialize)]
pub struct TermEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: MicroUsd,
    pub generation_secs: f64,
    pub confidence: EstimateConfidence,
}

/// Projected cost and wall-clock duration for a whole operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationEstimate {
    pub term_count: u32,
    pub total_cost: MicroUsd,
    /// Worker-aware wall-clock projection.
    pub wall_clock_secs: f64,
    pub worker_count: u32,
    pub confidence: EstimateConfidence,
}

// ---------------------------------------------------------------------------
// Estimation logic
// ---------------------------------------------------------------------------

/// Estimate one term from historical averages and the model price.
pub fn estimate_term(
    avg_input_tokens: u64,
    avg_output_tokens: u64,
    price: ModelPrice,
    avg_generation_secs: f64,
    sample_count: i32,
) -> TermEstimate {
    TermEstimate {
        input_tokens: avg_input_tokens,
        output_tokens: avg_output_tokens,
        cost: compute_cost(price, avg_input_tokens, avg_output_tokens),
        generation_secs: avg_generation_secs,
        confidence: EstimateConfidence::from_sample_count(sample_count),
    }
}

/// Aggregate term estimates into an operation estimate.
///
/// Aggregate confidence is the *lowest* confidence across all terms, so the
/// overall figure clearly reflects its weakest link. Wall clock assumes the
/// worker pool stays saturated.
pub fn estimate_operation(term_estimates: &[TermEstimate], worker_count: u32) -> OperationEstimate {
    let total_cost: MicroUsd = term_estimates.iter().map(|e| e.cost).sum();
    let total_secs: f64 = term_estimates.iter().map(|e| e.generation_secs).sum();

    let effective_workers = worker_count.max(1) as f64;

    let confidence = term_estimates
        .iter()
        .map(|e| e.confidence)
        .min_by_key(|c| c.rank())
        .unwrap_or(EstimateConfidence::None);

    OperationEstimate {
        term_count: term_estimates.len() as u32,
        total_cost,
        wall_clock_secs: total_secs / effective_workers,
        worker_count,
        confidence,
    }
}

// ---------------------------------------------------------------------------
// Incremental mean
// ---------------------------------------------------------------------------

/// Online mean update for calibration averages:
/// `new_avg = old_avg + (new_value - old_avg) / new_count`.
pub fn incremental_mean(old_avg: f64, new_value: f64, new_count: i32) -> f64 {
    old_avg + (new_value - old_avg) / new_count as f64
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the term count of an estimation request.
pub fn validate_estimate_count(count: usize) -> Result<(), CoreError> {
    if count == 0 {
        return Err(CoreError::Validation(
            "Estimation requires at least one term".to_string(),
        ));
    }
    if count > MAX_ESTIMATE_TERMS {
        return Err(CoreError::Validation(format!(
            "Estimation is limited to {MAX_ESTIMATE_TERMS} terms per request"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
