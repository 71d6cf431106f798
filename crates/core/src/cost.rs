//! Token pricing, budget periods, and warning-threshold arithmetic.
//!
//! Costs are estimates derived from reported token usage and a static
//! price table; they drive control decisions, not billing.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{MicroUsd, Timestamp};

// ---------------------------------------------------------------------------
// Price table
// ---------------------------------------------------------------------------

/// Per-model price in micro-USD per 1,000 tokens.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelPrice {
    pub input_per_1k: MicroUsd,
    pub output_per_1k: MicroUsd,
}

/// Fallback price for models missing from the table. Deliberately on the
/// expensive side so unknown models err toward conservative admission.
pub const DEFAULT_PRICE: ModelPrice = ModelPrice {
    input_per_1k: 5_000,
    output_per_1k: 15_000,
};

/// Static model price table.
#[derive(Debug, Clone)]
pub struct PriceTable {
    entries: Vec<(String, ModelPrice)>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            entries: vec![
                (
                    "gpt-4o".to_string(),
                    ModelPrice {
                        input_per_1k: 2_500,
                        output_per_1k: 10_000,
                    },
                ),
                (
                    "gpt-4o-mini".to_string(),
                    ModelPrice {
                        input_per_1k: 150,
                        output_per_1k: 600,
                    },
                ),
                (
                    "gpt-4.1-mini".to_string(),
                    ModelPrice {
                        input_per_1k: 400,
                        output_per_1k: 1_600,
                    },
                ),
            ],
        }
    }
}

impl PriceTable {
    /// Look up a model's price, falling back to [`DEFAULT_PRICE`].
    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.entries
            .iter()
            .find(|(name, _)| name == model)
            .map(|(_, p)| *p)
            .unwrap_or(DEFAULT_PRICE)
    }

    /// Whether the model has an explicit table entry.
    pub fn knows(&self, model: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == model)
    }
}

/// Compute the cost of one generation call from reported token counts.
pub fn compute_cost(price: ModelPrice, input_tokens: u64, output_tokens: u64) -> MicroUsd {
    let input = price.input_per_1k as i128 * input_tokens as i128 / 1_000;
    let output = price.output_per_1k as i128 * output_tokens as i128 / 1_000;
    (input + output) as MicroUsd
}

// ---------------------------------------------------------------------------
// Budget periods
// ---------------------------------------------------------------------------

/// Accounting period of a named budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    Daily,
    Monthly,
    Total,
}

impl BudgetPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Total => "total",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            "total" => Ok(Self::Total),
            other => Err(CoreError::Validation(format!(
                "Unknown budget period: '{other}'"
            ))),
        }
    }

    /// Whether two instants fall into the same accounting period.
    ///
    /// `Total` never rolls over; spend accumulated under it is permanent.
    pub fn same_period(self, a: Timestamp, b: Timestamp) -> bool {
        match self {
            Self::Daily => a.date_naive() == b.date_naive(),
            Self::Monthly => a.year() == b.year() && a.month() == b.month(),
            Self::Total => true,
        }
    }

    /// Seconds until the period containing `now` ends. `None` for `Total`.
    pub fn secs_until_rollover(self, now: Timestamp) -> Option<i64> {
        let next = match self {
            Self::Daily => (now.date_naive() + chrono::Days::new(1))
                .and_hms_opt(0, 0, 0)?
                .and_utc(),
            Self::Monthly => {
                let (year, month) = if now.month() == 12 {
                    (now.year() + 1, 1)
                } else {
                    (now.year(), now.month() + 1)
                };
                chrono::NaiveDate::from_ymd_opt(year, month, 1)?
                    .and_hms_opt(0, 0, 0)?
                    .and_utc()
            }
            Self::Total => return None,
        };
        Some((next - now).num_seconds().max(0))
    }
}

// ---------------------------------------------------------------------------
// Warning threshold
// ---------------------------------------------------------------------------

/// The spend level at which a warning fires.
pub fn warning_level(limit: MicroUsd, threshold_pct: u8) -> MicroUsd {
    (limit as i128 * threshold_pct as i128 / 100) as MicroUsd
}

/// Whether adding spend moved a counter across the warning level.
///
/// Strictly "crossed", not "above": repeated additions while already past
/// the level return false, so one alert fires per crossing. Dropping below
/// (period reset) and climbing past again is a new crossing.
pub fn warning_crossed(
    prev_spend: MicroUsd,
    new_spend: MicroUsd,
    limit: MicroUsd,
    threshold_pct: u8,
) -> bool {
    let level = warning_level(limit, threshold_pct);
    level > 0 && prev_spend < level && new_spend >= level
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
