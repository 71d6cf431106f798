/// Glossary term primary keys are 64-bit integers assigned by the term store.
pub type TermId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Monetary amounts are integer micro-USD (1 USD = 1,000,000 micros) so
/// shared spend counters can be plain atomic integers.
pub type MicroUsd = i64;

/// Micros per whole US dollar.
pub const MICROS_PER_USD: i64 = 1_000_000;

/// Convert a dollar amount to micro-USD, rounding to the nearest micro.
pub fn usd_to_micros(usd: f64) -> MicroUsd {
    (usd * MICROS_PER_USD as f64).round() as MicroUsd
}

/// Convert micro-USD back to dollars for display/serialization.
pub fn micros_to_usd(micros: MicroUsd) -> f64 {
    micros as f64 / MICROS_PER_USD as f64
}
