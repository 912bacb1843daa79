//! Per-market pool time series.

use crate::domain::{MarketId, TimeMs};
use serde::{Deserialize, Serialize};

/// Snapshot of a market's pools after a mutating event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Insertion sequence; tie-breaker for entries in the same millisecond.
    pub seq: i64,
    pub market_id: MarketId,
    pub yes_pool: f64,
    pub no_pool: f64,
    /// Implied price of `yes` at this point.
    pub probability: f64,
    pub recorded_at: TimeMs,
}
