//! Outcome share positions.

use crate::domain::{CurrencyId, MarketId, PortfolioId, ShareId, Side, TimeMs};
use serde::{Deserialize, Serialize};

/// A claim on `amount` units of market currency if the market resolves to `choice`.
///
/// Created with a buy, deleted by a sell of the whole position, and kept
/// after resolution or cancellation as an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Share {
    pub id: ShareId,
    pub market_id: MarketId,
    pub portfolio_id: PortfolioId,
    pub choice: Side,
    /// Quantity of outcome shares, not currency.
    pub amount: f64,
    pub currency_id: CurrencyId,
    pub created_at: TimeMs,
}
