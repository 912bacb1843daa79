//! Domain types for the prediction market ledger.
//!
//! This module provides:
//! - Domain primitives: TimeMs, typed ids, Side
//! - Market, Share and HistoryEntry rows
//! - Portfolio balances and the transaction log record

pub mod history;
pub mod ledger;
pub mod market;
pub mod primitives;
pub mod share;

pub use history::HistoryEntry;
pub use ledger::{PortfolioBalance, TransactionKind, TransactionRecord};
pub use market::{Direction, Market, MarketStatus, MarketTerms, NewMarket};
pub use primitives::{
    CurrencyId, MarketId, ParseEnumError, PortfolioId, ShareId, Side, TimeMs, TransactionId,
};
pub use share::Share;
