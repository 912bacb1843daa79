//! Market maker computation and orchestration.
//!
//! - `pool_math` - pure constant-product arithmetic
//! - `market_engine` - atomic create/buy/sell/resolve/cancel over the store

pub mod market_engine;
pub mod pool_math;

pub use market_engine::{
    MarketData, MarketEngine, MarketList, Purchase, Settlement, DRAW_PAYOUT_PER_SHARE,
    WIN_PAYOUT_PER_SHARE,
};
pub use pool_math::{BuyOutcome, PoolMathError, SellOutcome, PRODUCT_TOLERANCE};
