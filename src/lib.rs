pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod registry;

pub use config::Config;
pub use db::{init_db, init_db_with_config, Repository};
pub use domain::{
    CurrencyId, HistoryEntry, Market, MarketId, MarketStatus, MarketTerms, NewMarket,
    PortfolioId, Share, ShareId, Side, TimeMs, TransactionKind, TransactionRecord,
};
pub use engine::{MarketData, MarketEngine, MarketList, Purchase, Settlement};
pub use error::EngineError;
pub use registry::{CurrencyRegistry, PortfolioRegistry, RegistryError, SqlRegistry};
