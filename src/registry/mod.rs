//! Collaborator lookups the engine depends on but does not own.
//!
//! Currencies and portfolios are managed elsewhere; the engine only asks
//! whether an id exists before it touches the ledger.

use crate::domain::{CurrencyId, PortfolioId};
use async_trait::async_trait;
use thiserror::Error;

pub mod sql;

pub use sql::SqlRegistry;

/// Currency catalog lookups.
#[async_trait]
pub trait CurrencyRegistry: Send + Sync {
    /// Whether `currency_id` names a known currency.
    async fn exists(&self, currency_id: &CurrencyId) -> Result<bool, RegistryError>;
}

/// Portfolio lookups.
#[async_trait]
pub trait PortfolioRegistry: Send + Sync {
    /// Whether `portfolio_id` names an existing portfolio.
    async fn exists(&self, portfolio_id: &PortfolioId) -> Result<bool, RegistryError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}
