//! Registry backed by the store's `currencies` and `portfolios` tables.

use super::{CurrencyRegistry, PortfolioRegistry, RegistryError};
use crate::db::Repository;
use crate::domain::{CurrencyId, PortfolioId};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone)]
pub struct SqlRegistry {
    repo: Arc<Repository>,
}

impl SqlRegistry {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CurrencyRegistry for SqlRegistry {
    async fn exists(&self, currency_id: &CurrencyId) -> Result<bool, RegistryError> {
        Ok(self.repo.currency_exists(currency_id).await?)
    }
}

#[async_trait]
impl PortfolioRegistry for SqlRegistry {
    async fn exists(&self, portfolio_id: &PortfolioId) -> Result<bool, RegistryError> {
        Ok(self.repo.portfolio_exists(portfolio_id).await?)
    }
}
