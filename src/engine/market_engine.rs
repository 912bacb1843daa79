//! Market lifecycle and trading against the shared ledger.
//!
//! Every mutating operation on a market is one SQLite transaction whose first
//! statement is a write on the market row (`markets::lock`), so the write lock
//! is held before anything is read and released only at commit or rollback.
//! Timestamps are taken after the lock, so they follow commit order. Any early
//! return drops the transaction, which rolls it back.

use crate::db::{balances, history, markets, shares, transactions, Repository};
use crate::domain::{
    CurrencyId, HistoryEntry, Market, MarketId, MarketStatus, MarketTerms, NewMarket,
    PortfolioBalance, PortfolioId, Share, ShareId, Side, TimeMs, TransactionKind, TransactionRecord,
};
use crate::engine::pool_math;
use crate::error::EngineError;
use crate::registry::{CurrencyRegistry, PortfolioRegistry, SqlRegistry};
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Currency paid per winning share.
pub const WIN_PAYOUT_PER_SHARE: f64 = 1.0;
/// Currency paid per share, either side, when a market resolves to no outcome.
pub const DRAW_PAYOUT_PER_SHARE: f64 = 0.5;

/// Result of a buy.
#[derive(Debug, Clone, PartialEq)]
pub struct Purchase {
    pub share_id: ShareId,
    pub shares_bought: f64,
}

/// Result of closing a market (resolution or cancellation).
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub market: Market,
    /// Number of shares that received a credit.
    pub payouts: usize,
    pub total_paid: f64,
}

/// A market with its pool history.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub market: Market,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketList {
    pub markets: Vec<Market>,
    pub total_count: usize,
}

pub struct MarketEngine {
    repo: Arc<Repository>,
    currencies: Arc<dyn CurrencyRegistry>,
    portfolios: Arc<dyn PortfolioRegistry>,
}

impl MarketEngine {
    pub fn new(
        repo: Arc<Repository>,
        currencies: Arc<dyn CurrencyRegistry>,
        portfolios: Arc<dyn PortfolioRegistry>,
    ) -> Self {
        Self {
            repo,
            currencies,
            portfolios,
        }
    }

    /// Engine whose registries read the store's own collaborator tables.
    pub fn with_sql_registry(repo: Arc<Repository>) -> Self {
        let registry = Arc::new(SqlRegistry::new(repo.clone()));
        Self::new(repo, registry.clone(), registry)
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Open a market with `pool_size` split evenly between the pools.
    ///
    /// # Errors
    /// `Validation` for an empty title, non-positive pool size, bad price-target
    /// terms or an unknown currency.
    pub async fn create_market(&self, new: NewMarket) -> Result<MarketId, EngineError> {
        if new.title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be empty".into()));
        }
        if !(new.pool_size.is_finite() && new.pool_size > 0.0) {
            return Err(EngineError::Validation(format!(
                "pool size must be positive, got {}",
                new.pool_size
            )));
        }
        if let MarketTerms::PriceTarget {
            asset_id,
            target_price,
            ..
        } = &new.terms
        {
            if asset_id.trim().is_empty() {
                return Err(EngineError::Validation("asset id must not be empty".into()));
            }
            if !(target_price.is_finite() && *target_price > 0.0) {
                return Err(EngineError::Validation(format!(
                    "target price must be positive, got {}",
                    target_price
                )));
            }
        }
        if !self.currencies.exists(&new.currency_id).await? {
            return Err(EngineError::Validation(format!(
                "unknown currency {}",
                new.currency_id
            )));
        }

        let now = TimeMs::now();
        let half = new.pool_size / 2.0;
        let market = Market {
            id: MarketId::generate(),
            terms: new.terms,
            status: MarketStatus::Pending,
            result: None,
            title: new.title,
            description: new.description,
            yes_pool: half,
            no_pool: half,
            currency_id: new.currency_id,
            end_date: new.end_date,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        let mut tx = self.repo.begin().await?;
        markets::insert(&mut *tx, &market).await?;
        history::append(&mut *tx, &snapshot(&market.id, half, half, now)).await?;
        tx.commit().await?;

        info!(
            market_id = %market.id,
            kind = market.terms.kind(),
            currency_id = %market.currency_id,
            pool_size = half * 2.0,
            "Market created"
        );
        Ok(market.id)
    }

    /// Spend `amount` of the market currency on `side`.
    ///
    /// # Errors
    /// `Validation`, `NotFound` (market or portfolio), `MarketNotOpen`,
    /// `InsufficientBalance`, `InvalidMarketState` or `ConcurrencyConflict`.
    pub async fn buy_shares(
        &self,
        market_id: &MarketId,
        portfolio_id: &PortfolioId,
        amount: f64,
        side: Side,
    ) -> Result<Purchase, EngineError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(EngineError::Validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        self.require_portfolio(portfolio_id).await?;

        let mut tx = self.repo.begin().await?;
        let market = lock_open_market(&mut *tx, market_id).await?;
        // Stamped under the write lock so timestamps follow commit order.
        let now = TimeMs::now();

        let available = balances::get(&mut *tx, portfolio_id, &market.currency_id).await?;
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        let outcome = pool_math::buy(market.yes_pool, market.no_pool, amount, side)?;
        ensure_product_preserved(&market, outcome.yes_pool_after, outcome.no_pool_after)?;
        write_pools(
            &mut *tx,
            &market,
            outcome.yes_pool_after,
            outcome.no_pool_after,
            now,
        )
        .await?;

        balances::apply_delta(&mut *tx, portfolio_id, &market.currency_id, -amount, now).await?;

        let share = Share {
            id: ShareId::generate(),
            market_id: market.id.clone(),
            portfolio_id: portfolio_id.clone(),
            choice: side,
            amount: outcome.shares_bought,
            currency_id: market.currency_id.clone(),
            created_at: now,
        };
        shares::insert(&mut *tx, &share).await?;

        let record = TransactionRecord::new(
            portfolio_id.clone(),
            TransactionKind::PredictionCost,
            -amount,
            market.currency_id.clone(),
            now,
        )
        .with_units(outcome.shares_bought)
        .with_share(share.id.clone())
        .with_notes(format!(
            "Purchased {:.4} {} shares in prediction market \"{}\"",
            outcome.shares_bought, side, market.title
        ));
        transactions::append(&mut *tx, &record).await?;

        history::append(
            &mut *tx,
            &snapshot(
                &market.id,
                outcome.yes_pool_after,
                outcome.no_pool_after,
                now,
            ),
        )
        .await?;
        tx.commit().await?;

        info!(
            market_id = %market.id,
            portfolio_id = %portfolio_id,
            share_id = %share.id,
            side = %side,
            amount,
            shares_bought = outcome.shares_bought,
            "Shares bought"
        );
        Ok(Purchase {
            share_id: share.id,
            shares_bought: outcome.shares_bought,
        })
    }

    /// Sell a whole position back to the pools. Returns the sale price credited.
    ///
    /// # Errors
    /// `NotFound` when the share does not belong to `portfolio_id` in this market,
    /// `MarketNotOpen`, `InvalidMarketState` or `ConcurrencyConflict`.
    pub async fn sell_shares(
        &self,
        market_id: &MarketId,
        portfolio_id: &PortfolioId,
        share_id: &ShareId,
    ) -> Result<f64, EngineError> {
        self.require_portfolio(portfolio_id).await?;

        let mut tx = self.repo.begin().await?;
        let market = lock_open_market(&mut *tx, market_id).await?;
        // Stamped under the write lock so timestamps follow commit order.
        let now = TimeMs::now();

        let share = shares::get_owned(&mut *tx, share_id, portfolio_id, market_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "share {} for portfolio {} in market {}",
                    share_id, portfolio_id, market_id
                ))
            })?;

        let outcome = pool_math::sell(market.yes_pool, market.no_pool, share.amount, share.choice)?;
        ensure_product_preserved(&market, outcome.yes_pool_after, outcome.no_pool_after)?;
        write_pools(
            &mut *tx,
            &market,
            outcome.yes_pool_after,
            outcome.no_pool_after,
            now,
        )
        .await?;

        shares::delete(&mut *tx, &share.id).await?;
        balances::apply_delta(
            &mut *tx,
            portfolio_id,
            &market.currency_id,
            outcome.sale_price,
            now,
        )
        .await?;

        let record = TransactionRecord::new(
            portfolio_id.clone(),
            TransactionKind::PredictionSale,
            outcome.sale_price,
            market.currency_id.clone(),
            now,
        )
        .with_units(share.amount)
        .with_share(share.id.clone())
        .with_notes(format!(
            "Sold {:.4} {} shares in prediction market \"{}\"",
            share.amount, share.choice, market.title
        ));
        transactions::append(&mut *tx, &record).await?;

        history::append(
            &mut *tx,
            &snapshot(
                &market.id,
                outcome.yes_pool_after,
                outcome.no_pool_after,
                now,
            ),
        )
        .await?;
        tx.commit().await?;

        info!(
            market_id = %market.id,
            portfolio_id = %portfolio_id,
            share_id = %share.id,
            shares = share.amount,
            sale_price = outcome.sale_price,
            "Shares sold"
        );
        Ok(outcome.sale_price)
    }

    /// Resolve a pending market and pay out its shares.
    ///
    /// `Some(side)` pays [`WIN_PAYOUT_PER_SHARE`] per share on `side` and nothing to
    /// the other side; `None` pays [`DRAW_PAYOUT_PER_SHARE`] per share to everyone.
    /// Pools are left as they were. Shares stay in place as the audit record.
    ///
    /// # Errors
    /// `NotFound`, or `MarketNotOpen` when the market already left `pending`
    /// (including a concurrent resolution that committed first).
    pub async fn resolve_market(
        &self,
        market_id: &MarketId,
        result: Option<Side>,
    ) -> Result<Settlement, EngineError> {
        let mut tx = self.repo.begin().await?;
        lock_market(&mut *tx, market_id).await?;
        let now = TimeMs::now();
        let closed =
            markets::close_pending(&mut *tx, market_id, MarketStatus::Resolved, result, now).await?;
        let Some(market) = closed else {
            return Err(not_open(market_id));
        };

        history::append(
            &mut *tx,
            &snapshot(&market.id, market.yes_pool, market.no_pool, now),
        )
        .await?;

        let (paid_shares, per_share, kind) = match result {
            Some(side) => (
                shares::list_for_market(&mut *tx, market_id, Some(side)).await?,
                WIN_PAYOUT_PER_SHARE,
                TransactionKind::PredictionWin,
            ),
            None => (
                shares::list_for_market(&mut *tx, market_id, None).await?,
                DRAW_PAYOUT_PER_SHARE,
                TransactionKind::PredictionDraw,
            ),
        };

        let mut total_paid = 0.0;
        for share in &paid_shares {
            let payout = share.amount * per_share;
            balances::apply_delta(
                &mut *tx,
                &share.portfolio_id,
                &market.currency_id,
                payout,
                now,
            )
            .await?;

            let record = TransactionRecord::new(
                share.portfolio_id.clone(),
                kind,
                payout,
                market.currency_id.clone(),
                now,
            )
            .with_units(share.amount)
            .with_price_per_unit(per_share)
            .with_share(share.id.clone())
            .with_notes(format!(
                "Payout for {:.4} {} shares in prediction market \"{}\"",
                share.amount, share.choice, market.title
            ));
            transactions::append(&mut *tx, &record).await?;
            total_paid += payout;
        }
        tx.commit().await?;

        info!(
            market_id = %market.id,
            result = result.map(|s| s.as_str()).unwrap_or("draw"),
            payouts = paid_shares.len(),
            total_paid,
            "Market resolved"
        );
        Ok(Settlement {
            market,
            payouts: paid_shares.len(),
            total_paid,
        })
    }

    /// Cancel a pending market, refunding every open share at its purchase cost.
    ///
    /// The refund is the amount paid on the share's `prediction_cost` record, not
    /// the current pool-implied price. Pools return to the opening split.
    ///
    /// # Errors
    /// `NotFound`, `MarketNotOpen`, or `InvalidMarketState` when a share has no
    /// purchase record or the market has no opening history.
    pub async fn cancel_market(&self, market_id: &MarketId) -> Result<Settlement, EngineError> {
        let mut tx = self.repo.begin().await?;
        lock_market(&mut *tx, market_id).await?;
        let now = TimeMs::now();
        let closed =
            markets::close_pending(&mut *tx, market_id, MarketStatus::Cancelled, None, now).await?;
        let Some(mut market) = closed else {
            return Err(not_open(market_id));
        };

        let opening = history::first_for_market(&mut *tx, market_id)
            .await?
            .ok_or_else(|| {
                EngineError::InvalidMarketState(format!("market {} has no history", market_id))
            })?;

        let open_shares = shares::list_for_market(&mut *tx, market_id, None).await?;
        let mut total_paid = 0.0;
        for share in &open_shares {
            let cost = transactions::cost_for_share(&mut *tx, &share.id)
                .await?
                .ok_or_else(|| {
                    EngineError::InvalidMarketState(format!(
                        "share {} has no purchase record",
                        share.id
                    ))
                })?;
            let refund = -cost.total_value;
            if !(refund.is_finite() && refund >= 0.0) {
                return Err(EngineError::InvalidMarketState(format!(
                    "share {} has an invalid cost basis {}",
                    share.id, cost.total_value
                )));
            }

            balances::apply_delta(
                &mut *tx,
                &share.portfolio_id,
                &market.currency_id,
                refund,
                now,
            )
            .await?;

            let record = TransactionRecord::new(
                share.portfolio_id.clone(),
                TransactionKind::PredictionReimbursement,
                refund,
                market.currency_id.clone(),
                now,
            )
            .with_units(share.amount)
            .with_share(share.id.clone())
            .with_notes(format!(
                "Refund for {:.4} {} shares in cancelled prediction market \"{}\"",
                share.amount, share.choice, market.title
            ));
            transactions::append(&mut *tx, &record).await?;
            total_paid += refund;
        }

        write_pools(&mut *tx, &market, opening.yes_pool, opening.no_pool, now).await?;
        history::append(
            &mut *tx,
            &snapshot(&market.id, opening.yes_pool, opening.no_pool, now),
        )
        .await?;
        tx.commit().await?;

        market.yes_pool = opening.yes_pool;
        market.no_pool = opening.no_pool;
        market.version += 1;

        info!(
            market_id = %market.id,
            refunds = open_shares.len(),
            total_refunded = total_paid,
            "Market cancelled"
        );
        Ok(Settlement {
            market,
            payouts: open_shares.len(),
            total_paid,
        })
    }

    /// Credit `amount` to a portfolio outside any market. Returns the new balance.
    ///
    /// # Errors
    /// `Validation` for a non-positive amount or unknown currency, `NotFound` for
    /// an unknown portfolio.
    pub async fn deposit(
        &self,
        portfolio_id: &PortfolioId,
        currency_id: &CurrencyId,
        amount: f64,
    ) -> Result<f64, EngineError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(EngineError::Validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        self.require_portfolio(portfolio_id).await?;
        if !self.currencies.exists(currency_id).await? {
            return Err(EngineError::Validation(format!(
                "unknown currency {}",
                currency_id
            )));
        }

        let now = TimeMs::now();
        let mut tx = self.repo.begin().await?;
        let balance = balances::apply_delta(&mut *tx, portfolio_id, currency_id, amount, now).await?;
        let record = TransactionRecord::new(
            portfolio_id.clone(),
            TransactionKind::Deposit,
            amount,
            currency_id.clone(),
            now,
        );
        transactions::append(&mut *tx, &record).await?;
        tx.commit().await?;

        info!(portfolio_id = %portfolio_id, currency_id = %currency_id, amount, balance, "Deposit credited");
        Ok(balance)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Markets with their history, in the order of `market_ids`. Unknown ids are skipped.
    pub async fn get_market_data(
        &self,
        market_ids: &[MarketId],
    ) -> Result<Vec<MarketData>, EngineError> {
        // One read transaction gives every market and its history the same snapshot.
        let mut tx = self.repo.begin().await?;
        let mut data = Vec::with_capacity(market_ids.len());
        for id in market_ids {
            let Some(market) = markets::get(&mut *tx, id).await? else {
                debug!(market_id = %id, "Market not found, skipping");
                continue;
            };
            let history = history::list_for_market(&mut *tx, id).await?;
            data.push(MarketData { market, history });
        }
        tx.commit().await?;
        Ok(data)
    }

    pub async fn list_markets(&self) -> Result<MarketList, EngineError> {
        let markets = self.repo.list_markets().await?;
        let total_count = markets.len();
        Ok(MarketList {
            markets,
            total_count,
        })
    }

    /// Open and settled positions of a portfolio, optionally limited to `market_ids`.
    pub async fn list_positions(
        &self,
        portfolio_id: &PortfolioId,
        market_ids: Option<&[MarketId]>,
    ) -> Result<Vec<Share>, EngineError> {
        self.require_portfolio(portfolio_id).await?;
        Ok(self.repo.list_positions(portfolio_id, market_ids).await?)
    }

    pub async fn get_balance(
        &self,
        portfolio_id: &PortfolioId,
        currency_id: &CurrencyId,
    ) -> Result<f64, EngineError> {
        self.require_portfolio(portfolio_id).await?;
        Ok(self.repo.get_balance(portfolio_id, currency_id).await?)
    }

    pub async fn list_balances(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<PortfolioBalance>, EngineError> {
        self.require_portfolio(portfolio_id).await?;
        Ok(self.repo.list_balances(portfolio_id).await?)
    }

    pub async fn list_transactions(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<TransactionRecord>, EngineError> {
        self.require_portfolio(portfolio_id).await?;
        Ok(self.repo.list_transactions(portfolio_id).await?)
    }

    async fn require_portfolio(&self, portfolio_id: &PortfolioId) -> Result<(), EngineError> {
        if self.portfolios.exists(portfolio_id).await? {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("portfolio {}", portfolio_id)))
        }
    }
}

/// Take the write lock on a market row and return the row.
async fn lock_market(conn: &mut SqliteConnection, market_id: &MarketId) -> Result<Market, EngineError> {
    markets::lock(conn, market_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("market {}", market_id)))
}

/// Lock a market and require it to be pending.
async fn lock_open_market(
    conn: &mut SqliteConnection,
    market_id: &MarketId,
) -> Result<Market, EngineError> {
    let market = lock_market(conn, market_id).await?;
    if !market.status.is_open() {
        return Err(not_open(market_id));
    }
    Ok(market)
}

fn not_open(market_id: &MarketId) -> EngineError {
    warn!(market_id = %market_id, "Market is not pending");
    EngineError::MarketNotOpen(format!("market {} is not pending", market_id))
}

/// Compare-and-set the pools of a locked market.
async fn write_pools(
    conn: &mut SqliteConnection,
    market: &Market,
    yes_pool: f64,
    no_pool: f64,
    now: TimeMs,
) -> Result<(), EngineError> {
    if markets::update_pools(conn, &market.id, market.version, yes_pool, no_pool, now).await? {
        Ok(())
    } else {
        warn!(market_id = %market.id, version = market.version, "Pool write lost compare-and-set");
        Err(EngineError::ConcurrencyConflict(format!(
            "market {} changed during the operation",
            market.id
        )))
    }
}

fn ensure_product_preserved(market: &Market, yes_after: f64, no_after: f64) -> Result<(), EngineError> {
    if pool_math::preserves_product((market.yes_pool, market.no_pool), (yes_after, no_after)) {
        Ok(())
    } else {
        Err(EngineError::InvalidMarketState(format!(
            "pool product drifted from {} to {}",
            market.pool_product(),
            yes_after * no_after
        )))
    }
}

fn snapshot(market_id: &MarketId, yes_pool: f64, no_pool: f64, now: TimeMs) -> HistoryEntry {
    HistoryEntry {
        seq: 0,
        market_id: market_id.clone(),
        yes_pool,
        no_pool,
        probability: pool_math::probability(yes_pool, no_pool, Side::Yes),
        recorded_at: now,
    }
}
