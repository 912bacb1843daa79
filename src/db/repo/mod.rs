//! Repository layer for database operations.
//!
//! `Repository` owns the connection pool and serves pooled reads. Writes live in
//! one submodule per entity as free functions over a `&mut SqliteConnection`, so
//! the engine can compose them inside a single transaction:
//! - `markets.rs` - market rows, row lock, pool compare-and-set, status transitions
//! - `shares.rs` - share positions
//! - `history.rs` - append-only pool history
//! - `balances.rs` - portfolio currency balances (upsert by delta)
//! - `transactions.rs` - append-only transaction log

pub mod balances;
pub mod history;
pub mod markets;
pub mod shares;
pub mod transactions;

use crate::domain::{CurrencyId, ParseEnumError, PortfolioId, TimeMs};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;
use std::str::FromStr;
use tracing::info;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Start a transaction. Dropping it without commit rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Close every pooled connection. Pending acquisitions fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }

    // =========================================================================
    // Collaborator rows (currencies, portfolios)
    // =========================================================================

    /// Register a currency. Idempotent on `id`.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_currency(
        &self,
        id: &CurrencyId,
        name: &str,
        symbol: &str,
        is_real_world: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO currencies (id, name, symbol, is_real_world)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.as_str())
        .bind(name)
        .bind(symbol)
        .bind(is_real_world)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Register a portfolio. Idempotent on `id`.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_portfolio(
        &self,
        id: &PortfolioId,
        owner_id: &str,
        name: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO portfolios (id, owner_id, name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.as_str())
        .bind(owner_id)
        .bind(name)
        .bind(TimeMs::now().as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn currency_exists(&self, id: &CurrencyId) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM currencies WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn portfolio_exists(&self, id: &PortfolioId) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM portfolios WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

/// Parse an enumerated TEXT column into its domain type.
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseEnumError>,
{
    value.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Error for a column that must be set for this row's kind but is NULL.
pub(crate) fn missing_column(column: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: "unexpected NULL".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::Side;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_insert_currency_idempotent() {
        let (repo, _temp) = setup_test_db().await;
        let id = CurrencyId::new("pts");

        assert!(repo.insert_currency(&id, "Points", "P", false).await.unwrap());
        assert!(!repo.insert_currency(&id, "Points", "P", false).await.unwrap());
        assert!(repo.currency_exists(&id).await.unwrap());
        assert!(!repo.currency_exists(&CurrencyId::new("usd")).await.unwrap());
    }

    #[tokio::test]
    async fn test_portfolio_exists() {
        let (repo, _temp) = setup_test_db().await;
        let id = PortfolioId::new("pf-1");

        assert!(!repo.portfolio_exists(&id).await.unwrap());
        repo.insert_portfolio(&id, "user-1", "Main").await.unwrap();
        assert!(repo.portfolio_exists(&id).await.unwrap());
    }

    #[test]
    fn test_parse_column_reports_column() {
        let err = parse_column::<Side>("maybe", "choice").unwrap_err();
        match err {
            sqlx::Error::ColumnDecode { index, .. } => assert_eq!(index, "choice"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
