//! Portfolio currency balances.

use super::Repository;
use crate::domain::{CurrencyId, PortfolioBalance, PortfolioId, TimeMs};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

/// Current balance, 0 when the portfolio never held the currency.
pub async fn get(
    conn: &mut SqliteConnection,
    portfolio_id: &PortfolioId,
    currency_id: &CurrencyId,
) -> Result<f64, sqlx::Error> {
    let row: Option<(f64,)> = sqlx::query_as(
        "SELECT amount FROM portfolio_balances WHERE portfolio_id = ? AND currency_id = ?",
    )
    .bind(portfolio_id.as_str())
    .bind(currency_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(amount,)| amount).unwrap_or(0.0))
}

/// Add `delta` to the balance, creating the row with `delta` if absent.
///
/// Negative `delta` debits. Returns the balance after the change.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    portfolio_id: &PortfolioId,
    currency_id: &CurrencyId,
    delta: f64,
    now: TimeMs,
) -> Result<f64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO portfolio_balances (portfolio_id, currency_id, amount, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(portfolio_id, currency_id) DO UPDATE SET
            amount = amount + excluded.amount,
            updated_at = excluded.updated_at
        RETURNING amount
        "#,
    )
    .bind(portfolio_id.as_str())
    .bind(currency_id.as_str())
    .bind(delta)
    .bind(now.as_i64())
    .fetch_one(&mut *conn)
    .await?;

    row.try_get("amount")
}

impl Repository {
    /// Balance of one currency for a portfolio, 0 when absent.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_balance(
        &self,
        portfolio_id: &PortfolioId,
        currency_id: &CurrencyId,
    ) -> Result<f64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        get(&mut *conn, portfolio_id, currency_id).await
    }

    /// All balances held by a portfolio.
    pub async fn list_balances(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<PortfolioBalance>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT portfolio_id, currency_id, amount, updated_at
            FROM portfolio_balances
            WHERE portfolio_id = ?
            ORDER BY currency_id ASC
            "#,
        )
        .bind(portfolio_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(PortfolioBalance {
                    portfolio_id: PortfolioId::new(row.try_get::<String, _>("portfolio_id")?),
                    currency_id: CurrencyId::new(row.try_get::<String, _>("currency_id")?),
                    amount: row.try_get("amount")?,
                    updated_at: TimeMs::new(row.try_get("updated_at")?),
                })
            })
            .collect()
    }
}
