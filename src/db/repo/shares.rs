//! Share positions.

use super::{parse_column, Repository};
use crate::domain::{CurrencyId, MarketId, PortfolioId, Share, ShareId, Side, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

const SHARE_COLUMNS: &str = "id, market_id, portfolio_id, choice, amount, currency_id, created_at";

fn share_from_row(row: &SqliteRow) -> Result<Share, sqlx::Error> {
    let choice: String = row.try_get("choice")?;
    Ok(Share {
        id: ShareId::new(row.try_get::<String, _>("id")?),
        market_id: MarketId::new(row.try_get::<String, _>("market_id")?),
        portfolio_id: PortfolioId::new(row.try_get::<String, _>("portfolio_id")?),
        choice: parse_column::<Side>(&choice, "choice")?,
        amount: row.try_get("amount")?,
        currency_id: CurrencyId::new(row.try_get::<String, _>("currency_id")?),
        created_at: TimeMs::new(row.try_get("created_at")?),
    })
}

pub async fn insert(conn: &mut SqliteConnection, share: &Share) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO prediction_market_shares
        (id, market_id, portfolio_id, choice, amount, currency_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(share.id.as_str())
    .bind(share.market_id.as_str())
    .bind(share.portfolio_id.as_str())
    .bind(share.choice.as_str())
    .bind(share.amount)
    .bind(share.currency_id.as_str())
    .bind(share.created_at.as_i64())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load a share only if it belongs to `portfolio_id` in `market_id`.
pub async fn get_owned(
    conn: &mut SqliteConnection,
    id: &ShareId,
    portfolio_id: &PortfolioId,
    market_id: &MarketId,
) -> Result<Option<Share>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM prediction_market_shares WHERE id = ? AND portfolio_id = ? AND market_id = ?",
        SHARE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id.as_str())
        .bind(portfolio_id.as_str())
        .bind(market_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(share_from_row).transpose()
}

pub async fn delete(conn: &mut SqliteConnection, id: &ShareId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM prediction_market_shares WHERE id = ?")
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Shares of a market, optionally only one side, in purchase order.
pub async fn list_for_market(
    conn: &mut SqliteConnection,
    market_id: &MarketId,
    choice: Option<Side>,
) -> Result<Vec<Share>, sqlx::Error> {
    let side_filter = if choice.is_some() { " AND choice = ?" } else { "" };
    let sql = format!(
        "SELECT {} FROM prediction_market_shares WHERE market_id = ?{} ORDER BY created_at ASC, id ASC",
        SHARE_COLUMNS, side_filter
    );

    let mut query = sqlx::query(&sql).bind(market_id.as_str());
    if let Some(choice) = choice {
        query = query.bind(choice.as_str());
    }

    let rows = query.fetch_all(&mut *conn).await?;
    rows.iter().map(share_from_row).collect()
}

impl Repository {
    /// Shares held by a portfolio, optionally restricted to `market_ids`, in purchase order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_positions(
        &self,
        portfolio_id: &PortfolioId,
        market_ids: Option<&[MarketId]>,
    ) -> Result<Vec<Share>, sqlx::Error> {
        let Some(market_ids) = market_ids else {
            let sql = format!(
                "SELECT {} FROM prediction_market_shares WHERE portfolio_id = ? \
                 ORDER BY created_at ASC, id ASC",
                SHARE_COLUMNS
            );
            let rows = sqlx::query(&sql)
                .bind(portfolio_id.as_str())
                .fetch_all(&self.pool)
                .await?;
            return rows.iter().map(share_from_row).collect();
        };

        // SQLite has a 999 parameter limit; one slot goes to the portfolio id.
        const CHUNK_SIZE: usize = 500;
        let mut out = Vec::new();

        for chunk in market_ids.chunks(CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT {} FROM prediction_market_shares WHERE portfolio_id = ? AND market_id IN ({})",
                SHARE_COLUMNS, placeholders
            );

            let mut query = sqlx::query(&sql).bind(portfolio_id.as_str());
            for id in chunk {
                query = query.bind(id.as_str());
            }

            let rows = query.fetch_all(&self.pool).await?;
            for row in &rows {
                out.push(share_from_row(row)?);
            }
        }

        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}
