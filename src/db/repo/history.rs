//! Append-only market history.

use super::Repository;
use crate::domain::{HistoryEntry, MarketId, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

fn entry_from_row(row: &SqliteRow) -> Result<HistoryEntry, sqlx::Error> {
    Ok(HistoryEntry {
        seq: row.try_get("seq")?,
        market_id: MarketId::new(row.try_get::<String, _>("market_id")?),
        yes_pool: row.try_get("yes_pool")?,
        no_pool: row.try_get("no_pool")?,
        probability: row.try_get("probability")?,
        recorded_at: TimeMs::new(row.try_get("recorded_at")?),
    })
}

/// Append an entry. `entry.seq` is ignored; the assigned sequence is returned.
pub async fn append(conn: &mut SqliteConnection, entry: &HistoryEntry) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO prediction_market_history (market_id, yes_pool, no_pool, probability, recorded_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.market_id.as_str())
    .bind(entry.yes_pool)
    .bind(entry.no_pool)
    .bind(entry.probability)
    .bind(entry.recorded_at.as_i64())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// The opening entry written when the market was created.
pub async fn first_for_market(
    conn: &mut SqliteConnection,
    market_id: &MarketId,
) -> Result<Option<HistoryEntry>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT seq, market_id, yes_pool, no_pool, probability, recorded_at
        FROM prediction_market_history
        WHERE market_id = ?
        ORDER BY seq ASC
        LIMIT 1
        "#,
    )
    .bind(market_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// History of a market in append order.
///
/// `seq` is assigned under the market's write lock, so this is commit order and
/// `recorded_at` is non-decreasing along it.
pub async fn list_for_market(
    conn: &mut SqliteConnection,
    market_id: &MarketId,
) -> Result<Vec<HistoryEntry>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT seq, market_id, yes_pool, no_pool, probability, recorded_at
        FROM prediction_market_history
        WHERE market_id = ?
        ORDER BY seq ASC
        "#,
    )
    .bind(market_id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

impl Repository {
    /// History of a market in append order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn market_history(&self, market_id: &MarketId) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        list_for_market(&mut *conn, market_id).await
    }
}
