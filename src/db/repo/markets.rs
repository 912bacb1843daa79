//! Market rows.

use super::{missing_column, parse_column, Repository};
use crate::domain::{
    CurrencyId, Direction, Market, MarketId, MarketStatus, MarketTerms, Side, TimeMs,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

const MARKET_COLUMNS: &str = "id, kind, status, result, title, description, yes_pool, no_pool, \
     currency_id, decider_id, asset_id, target_price, direction, end_date, created_at, \
     updated_at, version";

fn market_from_row(row: &SqliteRow) -> Result<Market, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let terms = match kind.as_str() {
        "binary_text" => MarketTerms::BinaryText {
            decider_id: row.try_get("decider_id")?,
        },
        "price_target" => {
            let direction: Option<String> = row.try_get("direction")?;
            let direction = direction.ok_or_else(|| missing_column("direction"))?;
            MarketTerms::PriceTarget {
                asset_id: row
                    .try_get::<Option<String>, _>("asset_id")?
                    .ok_or_else(|| missing_column("asset_id"))?,
                target_price: row
                    .try_get::<Option<f64>, _>("target_price")?
                    .ok_or_else(|| missing_column("target_price"))?,
                direction: parse_column::<Direction>(&direction, "direction")?,
            }
        }
        other => {
            return Err(sqlx::Error::ColumnDecode {
                index: "kind".to_string(),
                source: format!("unknown market kind {}", other).into(),
            })
        }
    };

    let status: String = row.try_get("status")?;
    let result: Option<String> = row.try_get("result")?;
    let result = match result {
        Some(r) => Some(parse_column::<Side>(&r, "result")?),
        None => None,
    };

    Ok(Market {
        id: MarketId::new(row.try_get::<String, _>("id")?),
        terms,
        status: parse_column::<MarketStatus>(&status, "status")?,
        result,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        yes_pool: row.try_get("yes_pool")?,
        no_pool: row.try_get("no_pool")?,
        currency_id: CurrencyId::new(row.try_get::<String, _>("currency_id")?),
        end_date: TimeMs::new(row.try_get("end_date")?),
        created_at: TimeMs::new(row.try_get("created_at")?),
        updated_at: TimeMs::new(row.try_get("updated_at")?),
        version: row.try_get("version")?,
    })
}

/// Insert a new market row.
pub async fn insert(conn: &mut SqliteConnection, market: &Market) -> Result<(), sqlx::Error> {
    let (decider_id, asset_id, target_price, direction) = match &market.terms {
        MarketTerms::BinaryText { decider_id } => (decider_id.as_deref(), None, None, None),
        MarketTerms::PriceTarget {
            asset_id,
            target_price,
            direction,
        } => (
            None,
            Some(asset_id.as_str()),
            Some(*target_price),
            Some(direction.as_str()),
        ),
    };

    sqlx::query(
        r#"
        INSERT INTO prediction_markets (
            id, kind, status, result, title, description, yes_pool, no_pool,
            currency_id, decider_id, asset_id, target_price, direction,
            end_date, created_at, updated_at, version
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(market.id.as_str())
    .bind(market.terms.kind())
    .bind(market.status.as_str())
    .bind(market.result.map(|s| s.as_str()))
    .bind(&market.title)
    .bind(market.description.as_deref())
    .bind(market.yes_pool)
    .bind(market.no_pool)
    .bind(market.currency_id.as_str())
    .bind(decider_id)
    .bind(asset_id)
    .bind(target_price)
    .bind(direction)
    .bind(market.end_date.as_i64())
    .bind(market.created_at.as_i64())
    .bind(market.updated_at.as_i64())
    .bind(market.version)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load a market while taking the database write lock.
///
/// Must be the first statement of a transaction: the no-op write acquires the
/// lock before any read, so no other writer can interleave until commit.
pub async fn lock(conn: &mut SqliteConnection, id: &MarketId) -> Result<Option<Market>, sqlx::Error> {
    let sql = format!(
        "UPDATE prediction_markets SET version = version WHERE id = ? RETURNING {}",
        MARKET_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(market_from_row).transpose()
}

/// Compare-and-set the pools against `expected_version`.
///
/// Returns false when the row changed since it was read.
pub async fn update_pools(
    conn: &mut SqliteConnection,
    id: &MarketId,
    expected_version: i64,
    yes_pool: f64,
    no_pool: f64,
    now: TimeMs,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE prediction_markets
        SET yes_pool = ?, no_pool = ?, version = version + 1, updated_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(yes_pool)
    .bind(no_pool)
    .bind(now.as_i64())
    .bind(id.as_str())
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move a market out of `pending` in one conditional statement.
///
/// Returns the updated row, or None when the market is missing or no longer pending.
pub async fn close_pending(
    conn: &mut SqliteConnection,
    id: &MarketId,
    status: MarketStatus,
    result: Option<Side>,
    now: TimeMs,
) -> Result<Option<Market>, sqlx::Error> {
    let sql = format!(
        "UPDATE prediction_markets SET status = ?, result = ?, updated_at = ? \
         WHERE id = ? AND status = 'pending' RETURNING {}",
        MARKET_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(status.as_str())
        .bind(result.map(|s| s.as_str()))
        .bind(now.as_i64())
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(market_from_row).transpose()
}

/// Read a market without locking.
pub async fn get(conn: &mut SqliteConnection, id: &MarketId) -> Result<Option<Market>, sqlx::Error> {
    let sql = format!("SELECT {} FROM prediction_markets WHERE id = ?", MARKET_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(market_from_row).transpose()
}

impl Repository {
    /// Get a market by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_market(&self, id: &MarketId) -> Result<Option<Market>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        get(&mut *conn, id).await
    }

    /// All markets, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_markets(&self) -> Result<Vec<Market>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM prediction_markets ORDER BY created_at DESC, id ASC",
            MARKET_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(market_from_row).collect()
    }

    pub async fn count_markets(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM prediction_markets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
