//! Append-only transaction log.

use super::{parse_column, Repository};
use crate::domain::{
    CurrencyId, PortfolioId, ShareId, TimeMs, TransactionId, TransactionKind, TransactionRecord,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

const TRANSACTION_COLUMNS: &str = "id, portfolio_id, kind, total_value, amount_of_units, \
     price_per_unit, fee, from_currency_id, to_currency_id, share_id, executed_at, notes";

fn record_from_row(row: &SqliteRow) -> Result<TransactionRecord, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    Ok(TransactionRecord {
        id: TransactionId::new(row.try_get::<String, _>("id")?),
        portfolio_id: PortfolioId::new(row.try_get::<String, _>("portfolio_id")?),
        kind: parse_column::<TransactionKind>(&kind, "kind")?,
        total_value: row.try_get("total_value")?,
        amount_of_units: row.try_get("amount_of_units")?,
        price_per_unit: row.try_get("price_per_unit")?,
        fee: row.try_get("fee")?,
        from_currency_id: CurrencyId::new(row.try_get::<String, _>("from_currency_id")?),
        to_currency_id: CurrencyId::new(row.try_get::<String, _>("to_currency_id")?),
        share_id: row
            .try_get::<Option<String>, _>("share_id")?
            .map(ShareId::new),
        executed_at: TimeMs::new(row.try_get("executed_at")?),
        notes: row.try_get("notes")?,
    })
}

pub async fn append(
    conn: &mut SqliteConnection,
    record: &TransactionRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ledger_transactions (
            id, portfolio_id, kind, total_value, amount_of_units, price_per_unit, fee,
            from_currency_id, to_currency_id, share_id, executed_at, notes
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.as_str())
    .bind(record.portfolio_id.as_str())
    .bind(record.kind.as_str())
    .bind(record.total_value)
    .bind(record.amount_of_units)
    .bind(record.price_per_unit)
    .bind(record.fee)
    .bind(record.from_currency_id.as_str())
    .bind(record.to_currency_id.as_str())
    .bind(record.share_id.as_ref().map(|s| s.as_str()))
    .bind(record.executed_at.as_i64())
    .bind(record.notes.as_deref())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// The purchase record that opened a share, if any.
pub async fn cost_for_share(
    conn: &mut SqliteConnection,
    share_id: &ShareId,
) -> Result<Option<TransactionRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM ledger_transactions WHERE share_id = ? AND kind = ? \
         ORDER BY executed_at ASC LIMIT 1",
        TRANSACTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(share_id.as_str())
        .bind(TransactionKind::PredictionCost.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

impl Repository {
    /// Transactions of a portfolio, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_transactions(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<TransactionRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM ledger_transactions WHERE portfolio_id = ? \
             ORDER BY executed_at DESC, rowid DESC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(portfolio_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }
}
