//! Portfolio balances and the append-only transaction log.

use crate::domain::{CurrencyId, ParseEnumError, PortfolioId, ShareId, TimeMs, TransactionId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Balance of one currency held by one portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioBalance {
    pub portfolio_id: PortfolioId,
    pub currency_id: CurrencyId,
    pub amount: f64,
    pub updated_at: TimeMs,
}

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    PredictionCost,
    PredictionSale,
    PredictionWin,
    PredictionDraw,
    PredictionReimbursement,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::PredictionCost => "prediction_cost",
            TransactionKind::PredictionSale => "prediction_sale",
            TransactionKind::PredictionWin => "prediction_win",
            TransactionKind::PredictionDraw => "prediction_draw",
            TransactionKind::PredictionReimbursement => "prediction_reimbursement",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "prediction_cost" => Ok(TransactionKind::PredictionCost),
            "prediction_sale" => Ok(TransactionKind::PredictionSale),
            "prediction_win" => Ok(TransactionKind::PredictionWin),
            "prediction_draw" => Ok(TransactionKind::PredictionDraw),
            "prediction_reimbursement" => Ok(TransactionKind::PredictionReimbursement),
            other => Err(ParseEnumError::new("transaction kind", other)),
        }
    }
}

/// One row of the audit trail. Never updated or deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub portfolio_id: PortfolioId,
    pub kind: TransactionKind,
    /// Signed value in `to_currency_id`: negative for money leaving the portfolio.
    pub total_value: f64,
    pub amount_of_units: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub fee: f64,
    pub from_currency_id: CurrencyId,
    pub to_currency_id: CurrencyId,
    pub share_id: Option<ShareId>,
    pub executed_at: TimeMs,
    pub notes: Option<String>,
}

impl TransactionRecord {
    /// A fee-free record in a single currency executed at `executed_at`.
    pub fn new(
        portfolio_id: PortfolioId,
        kind: TransactionKind,
        total_value: f64,
        currency_id: CurrencyId,
        executed_at: TimeMs,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            portfolio_id,
            kind,
            total_value,
            amount_of_units: None,
            price_per_unit: None,
            fee: 0.0,
            from_currency_id: currency_id.clone(),
            to_currency_id: currency_id,
            share_id: None,
            executed_at,
            notes: None,
        }
    }

    /// Attach the traded units and derive the per-unit price from `total_value`.
    pub fn with_units(mut self, units: f64) -> Self {
        self.amount_of_units = Some(units);
        if units > 0.0 {
            self.price_per_unit = Some(self.total_value.abs() / units);
        }
        self
    }

    pub fn with_price_per_unit(mut self, price: f64) -> Self {
        self.price_per_unit = Some(price);
        self
    }

    pub fn with_share(mut self, share_id: ShareId) -> Self {
        self.share_id = Some(share_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
