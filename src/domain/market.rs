//! Prediction market rows and their enumerated fields.

use crate::domain::{CurrencyId, MarketId, ParseEnumError, Side, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Market lifecycle. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Pending,
    Resolved,
    Cancelled,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Pending => "pending",
            MarketStatus::Resolved => "resolved",
            MarketStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, MarketStatus::Pending)
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MarketStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MarketStatus::Pending),
            "resolved" => Ok(MarketStatus::Resolved),
            "cancelled" => Ok(MarketStatus::Cancelled),
            other => Err(ParseEnumError::new("market status", other)),
        }
    }
}

/// Direction a price-target market is betting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "above" => Ok(Direction::Above),
            "below" => Ok(Direction::Below),
            other => Err(ParseEnumError::new("direction", other)),
        }
    }
}

/// Kind-specific terms of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketTerms {
    /// Free-text question settled by a designated decider.
    BinaryText { decider_id: Option<String> },
    /// Asset price question.
    PriceTarget {
        asset_id: String,
        target_price: f64,
        direction: Direction,
    },
}

impl MarketTerms {
    /// Stored `kind` column value.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketTerms::BinaryText { .. } => "binary_text",
            MarketTerms::PriceTarget { .. } => "price_target",
        }
    }
}

/// A binary prediction market backed by two constant-product pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub terms: MarketTerms,
    pub status: MarketStatus,
    /// Only meaningful once `status` is `Resolved`. `None` on a resolved market is a draw.
    pub result: Option<Side>,
    pub title: String,
    pub description: Option<String>,
    pub yes_pool: f64,
    pub no_pool: f64,
    pub currency_id: CurrencyId,
    pub end_date: TimeMs,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
    /// Bumped on every pool write; used as the compare-and-set token.
    pub version: i64,
}

impl Market {
    /// Product of the two pools (the CPMM invariant).
    pub fn pool_product(&self) -> f64 {
        self.yes_pool * self.no_pool
    }
}

/// Input for creating a market.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMarket {
    pub title: String,
    pub description: Option<String>,
    pub end_date: TimeMs,
    pub terms: MarketTerms,
    /// Total opening liquidity, split evenly between the pools.
    pub pool_size: f64,
    pub currency_id: CurrencyId,
}

impl NewMarket {
    /// Free-text market decided by `decider_id`.
    pub fn binary_text(
        title: impl Into<String>,
        description: impl Into<String>,
        end_date: TimeMs,
        decider_id: impl Into<String>,
        pool_size: f64,
        currency_id: CurrencyId,
    ) -> Self {
        Self {
            title: title.into(),
            description: Some(description.into()),
            end_date,
            terms: MarketTerms::BinaryText {
                decider_id: Some(decider_id.into()),
            },
            pool_size,
            currency_id,
        }
    }
}
