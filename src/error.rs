use crate::engine::pool_math::PoolMathError;
use crate::registry::RegistryError;
use thiserror::Error;

/// Failure of a market engine operation.
///
/// Every variant is returned only after the enclosing transaction rolled back,
/// so a failed call leaves markets, shares, balances and logs untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Market not open: {0}")]
    MarketNotOpen(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: f64, available: f64 },
    #[error("Invalid market state: {0}")]
    InvalidMarketState(String),
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("Registry error: {0}")]
    Registry(String),
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl EngineError {
    /// Whether the caller may simply retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        if is_lock_contention(&err) {
            EngineError::ConcurrencyConflict(err.to_string())
        } else {
            EngineError::Database(err)
        }
    }
}

impl From<PoolMathError> for EngineError {
    fn from(err: PoolMathError) -> Self {
        match err {
            PoolMathError::NonPositiveAmount(_) => EngineError::Validation(err.to_string()),
            other => EngineError::InvalidMarketState(other.to_string()),
        }
    }
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Database(db) => EngineError::from(db),
            RegistryError::Unavailable(msg) => EngineError::Registry(msg),
        }
    }
}

/// SQLite primary result codes for lock contention.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// True for SQLite BUSY/LOCKED, including extended codes such as BUSY_SNAPSHOT.
fn is_lock_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i64>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(EngineError::ConcurrencyConflict("busy".into()).is_retryable());
        assert!(!EngineError::MarketNotOpen("m".into()).is_retryable());
        assert!(!EngineError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_conflict() {
        let err = EngineError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, EngineError::ConcurrencyConflict(_)));
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err = EngineError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, EngineError::Database(_)));
    }

    #[test]
    fn test_pool_math_error_mapping() {
        let err = EngineError::from(PoolMathError::NonPositiveAmount(0.0));
        assert!(matches!(err, EngineError::Validation(_)));

        let err = EngineError::from(PoolMathError::NegativeDiscriminant(-1.0));
        assert!(matches!(err, EngineError::InvalidMarketState(_)));
    }

    #[test]
    fn test_registry_error_mapping() {
        let err = EngineError::from(RegistryError::Unavailable("offline".into()));
        assert!(matches!(err, EngineError::Registry(ref msg) if msg == "offline"));

        let err = EngineError::from(RegistryError::Database(sqlx::Error::PoolTimedOut));
        assert!(err.is_retryable());
    }
}
