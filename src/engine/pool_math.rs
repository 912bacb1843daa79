//! Constant-product pool arithmetic.
//!
//! Pure functions over `(yes_pool, no_pool)`. A buy adds the paid amount to the
//! counter pool and shrinks the bought pool so that `yes_pool * no_pool` is
//! unchanged; a sell is the inverse, solved as a quadratic in the sale price.

use crate::domain::Side;
use thiserror::Error;

/// Relative tolerance for the pool product invariant.
pub const PRODUCT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolMathError {
    #[error("amount must be a positive finite number, got {0}")]
    NonPositiveAmount(f64),
    #[error("pools must be positive and finite, got yes={yes_pool} no={no_pool}")]
    InvalidPools { yes_pool: f64, no_pool: f64 },
    #[error("negative discriminant: {0}")]
    NegativeDiscriminant(f64),
    #[error("sale price must not be negative, got {0}")]
    NegativeSalePrice(f64),
    #[error("trade would leave a non-positive pool: yes={yes_pool} no={no_pool}")]
    NonPositiveResult { yes_pool: f64, no_pool: f64 },
}

/// Result of buying into a pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyOutcome {
    pub shares_bought: f64,
    pub yes_pool_after: f64,
    pub no_pool_after: f64,
}

/// Result of selling shares back into a pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellOutcome {
    pub sale_price: f64,
    pub yes_pool_after: f64,
    pub no_pool_after: f64,
}

/// Implied price of `side`: the opposing pool's share of the total.
///
/// Returns 0.5 for an empty market.
pub fn probability(yes_pool: f64, no_pool: f64, side: Side) -> f64 {
    let total = yes_pool + no_pool;
    if total == 0.0 {
        return 0.5;
    }
    pool_of(yes_pool, no_pool, side.opposite()) / total
}

/// Spend `amount` on `side`.
///
/// # Errors
/// `NonPositiveAmount` unless `amount > 0`, `InvalidPools` for a broken pool state.
pub fn buy(yes_pool: f64, no_pool: f64, amount: f64, side: Side) -> Result<BuyOutcome, PoolMathError> {
    check_amount(amount)?;
    check_pools(yes_pool, no_pool)?;

    let buy_pool = pool_of(yes_pool, no_pool, side);
    let counter_pool = pool_of(yes_pool, no_pool, side.opposite());

    let constant = buy_pool * counter_pool;
    let new_counter_pool = counter_pool + amount;
    let new_buy_pool = constant / new_counter_pool;
    let shares_bought = amount + (buy_pool - new_buy_pool);

    let (yes_pool_after, no_pool_after) = match side {
        Side::Yes => (new_buy_pool, new_counter_pool),
        Side::No => (new_counter_pool, new_buy_pool),
    };

    Ok(BuyOutcome {
        shares_bought,
        yes_pool_after,
        no_pool_after,
    })
}

/// Sell `share_amount` shares of `side` back to the pools.
///
/// The shares are added to their pool, then the price `s` is the smaller root of
/// `(yes' - s)(no' - s) = k`, i.e. `s² - (yes' + no')s + (yes'·no' - k) = 0`.
///
/// # Errors
/// `NonPositiveAmount`, `InvalidPools`, `NegativeDiscriminant`, `NegativeSalePrice`
/// or `NonPositiveResult`.
pub fn sell(
    yes_pool: f64,
    no_pool: f64,
    share_amount: f64,
    side: Side,
) -> Result<SellOutcome, PoolMathError> {
    check_amount(share_amount)?;
    check_pools(yes_pool, no_pool)?;

    let k = yes_pool * no_pool;
    let (new_yes_pool, new_no_pool) = match side {
        Side::Yes => (yes_pool + share_amount, no_pool),
        Side::No => (yes_pool, no_pool + share_amount),
    };

    let b = -(new_yes_pool + new_no_pool);
    let c = new_yes_pool * new_no_pool - k;
    let discriminant = b * b - 4.0 * c;
    if discriminant < 0.0 {
        return Err(PoolMathError::NegativeDiscriminant(discriminant));
    }

    // Smaller root in the cancellation-free form 2c / (-b + √D).
    let sale_price = 2.0 * c / (-b + discriminant.sqrt());
    if !sale_price.is_finite() || sale_price < 0.0 {
        return Err(PoolMathError::NegativeSalePrice(sale_price));
    }

    let yes_pool_after = new_yes_pool - sale_price;
    let no_pool_after = new_no_pool - sale_price;
    if !(yes_pool_after > 0.0 && no_pool_after > 0.0) {
        return Err(PoolMathError::NonPositiveResult {
            yes_pool: yes_pool_after,
            no_pool: no_pool_after,
        });
    }

    Ok(SellOutcome {
        sale_price,
        yes_pool_after,
        no_pool_after,
    })
}

/// True when `after` keeps the product of `before` within [`PRODUCT_TOLERANCE`].
pub fn preserves_product(before: (f64, f64), after: (f64, f64)) -> bool {
    let k_before = before.0 * before.1;
    let k_after = after.0 * after.1;
    (k_after - k_before).abs() <= PRODUCT_TOLERANCE * k_before.abs().max(1.0)
}

fn pool_of(yes_pool: f64, no_pool: f64, side: Side) -> f64 {
    match side {
        Side::Yes => yes_pool,
        Side::No => no_pool,
    }
}

fn check_amount(amount: f64) -> Result<(), PoolMathError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(PoolMathError::NonPositiveAmount(amount))
    }
}

fn check_pools(yes_pool: f64, no_pool: f64) -> Result<(), PoolMathError> {
    let valid = |p: f64| p.is_finite() && p > 0.0;
    if valid(yes_pool) && valid(no_pool) {
        Ok(())
    } else {
        Err(PoolMathError::InvalidPools { yes_pool, no_pool })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn test_probability_sides_sum_to_one() {
        for (y, n) in [(500.0, 500.0), (357.14, 700.0), (1.0, 9999.0), (0.001, 0.002)] {
            let sum = probability(y, n, Side::Yes) + probability(y, n, Side::No);
            assert!(close(sum, 1.0, EPS), "sum {} for ({}, {})", sum, y, n);
        }
    }

    #[test]
    fn test_probability_equal_pools_is_half() {
        assert_eq!(probability(250.0, 250.0, Side::Yes), 0.5);
        assert_eq!(probability(250.0, 250.0, Side::No), 0.5);
    }

    #[test]
    fn test_probability_empty_market_is_half() {
        assert_eq!(probability(0.0, 0.0, Side::Yes), 0.5);
        assert_eq!(probability(0.0, 0.0, Side::No), 0.5);
    }

    #[test]
    fn test_buy_yes_from_even_pools() {
        let out = buy(500.0, 500.0, 200.0, Side::Yes).unwrap();

        assert_eq!(out.no_pool_after, 700.0);
        assert!(close(out.yes_pool_after, 250_000.0 / 700.0, EPS));
        assert!(close(out.shares_bought, 200.0 + 500.0 - 250_000.0 / 700.0, EPS));
        assert!(close(out.shares_bought, 342.857_142_857, 1e-6));

        let p = probability(out.yes_pool_after, out.no_pool_after, Side::Yes);
        assert!(close(p, 0.662_162, 1e-6));
    }

    #[test]
    fn test_buy_no_mirrors_yes() {
        let yes = buy(500.0, 500.0, 200.0, Side::Yes).unwrap();
        let no = buy(500.0, 500.0, 200.0, Side::No).unwrap();

        assert_eq!(yes.shares_bought, no.shares_bought);
        assert_eq!(yes.yes_pool_after, no.no_pool_after);
        assert_eq!(yes.no_pool_after, no.yes_pool_after);
    }

    #[test]
    fn test_buy_always_returns_more_shares_than_paid() {
        for (y, n, amount, side) in [
            (500.0, 500.0, 1.0, Side::Yes),
            (100.0, 900.0, 50.0, Side::Yes),
            (900.0, 100.0, 50.0, Side::No),
            (10.0, 10.0, 10_000.0, Side::No),
        ] {
            let out = buy(y, n, amount, side).unwrap();
            assert!(out.shares_bought > amount);
            let bought_pool_before = if side == Side::Yes { y } else { n };
            let bought_pool_after = if side == Side::Yes {
                out.yes_pool_after
            } else {
                out.no_pool_after
            };
            assert!(bought_pool_after < bought_pool_before);
            assert!(preserves_product((y, n), (out.yes_pool_after, out.no_pool_after)));
        }
    }

    #[test]
    fn test_buy_rejects_non_positive_amount() {
        assert_eq!(
            buy(500.0, 500.0, 0.0, Side::Yes),
            Err(PoolMathError::NonPositiveAmount(0.0))
        );
        assert!(matches!(
            buy(500.0, 500.0, -5.0, Side::No),
            Err(PoolMathError::NonPositiveAmount(_))
        ));
        assert!(matches!(
            buy(500.0, 500.0, f64::NAN, Side::No),
            Err(PoolMathError::NonPositiveAmount(_))
        ));
    }

    #[test]
    fn test_buy_rejects_broken_pools() {
        assert!(matches!(
            buy(0.0, 500.0, 10.0, Side::Yes),
            Err(PoolMathError::InvalidPools { .. })
        ));
    }

    #[test]
    fn test_sell_immediately_after_buy_round_trips() {
        let bought = buy(500.0, 500.0, 200.0, Side::Yes).unwrap();
        let sold = sell(
            bought.yes_pool_after,
            bought.no_pool_after,
            bought.shares_bought,
            Side::Yes,
        )
        .unwrap();

        assert!(close(sold.sale_price, 200.0, 1e-9));
        assert!(close(sold.yes_pool_after, 500.0, 1e-9));
        assert!(close(sold.no_pool_after, 500.0, 1e-9));
    }

    #[test]
    fn test_sell_preserves_product() {
        for (y, n, shares, side) in [
            (500.0, 500.0, 10.0, Side::Yes),
            (357.0, 700.0, 342.0, Side::Yes),
            (120.0, 2000.0, 75.5, Side::No),
            (1.0, 1.0, 1000.0, Side::No),
        ] {
            let out = sell(y, n, shares, side).unwrap();
            assert!(out.sale_price >= 0.0);
            assert!(out.sale_price < shares);
            assert!(out.yes_pool_after > 0.0 && out.no_pool_after > 0.0);
            assert!(preserves_product((y, n), (out.yes_pool_after, out.no_pool_after)));
        }
    }

    #[test]
    fn test_sell_rejects_non_positive_amount() {
        assert!(matches!(
            sell(500.0, 500.0, 0.0, Side::Yes),
            Err(PoolMathError::NonPositiveAmount(_))
        ));
    }

    #[test]
    fn test_preserves_product_detects_drift() {
        assert!(preserves_product((500.0, 500.0), (250.0, 1000.0)));
        assert!(!preserves_product((500.0, 500.0), (250.0, 1000.1)));
    }
}
