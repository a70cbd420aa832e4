//! Checks shared by the ledger, ownership and obligation components.
//!
//! Every mutation runs these before touching the store.

use crate::error::{LedgerError, PercentageScope, Result};
use crate::model::Safe;
use rust_decimal::Decimal;

/// 100%.
pub const FULL_SHARE: Decimal = Decimal::ONE_HUNDRED;

/// Fractional digits kept by the `NUMERIC(19,4)` and `NUMERIC(7,4)` columns.
pub const STORED_SCALE: u32 = 4;

/// Exclusive upper bound of a `NUMERIC(19,4)` value: fifteen integer digits.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

fn fits_column(value: Decimal) -> bool {
    value.normalize().scale() <= STORED_SCALE && value.abs() < AMOUNT_LIMIT
}

/// Amounts must be strictly positive and storable without rounding.
pub fn ensure_positive_amount(amount: Decimal) -> Result<Decimal> {
    if amount > Decimal::ZERO && fits_column(amount) {
        Ok(amount)
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

/// Opening balances and unit prices: zero allowed, otherwise as
/// [`ensure_positive_amount`].
pub fn ensure_non_negative_amount(amount: Decimal) -> Result<Decimal> {
    if amount >= Decimal::ZERO && fits_column(amount) {
        Ok(amount)
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

/// Percentages must lie in `(0, 100]` with at most four fractional digits.
pub fn ensure_percentage(percentage: Decimal) -> Result<Decimal> {
    if percentage > Decimal::ZERO
        && percentage <= FULL_SHARE
        && percentage.normalize().scale() <= STORED_SCALE
    {
        Ok(percentage)
    } else {
        Err(LedgerError::InvalidPercentage(percentage))
    }
}

/// `total + amount` for running sums, `InvalidAmount` on overflow.
pub fn checked_total(total: Decimal, amount: Decimal) -> Result<Decimal> {
    total
        .checked_add(amount)
        .ok_or(LedgerError::InvalidAmount(amount))
}

/// Trimmed, non-empty display name.
pub fn ensure_name(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(LedgerError::InvalidInput(format!("{field} must not be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Balance of `safe` after applying `delta`: `InsufficientBalance` if it would go
/// negative, `InvalidAmount` if it would leave the storable range.
pub fn balance_after(safe: &Safe, delta: Decimal) -> Result<Decimal> {
    let next = match safe.balance.checked_add(delta) {
        Some(next) if next < AMOUNT_LIMIT => next,
        _ => return Err(LedgerError::InvalidAmount(delta)),
    };
    if next < Decimal::ZERO {
        Err(LedgerError::InsufficientBalance {
            safe_id: safe.id,
            balance: safe.balance,
            delta,
        })
    } else {
        Ok(next)
    }
}

/// New total for `scope` once `requested` is added to `current`, or
/// `PercentageOverflow` above 100.
pub fn percentage_total(scope: PercentageScope, current: Decimal, requested: Decimal) -> Result<Decimal> {
    let attempted = checked_total(current, requested)?;
    if attempted > FULL_SHARE {
        Err(LedgerError::PercentageOverflow {
            scope,
            current,
            attempted,
        })
    } else {
        Ok(attempted)
    }
}
