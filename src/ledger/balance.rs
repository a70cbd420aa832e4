//! Safe locking and balance writes shared by the voucher and transfer ledgers.

use crate::error::{LedgerError, Result};
use crate::model::{EntityKind, Safe, SafeId};
use crate::store::LedgerTx;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Lock an active safe for the rest of the unit of work.
pub(crate) fn lock_active_safe(tx: &mut dyn LedgerTx, id: SafeId) -> Result<Safe> {
    match tx.lock_safe(id)? {
        Some(safe) if safe.state.is_active() => Ok(safe),
        _ => Err(LedgerError::not_found(EntityKind::Safe, id)),
    }
}

/// Lock two distinct safes in ascending id order; returned in argument order.
pub(crate) fn lock_pair(tx: &mut dyn LedgerTx, a: SafeId, b: SafeId) -> Result<(Safe, Safe)> {
    if a <= b {
        let first = lock_active_safe(tx, a)?;
        let second = lock_active_safe(tx, b)?;
        Ok((first, second))
    } else {
        let second = lock_active_safe(tx, b)?;
        let first = lock_active_safe(tx, a)?;
        Ok((first, second))
    }
}

/// Persist a balance already checked with
/// [`balance_after`](crate::validation::balance_after). Callers never pass a negative
/// balance.
pub(crate) fn store_balance(
    tx: &mut dyn LedgerTx,
    safe: &mut Safe,
    balance: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    debug_assert!(
        balance >= Decimal::ZERO,
        "negative balance {balance} for safe {}",
        safe.id
    );
    safe.balance = balance;
    safe.updated_at = now;
    tx.update_safe(safe)?;
    Ok(())
}
