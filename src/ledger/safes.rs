//! Safe lifecycle, reconciliation and statements.

use super::balance::lock_active_safe;
use super::instrument;
use crate::error::{LedgerError, Result};
use crate::filter::{TransferFilter, VoucherFilter};
use crate::model::{
    EntityKind, Movement, MovementSource, Reconciliation, RecordState, Safe, SafeId,
};
use crate::store::{LedgerStore, LedgerTx};
use crate::validation::{checked_total, ensure_name, ensure_non_negative_amount};
use chrono::Utc;
use rust_decimal::Decimal;

pub struct SafeStore<'a, S> {
    store: &'a S,
}

impl<'a, S: LedgerStore> SafeStore<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Open a safe. The balance starts at `opening_balance`, which may be zero but not
    /// negative, and must fit the amount column.
    pub fn create(&self, name: &str, opening_balance: Decimal) -> Result<Safe> {
        instrument("safes", "create", || {
            let name = ensure_name("safe name", name)?;
            ensure_non_negative_amount(opening_balance)?;
            let safe = Safe::new(name, opening_balance);
            self.store.transaction(|tx| {
                tx.insert_safe(&safe)?;
                Ok(())
            })?;
            log::debug!("opened safe {} ({})", safe.id, safe.name);
            Ok(safe)
        })
    }

    pub fn get(&self, id: SafeId) -> Result<Safe> {
        self.store.snapshot(|tx| active_safe(tx, id))
    }

    /// Active safes by name.
    pub fn list(&self) -> Result<Vec<Safe>> {
        self.store.snapshot(|tx| Ok(tx.list_safes(false)?))
    }

    pub fn list_all(&self) -> Result<Vec<Safe>> {
        self.store.snapshot(|tx| Ok(tx.list_safes(true)?))
    }

    /// Rename a safe. Balances are never edited directly.
    pub fn rename(&self, id: SafeId, name: &str) -> Result<Safe> {
        instrument("safes", "rename", || {
            let name = ensure_name("safe name", name)?;
            self.store.transaction(|tx| {
                let mut safe = lock_active_safe(tx, id)?;
                safe.name = name;
                safe.updated_at = Utc::now();
                tx.update_safe(&safe)?;
                Ok(safe)
            })
        })
    }

    /// Soft-delete a safe that no active voucher or transfer references.
    pub fn soft_delete(&self, id: SafeId) -> Result<Safe> {
        instrument("safes", "soft_delete", || {
            self.store.transaction(|tx| {
                let mut safe = lock_active_safe(tx, id)?;
                let vouchers = tx.find_vouchers(&VoucherFilter::for_safe(id))?.len();
                let transfers = tx.find_transfers(&TransferFilter::involving(id))?.len();
                let movements = (vouchers + transfers) as u64;
                if movements > 0 {
                    return Err(LedgerError::SafeInUse {
                        safe_id: id,
                        movements,
                    });
                }
                let now = Utc::now();
                safe.state = RecordState::Deleted { at: now };
                safe.updated_at = now;
                tx.update_safe(&safe)?;
                Ok(safe)
            })
        })
    }

    /// Recompute the balance from the opening balance and every active movement and
    /// compare it with the stored one. Works for deleted safes too.
    pub fn reconcile(&self, id: SafeId) -> Result<Reconciliation> {
        self.store.snapshot(|tx| {
            let safe = tx
                .get_safe(id)?
                .ok_or_else(|| LedgerError::not_found(EntityKind::Safe, id))?;
            let computed = statement(tx, &safe)?
                .last()
                .map_or(safe.opening_balance, |line| line.running_balance);
            Ok(Reconciliation {
                safe_id: id,
                recorded: safe.balance,
                computed,
                difference: safe.balance - computed,
            })
        })
    }

    /// Every active movement on the safe in date order, with a running balance.
    pub fn movements(&self, id: SafeId) -> Result<Vec<Movement>> {
        self.store.snapshot(|tx| {
            let safe = active_safe(tx, id)?;
            statement(tx, &safe)
        })
    }
}

fn active_safe(tx: &mut dyn LedgerTx, id: SafeId) -> Result<Safe> {
    match tx.get_safe(id)? {
        Some(safe) if safe.state.is_active() => Ok(safe),
        _ => Err(LedgerError::not_found(EntityKind::Safe, id)),
    }
}

fn statement(tx: &mut dyn LedgerTx, safe: &Safe) -> Result<Vec<Movement>> {
    let vouchers = tx.find_vouchers(&VoucherFilter::for_safe(safe.id))?;
    let transfers = tx.find_transfers(&TransferFilter::involving(safe.id))?;

    let mut lines: Vec<Movement> = vouchers
        .into_iter()
        .map(|v| Movement {
            source: MovementSource::Voucher(v.id),
            date: v.date,
            delta: v.delta(),
            description: v.description,
            running_balance: Decimal::ZERO,
            recorded_at: v.created_at,
        })
        .chain(transfers.into_iter().map(|t| Movement {
            source: MovementSource::Transfer(t.id),
            date: t.date,
            delta: t.delta_for(safe.id),
            description: t.description,
            running_balance: Decimal::ZERO,
            recorded_at: t.created_at,
        }))
        .collect();
    lines.sort_by(|a, b| (a.date, a.recorded_at).cmp(&(b.date, b.recorded_at)));

    let mut running = safe.opening_balance;
    for line in &mut lines {
        running = checked_total(running, line.delta)?;
        line.running_balance = running;
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use crate::error::LedgerError;
    use crate::ledger::Ledger;
    use crate::model::{NewTransfer, NewVoucher};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_create_rejects_negative_opening_balance() {
        let ledger = Ledger::new(MemoryStore::new());
        assert!(matches!(
            ledger.safes().create("Main", d(-1)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.safes().create("Main", Decimal::new(1, 5)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(ledger.safes().create("  ", d(0)).is_err());
        let safe = ledger.safes().create(" Main ", d(0)).unwrap();
        assert_eq!(safe.name, "Main");
        assert_eq!(safe.balance, d(0));
    }

    #[test]
    fn test_soft_delete_blocked_while_referenced() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(100)).unwrap();
        let posted = ledger
            .vouchers()
            .apply(NewVoucher::receipt(safe.id, d(10), "Deposit"))
            .unwrap();

        let err = ledger.safes().soft_delete(safe.id).unwrap_err();
        assert!(matches!(err, LedgerError::SafeInUse { movements: 1, .. }));

        ledger.vouchers().soft_delete(posted.voucher.id).unwrap();
        ledger.safes().soft_delete(safe.id).unwrap();
        assert!(matches!(
            ledger.safes().get(safe.id),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(ledger.safes().list().unwrap().is_empty());
        assert_eq!(ledger.safes().list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_movements_carry_running_balance() {
        let ledger = Ledger::new(MemoryStore::new());
        let main = ledger.safes().create("Main", d(100)).unwrap();
        let petty = ledger.safes().create("Petty", d(0)).unwrap();
        ledger
            .vouchers()
            .apply(NewVoucher::receipt(main.id, d(50), "Installment"))
            .unwrap();
        ledger
            .transfers()
            .apply(NewTransfer::new(main.id, petty.id, d(30), "Float"))
            .unwrap();

        let lines = ledger.safes().movements(main.id).unwrap();
        let running: Vec<_> = lines.iter().map(|l| l.running_balance).collect();
        assert_eq!(running, vec![d(150), d(120)]);

        let report = ledger.safes().reconcile(main.id).unwrap();
        assert!(report.is_balanced());
        assert_eq!(report.computed, d(120));
    }
}
