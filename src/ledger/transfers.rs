//! Safe-to-safe transfers.
//!
//! A transfer debits its source and credits its destination atomically. Amount and
//! endpoints are immutable; deleting a transfer reverses both legs.

use super::balance::{lock_pair, store_balance};
use super::instrument;
use crate::error::{LedgerError, Result};
use crate::filter::TransferFilter;
use crate::model::{
    EntityKind, NewTransfer, RecordState, Transfer, TransferAmendment, TransferId,
    TransferPosting,
};
use crate::store::{LedgerStore, LedgerTx};
use crate::validation::{balance_after, ensure_positive_amount};
use chrono::Utc;

pub struct TransferLedger<'a, S> {
    store: &'a S,
}

impl<'a, S: LedgerStore> TransferLedger<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn apply(&self, input: NewTransfer) -> Result<TransferPosting> {
        instrument("transfers", "apply", || {
            ensure_positive_amount(input.amount)?;
            if input.from_safe == input.to_safe {
                return Err(LedgerError::SameSafeTransfer(input.from_safe));
            }
            self.store.transaction(|tx| {
                let (mut from, mut to) = lock_pair(tx, input.from_safe, input.to_safe)?;
                let from_balance = balance_after(&from, -input.amount)?;
                let to_balance = balance_after(&to, input.amount)?;

                let now = Utc::now();
                let transfer = Transfer {
                    id: TransferId::new(),
                    from_safe: input.from_safe,
                    to_safe: input.to_safe,
                    amount: input.amount,
                    date: input.date,
                    description: input.description,
                    created_at: now,
                    updated_at: now,
                    state: RecordState::Active,
                };
                tx.insert_transfer(&transfer)?;
                store_balance(tx, &mut from, from_balance, now)?;
                store_balance(tx, &mut to, to_balance, now)?;
                Ok(TransferPosting {
                    transfer,
                    from_balance,
                    to_balance,
                })
            })
        })
    }

    /// Reverse a transfer. Rejected if the destination has since spent the funds.
    pub fn soft_delete(&self, id: TransferId) -> Result<TransferPosting> {
        instrument("transfers", "soft_delete", || {
            self.store.transaction(|tx| {
                let mut transfer = lock_active_transfer(tx, id)?;
                let (mut from, mut to) = lock_pair(tx, transfer.from_safe, transfer.to_safe)?;
                let to_balance = balance_after(&to, -transfer.amount)?;
                let from_balance = balance_after(&from, transfer.amount)?;

                let now = Utc::now();
                transfer.state = RecordState::Deleted { at: now };
                transfer.updated_at = now;
                tx.update_transfer(&transfer)?;
                store_balance(tx, &mut from, from_balance, now)?;
                store_balance(tx, &mut to, to_balance, now)?;
                Ok(TransferPosting {
                    transfer,
                    from_balance,
                    to_balance,
                })
            })
        })
    }

    /// Change the description or date. Any other field that differs from the stored
    /// value is rejected; repeating the stored value is accepted.
    pub fn amend(&self, id: TransferId, changes: TransferAmendment) -> Result<Transfer> {
        instrument("transfers", "amend", || {
            self.store.transaction(|tx| {
                let mut transfer = lock_active_transfer(tx, id)?;
                let immutable_changed = changes.amount.is_some_and(|a| a != transfer.amount)
                    || changes.from_safe.is_some_and(|s| s != transfer.from_safe)
                    || changes.to_safe.is_some_and(|s| s != transfer.to_safe);
                if immutable_changed {
                    return Err(LedgerError::ImmutableTransferFields(id));
                }
                if let Some(description) = changes.description {
                    transfer.description = description;
                }
                if let Some(date) = changes.date {
                    transfer.date = date;
                }
                transfer.updated_at = Utc::now();
                tx.update_transfer(&transfer)?;
                Ok(transfer)
            })
        })
    }

    pub fn get(&self, id: TransferId) -> Result<Transfer> {
        self.store.snapshot(|tx| match tx.get_transfer(id)? {
            Some(transfer) if transfer.state.is_active() => Ok(transfer),
            _ => Err(LedgerError::not_found(EntityKind::Transfer, id)),
        })
    }

    pub fn list(&self, filter: &TransferFilter) -> Result<Vec<Transfer>> {
        filter.validate()?;
        self.store.snapshot(|tx| Ok(tx.find_transfers(filter)?))
    }
}

fn lock_active_transfer(tx: &mut dyn LedgerTx, id: TransferId) -> Result<Transfer> {
    match tx.lock_transfer(id)? {
        Some(transfer) if transfer.state.is_active() => Ok(transfer),
        _ => Err(LedgerError::not_found(EntityKind::Transfer, id)),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LedgerError;
    use crate::ledger::Ledger;
    use crate::model::{NewTransfer, NewVoucher, TransferAmendment};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_transfer_moves_both_legs() {
        let ledger = Ledger::new(MemoryStore::new());
        let a = ledger.safes().create("A", d(200)).unwrap();
        let b = ledger.safes().create("B", d(0)).unwrap();

        let posting = ledger
            .transfers()
            .apply(NewTransfer::new(a.id, b.id, d(75), "Float"))
            .unwrap();
        assert_eq!(posting.from_balance, d(125));
        assert_eq!(posting.to_balance, d(75));
    }

    #[test]
    fn test_same_safe_and_overdraw_rejected() {
        let ledger = Ledger::new(MemoryStore::new());
        let a = ledger.safes().create("A", d(10)).unwrap();
        let b = ledger.safes().create("B", d(0)).unwrap();
        assert!(matches!(
            ledger.transfers().apply(NewTransfer::new(a.id, a.id, d(1), "Loop")),
            Err(LedgerError::SameSafeTransfer(_))
        ));
        assert!(matches!(
            ledger.transfers().apply(NewTransfer::new(a.id, b.id, d(11), "Too much")),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.safes().get(a.id).unwrap().balance, d(10));
        assert_eq!(ledger.safes().get(b.id).unwrap().balance, d(0));
    }

    #[test]
    fn test_oversized_transfer_is_rejected() {
        let ledger = Ledger::new(MemoryStore::new());
        let a = ledger.safes().create("A", d(10)).unwrap();
        let b = ledger.safes().create("B", d(10)).unwrap();
        assert!(matches!(
            ledger.transfers().apply(NewTransfer::new(a.id, b.id, Decimal::MAX, "Typo")),
            Err(LedgerError::InvalidAmount(_))
        ));
        let moved = ledger
            .transfers()
            .apply(NewTransfer::new(a.id, b.id, d(4), "Float"))
            .unwrap();
        assert_eq!((moved.from_balance, moved.to_balance), (d(6), d(14)));
    }

    #[test]
    fn test_delete_after_destination_spent_is_rejected() {
        let ledger = Ledger::new(MemoryStore::new());
        let a = ledger.safes().create("A", d(100)).unwrap();
        let b = ledger.safes().create("B", d(0)).unwrap();
        let posting = ledger
            .transfers()
            .apply(NewTransfer::new(a.id, b.id, d(60), "Float"))
            .unwrap();
        ledger
            .vouchers()
            .apply(NewVoucher::payment(b.id, d(50), "Supplies"))
            .unwrap();

        assert!(matches!(
            ledger.transfers().soft_delete(posting.transfer.id),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.safes().get(a.id).unwrap().balance, d(40));
        assert_eq!(ledger.safes().get(b.id).unwrap().balance, d(10));
    }

    #[test]
    fn test_delete_reverses_both_legs() {
        let ledger = Ledger::new(MemoryStore::new());
        let a = ledger.safes().create("A", d(100)).unwrap();
        let b = ledger.safes().create("B", d(0)).unwrap();
        let posting = ledger
            .transfers()
            .apply(NewTransfer::new(a.id, b.id, d(60), "Float"))
            .unwrap();
        let reversed = ledger.transfers().soft_delete(posting.transfer.id).unwrap();
        assert_eq!(reversed.from_balance, d(100));
        assert_eq!(reversed.to_balance, d(0));
        assert!(reversed.transfer.state.is_deleted());
    }

    #[test]
    fn test_amend_only_touches_description_and_date() {
        let ledger = Ledger::new(MemoryStore::new());
        let a = ledger.safes().create("A", d(100)).unwrap();
        let b = ledger.safes().create("B", d(0)).unwrap();
        let posting = ledger
            .transfers()
            .apply(NewTransfer::new(a.id, b.id, d(60), "Float"))
            .unwrap();
        let id = posting.transfer.id;

        let err = ledger
            .transfers()
            .amend(
                id,
                TransferAmendment {
                    amount: Some(d(61)),
                    ..TransferAmendment::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::ImmutableTransferFields(t) if t == id));

        let amended = ledger
            .transfers()
            .amend(
                id,
                TransferAmendment {
                    description: Some("Weekly float".to_string()),
                    amount: Some(d(60)),
                    from_safe: Some(a.id),
                    ..TransferAmendment::default()
                },
            )
            .unwrap();
        assert_eq!(amended.description, "Weekly float");
        assert_eq!(ledger.safes().get(a.id).unwrap().balance, d(40));
    }
}
