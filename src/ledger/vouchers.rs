//! Receipts and payments.
//!
//! A voucher moves exactly one safe. Applying, amending and deleting all post the
//! signed difference to the affected safes in the same unit of work as the voucher
//! row itself.

use super::balance::{lock_active_safe, lock_pair, store_balance};
use super::instrument;
use crate::error::{LedgerError, Result};
use crate::filter::VoucherFilter;
use crate::model::{
    EntityKind, NewVoucher, RecordState, Voucher, VoucherAmendment, VoucherId, VoucherKind,
    VoucherPosting, VoucherTotals,
};
use crate::store::{LedgerStore, LedgerTx};
use crate::validation::{balance_after, checked_total, ensure_positive_amount};
use chrono::Utc;

pub struct VoucherLedger<'a, S> {
    store: &'a S,
}

impl<'a, S: LedgerStore> VoucherLedger<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Record a voucher and move its safe's balance by the signed amount.
    pub fn apply(&self, input: NewVoucher) -> Result<VoucherPosting> {
        instrument("vouchers", "apply", || {
            ensure_positive_amount(input.amount)?;
            self.store.transaction(|tx| {
                let mut safe = lock_active_safe(tx, input.safe_id)?;
                let balance = balance_after(&safe, input.kind.delta(input.amount))?;

                let now = Utc::now();
                let voucher = Voucher {
                    id: VoucherId::new(),
                    kind: input.kind,
                    date: input.date,
                    amount: input.amount,
                    safe_id: input.safe_id,
                    description: input.description,
                    payer: input.payer,
                    beneficiary: input.beneficiary,
                    linked: input.linked,
                    created_at: now,
                    updated_at: now,
                    state: RecordState::Active,
                };
                tx.insert_voucher(&voucher)?;
                store_balance(tx, &mut safe, balance, now)?;
                Ok(VoucherPosting {
                    voucher,
                    safe_balance: balance,
                })
            })
        })
    }

    /// Change a voucher. When kind, amount or safe change, the old effect is reversed
    /// and the new one applied; moving to another safe checks both safes.
    pub fn amend(&self, id: VoucherId, changes: VoucherAmendment) -> Result<VoucherPosting> {
        instrument("vouchers", "amend", || {
            if let Some(amount) = changes.amount {
                ensure_positive_amount(amount)?;
            }
            self.store.transaction(|tx| {
                let current = lock_active_voucher(tx, id)?;
                let now = Utc::now();
                let mut next = current.clone();
                apply_changes(&mut next, changes);
                next.updated_at = now;

                let (old_delta, new_delta) = (current.delta(), next.delta());
                let safe_balance = if next.safe_id == current.safe_id {
                    let mut safe = lock_active_safe(tx, current.safe_id)?;
                    if new_delta == old_delta {
                        tx.update_voucher(&next)?;
                        safe.balance
                    } else {
                        let balance = balance_after(&safe, new_delta - old_delta)?;
                        tx.update_voucher(&next)?;
                        store_balance(tx, &mut safe, balance, now)?;
                        balance
                    }
                } else {
                    let (mut old_safe, mut new_safe) = lock_pair(tx, current.safe_id, next.safe_id)?;
                    let old_balance = balance_after(&old_safe, -old_delta)?;
                    let new_balance = balance_after(&new_safe, new_delta)?;
                    tx.update_voucher(&next)?;
                    store_balance(tx, &mut old_safe, old_balance, now)?;
                    store_balance(tx, &mut new_safe, new_balance, now)?;
                    new_balance
                };
                Ok(VoucherPosting {
                    voucher: next,
                    safe_balance,
                })
            })
        })
    }

    /// Reverse a voucher's effect and mark it deleted. Rejected if reversing a receipt
    /// would overdraw the safe.
    pub fn soft_delete(&self, id: VoucherId) -> Result<VoucherPosting> {
        instrument("vouchers", "soft_delete", || {
            self.store.transaction(|tx| {
                let mut voucher = lock_active_voucher(tx, id)?;
                let mut safe = lock_active_safe(tx, voucher.safe_id)?;
                let balance = balance_after(&safe, -voucher.delta())?;

                let now = Utc::now();
                voucher.state = RecordState::Deleted { at: now };
                voucher.updated_at = now;
                tx.update_voucher(&voucher)?;
                store_balance(tx, &mut safe, balance, now)?;
                Ok(VoucherPosting {
                    voucher,
                    safe_balance: balance,
                })
            })
        })
    }

    pub fn get(&self, id: VoucherId) -> Result<Voucher> {
        self.store.snapshot(|tx| match tx.get_voucher(id)? {
            Some(voucher) if voucher.state.is_active() => Ok(voucher),
            _ => Err(LedgerError::not_found(EntityKind::Voucher, id)),
        })
    }

    /// Vouchers matching `filter`, ordered by date then creation time.
    pub fn list(&self, filter: &VoucherFilter) -> Result<Vec<Voucher>> {
        filter.validate()?;
        self.store.snapshot(|tx| Ok(tx.find_vouchers(filter)?))
    }

    pub fn totals(&self, filter: &VoucherFilter) -> Result<VoucherTotals> {
        let vouchers = self.list(filter)?;
        vouchers
            .iter()
            .try_fold(VoucherTotals::default(), |mut totals, v| {
                match v.kind {
                    VoucherKind::Receipt => {
                        totals.receipts = checked_total(totals.receipts, v.amount)?
                    }
                    VoucherKind::Payment => {
                        totals.payments = checked_total(totals.payments, v.amount)?
                    }
                }
                totals.net = checked_total(totals.net, v.delta())?;
                totals.count += 1;
                Ok(totals)
            })
    }
}

fn lock_active_voucher(tx: &mut dyn LedgerTx, id: VoucherId) -> Result<Voucher> {
    match tx.lock_voucher(id)? {
        Some(voucher) if voucher.state.is_active() => Ok(voucher),
        _ => Err(LedgerError::not_found(EntityKind::Voucher, id)),
    }
}

fn apply_changes(voucher: &mut Voucher, changes: VoucherAmendment) {
    let VoucherAmendment {
        kind,
        amount,
        safe_id,
        date,
        description,
        payer,
        beneficiary,
        linked,
    } = changes;
    if let Some(kind) = kind {
        voucher.kind = kind;
    }
    if let Some(amount) = amount {
        voucher.amount = amount;
    }
    if let Some(safe_id) = safe_id {
        voucher.safe_id = safe_id;
    }
    if let Some(date) = date {
        voucher.date = date;
    }
    if let Some(description) = description {
        voucher.description = description;
    }
    if let Some(payer) = payer {
        voucher.payer = payer;
    }
    if let Some(beneficiary) = beneficiary {
        voucher.beneficiary = beneficiary;
    }
    if let Some(linked) = linked {
        voucher.linked = linked;
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LedgerError;
    use crate::filter::VoucherFilter;
    use crate::ledger::Ledger;
    use crate::model::{NewVoucher, VoucherAmendment, VoucherKind, VoucherLink};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_payment_overdraw_rejected_without_writes() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(100)).unwrap();

        let err = ledger
            .vouchers()
            .apply(NewVoucher::payment(safe.id, d(150), "Rent"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.safes().get(safe.id).unwrap().balance, d(100));
        assert!(ledger.vouchers().list(&VoucherFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_apply_rejects_non_positive_amounts_and_missing_safes() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(0)).unwrap();
        assert!(matches!(
            ledger.vouchers().apply(NewVoucher::receipt(safe.id, d(0), "x")),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger
                .vouchers()
                .apply(NewVoucher::receipt(crate::model::SafeId::new(), d(5), "x")),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_amend_kind_flip_posts_twice_the_amount() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(100)).unwrap();
        let posted = ledger
            .vouchers()
            .apply(NewVoucher::receipt(safe.id, d(30), "Deposit"))
            .unwrap();
        assert_eq!(posted.safe_balance, d(130));

        let amended = ledger
            .vouchers()
            .amend(
                posted.voucher.id,
                VoucherAmendment {
                    kind: Some(VoucherKind::Payment),
                    ..VoucherAmendment::default()
                },
            )
            .unwrap();
        assert_eq!(amended.safe_balance, d(70));
        assert_eq!(amended.voucher.kind, VoucherKind::Payment);
    }

    #[test]
    fn test_amend_description_only_leaves_balance() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(0)).unwrap();
        let posted = ledger
            .vouchers()
            .apply(NewVoucher::receipt(safe.id, d(40), "Deposit"))
            .unwrap();
        let amended = ledger
            .vouchers()
            .amend(
                posted.voucher.id,
                VoucherAmendment {
                    description: Some("Deposit, corrected".to_string()),
                    ..VoucherAmendment::default()
                },
            )
            .unwrap();
        assert_eq!(amended.safe_balance, d(40));
        assert_eq!(ledger.safes().get(safe.id).unwrap().balance, d(40));
    }

    #[test]
    fn test_amend_clears_wrong_unit_link() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(0)).unwrap();
        let unit = ledger.directory().create_unit("C-3", d(1000)).unwrap();
        let posted = ledger
            .vouchers()
            .apply(
                NewVoucher::receipt(safe.id, d(400), "Installment")
                    .linked_to(VoucherLink::Unit(unit.id))
                    .payer("Buyer"),
            )
            .unwrap();
        assert_eq!(ledger.revenue().unit_profit_loss(unit.id).unwrap().revenue, d(400));

        let amended = ledger
            .vouchers()
            .amend(
                posted.voucher.id,
                VoucherAmendment {
                    linked: Some(None),
                    payer: Some(None),
                    ..VoucherAmendment::default()
                },
            )
            .unwrap();
        assert_eq!(amended.voucher.linked, None);
        assert_eq!(amended.voucher.payer, None);
        assert_eq!(amended.safe_balance, d(400));
        assert_eq!(ledger.revenue().unit_profit_loss(unit.id).unwrap().revenue, d(0));

        // Absent fields stay as stored.
        let relinked = ledger
            .vouchers()
            .amend(
                posted.voucher.id,
                VoucherAmendment {
                    linked: Some(Some(VoucherLink::Unit(unit.id))),
                    ..VoucherAmendment::default()
                },
            )
            .unwrap();
        assert_eq!(relinked.voucher.linked, Some(VoucherLink::Unit(unit.id)));
        assert_eq!(relinked.voucher.payer, None);
    }

    #[test]
    fn test_oversized_receipt_is_rejected_and_safe_stays_usable() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(1)).unwrap();
        assert!(matches!(
            ledger
                .vouchers()
                .apply(NewVoucher::receipt(safe.id, Decimal::MAX, "Typo")),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger
                .vouchers()
                .apply(NewVoucher::receipt(safe.id, Decimal::new(1, 5), "Dust")),
            Err(LedgerError::InvalidAmount(_))
        ));
        // Largest storable amount overflows the balance column with the existing 1.
        let largest = Decimal::from(1_000_000_000_000_000_i64) - Decimal::new(1, 4);
        assert!(matches!(
            ledger
                .vouchers()
                .apply(NewVoucher::receipt(safe.id, largest, "Near limit")),
            Err(LedgerError::InvalidAmount(_))
        ));

        assert_eq!(ledger.safes().get(safe.id).unwrap().balance, d(1));
        let posted = ledger
            .vouchers()
            .apply(NewVoucher::receipt(safe.id, d(5), "Deposit"))
            .unwrap();
        assert_eq!(posted.safe_balance, d(6));
    }

    #[test]
    fn test_amend_moves_voucher_between_safes() {
        let ledger = Ledger::new(MemoryStore::new());
        let a = ledger.safes().create("A", d(0)).unwrap();
        let b = ledger.safes().create("B", d(0)).unwrap();
        let posted = ledger
            .vouchers()
            .apply(NewVoucher::receipt(a.id, d(25), "Misfiled"))
            .unwrap();

        let moved = ledger
            .vouchers()
            .amend(
                posted.voucher.id,
                VoucherAmendment {
                    safe_id: Some(b.id),
                    ..VoucherAmendment::default()
                },
            )
            .unwrap();
        assert_eq!(moved.safe_balance, d(25));
        assert_eq!(ledger.safes().get(a.id).unwrap().balance, d(0));
        assert_eq!(ledger.safes().get(b.id).unwrap().balance, d(25));
    }

    #[test]
    fn test_soft_delete_of_spent_receipt_is_rejected() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(0)).unwrap();
        let receipt = ledger
            .vouchers()
            .apply(NewVoucher::receipt(safe.id, d(50), "In"))
            .unwrap();
        ledger
            .vouchers()
            .apply(NewVoucher::payment(safe.id, d(40), "Out"))
            .unwrap();

        assert!(matches!(
            ledger.vouchers().soft_delete(receipt.voucher.id),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.safes().get(safe.id).unwrap().balance, d(10));
    }

    #[test]
    fn test_totals_sum_by_kind() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(0)).unwrap();
        ledger
            .vouchers()
            .apply(NewVoucher::receipt(safe.id, d(80), "In"))
            .unwrap();
        ledger
            .vouchers()
            .apply(NewVoucher::payment(safe.id, d(30), "Out"))
            .unwrap();

        let totals = ledger.vouchers().totals(&VoucherFilter::for_safe(safe.id)).unwrap();
        assert_eq!(totals.receipts, d(80));
        assert_eq!(totals.payments, d(30));
        assert_eq!(totals.net, d(50));
        assert_eq!(totals.count, 2);
    }
}
