//! End-to-end ledger scenarios against the in-memory store.

use rust_decimal::Decimal;
use safeledger::{
    Ledger, LedgerError, MemoryStore, NewTransfer, NewVoucher, PercentageScope, VoucherFilter,
    VoucherLink,
};

fn d(v: i64) -> Decimal {
    Decimal::from(v)
}

fn ledger() -> Ledger<MemoryStore> {
    Ledger::new(MemoryStore::new())
}

#[test]
fn test_receipt_then_rejected_and_exact_payment() {
    let ledger = ledger();
    let main = ledger.safes().create("Main", d(1000)).unwrap();

    let posted = ledger
        .vouchers()
        .apply(NewVoucher::receipt(main.id, d(500), "Installment"))
        .unwrap();
    assert_eq!(posted.safe_balance, d(1500));

    let err = ledger
        .vouchers()
        .apply(NewVoucher::payment(main.id, d(2000), "Contractor"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    assert_eq!(ledger.safes().get(main.id).unwrap().balance, d(1500));

    let posted = ledger
        .vouchers()
        .apply(NewVoucher::payment(main.id, d(1500), "Contractor"))
        .unwrap();
    assert_eq!(posted.safe_balance, d(0));
    assert!(ledger.safes().reconcile(main.id).unwrap().is_balanced());
}

#[test]
fn test_transfer_and_its_reversal() {
    let ledger = ledger();
    let a = ledger.safes().create("A", d(1000)).unwrap();
    let b = ledger.safes().create("B", d(200)).unwrap();

    let posting = ledger
        .transfers()
        .apply(NewTransfer::new(a.id, b.id, d(300), "Top up"))
        .unwrap();
    assert_eq!(ledger.safes().get(a.id).unwrap().balance, d(700));
    assert_eq!(ledger.safes().get(b.id).unwrap().balance, d(500));

    ledger.transfers().soft_delete(posting.transfer.id).unwrap();
    assert_eq!(ledger.safes().get(a.id).unwrap().balance, d(1000));
    assert_eq!(ledger.safes().get(b.id).unwrap().balance, d(200));
}

#[test]
fn test_voucher_apply_then_delete_restores_balance() {
    let ledger = ledger();
    let main = ledger.safes().create("Main", d(250)).unwrap();
    for voucher in [
        NewVoucher::receipt(main.id, d(75), "In"),
        NewVoucher::payment(main.id, d(125), "Out"),
    ] {
        let before = ledger.safes().get(main.id).unwrap().balance;
        let posted = ledger.vouchers().apply(voucher).unwrap();
        ledger.vouchers().soft_delete(posted.voucher.id).unwrap();
        assert_eq!(ledger.safes().get(main.id).unwrap().balance, before);
    }
    assert!(ledger
        .vouchers()
        .list(&VoucherFilter::for_safe(main.id))
        .unwrap()
        .is_empty());
}

#[test]
fn test_partner_share_across_direct_and_group_paths() {
    let ledger = ledger();
    let safe = ledger.safes().create("Sales", d(0)).unwrap();
    let unit = ledger.directory().create_unit("Tower B / 7", d(100_000)).unwrap();
    let p1 = ledger.directory().create_partner("P1", None, None).unwrap();
    let p2 = ledger.directory().create_partner("P2", None, None).unwrap();
    let group = ledger.directory().create_group("G").unwrap();

    ledger.ownership().add_direct_partner(unit.id, p1.id, d(40)).unwrap();
    ledger.ownership().add_group_member(group.id, p2.id, d(60)).unwrap();
    ledger.ownership().link_group(unit.id, group.id).unwrap();

    for amount in [50_000, 100_000] {
        ledger
            .vouchers()
            .apply(
                NewVoucher::receipt(safe.id, d(amount), "Installment")
                    .linked_to(VoucherLink::Unit(unit.id)),
            )
            .unwrap();
    }

    let share = ledger.revenue().partner_share(p1.id).unwrap();
    assert_eq!(share.investment, d(100_000));
    assert_eq!(share.revenue, d(150_000));
    assert_eq!(share.share, d(40));
    assert_eq!(share.partner_revenue, d(60_000));

    let share = ledger.revenue().partner_share(p2.id).unwrap();
    assert_eq!(share.investment, d(100_000));
    assert_eq!(share.revenue, d(150_000));
    assert_eq!(share.share, d(60));
    assert_eq!(share.partner_revenue, d(90_000));

    let pl = ledger.revenue().unit_profit_loss(unit.id).unwrap();
    assert_eq!(pl.profit, d(50_000));
    assert_eq!(pl.roi_percent, d(50));
}

#[test]
fn test_partner_on_both_paths_is_counted_twice() {
    let ledger = ledger();
    let safe = ledger.safes().create("Sales", d(0)).unwrap();
    let unit = ledger.directory().create_unit("C-3", d(1000)).unwrap();
    let p1 = ledger.directory().create_partner("P1", None, None).unwrap();
    let group = ledger.directory().create_group("G").unwrap();
    ledger.ownership().add_direct_partner(unit.id, p1.id, d(20)).unwrap();
    ledger.ownership().add_group_member(group.id, p1.id, d(50)).unwrap();
    ledger.ownership().link_group(unit.id, group.id).unwrap();
    ledger
        .vouchers()
        .apply(NewVoucher::receipt(safe.id, d(2000), "Sale").linked_to(VoucherLink::Unit(unit.id)))
        .unwrap();

    let breakdown = ledger.revenue().partner_breakdown(p1.id).unwrap();
    assert_eq!(breakdown.len(), 2);
    let share = ledger.revenue().partner_share(p1.id).unwrap();
    assert_eq!(share.investment, d(2000));
    assert_eq!(share.share, d(70));
    assert_eq!(share.partner_revenue, d(1400));
}

#[test]
fn test_third_partner_over_cap_is_rejected() {
    let ledger = ledger();
    let unit = ledger.directory().create_unit("U", d(10)).unwrap();
    let partners: Vec<_> = ["P1", "P2", "P3"]
        .iter()
        .map(|name| ledger.directory().create_partner(name, None, None).unwrap())
        .collect();
    ledger
        .ownership()
        .add_direct_partner(unit.id, partners[0].id, d(30))
        .unwrap();
    ledger
        .ownership()
        .add_direct_partner(unit.id, partners[1].id, d(20))
        .unwrap();

    let err = ledger
        .ownership()
        .add_direct_partner(unit.id, partners[2].id, d(70))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::PercentageOverflow {
            scope: PercentageScope::Unit(u),
            ..
        } if u == unit.id
    ));

    let shares: Vec<_> = ledger
        .ownership()
        .resolve_effective_partners(unit.id)
        .unwrap()
        .collect();
    assert_eq!(shares.len(), 2);
    assert_eq!(shares.iter().map(|s| s.percentage).sum::<Decimal>(), d(50));
}

#[test]
fn test_group_cap_is_independent_of_direct_cap() {
    let ledger = ledger();
    let unit = ledger.directory().create_unit("U", d(10)).unwrap();
    let p1 = ledger.directory().create_partner("P1", None, None).unwrap();
    let p2 = ledger.directory().create_partner("P2", None, None).unwrap();
    let group = ledger.directory().create_group("G").unwrap();

    ledger.ownership().add_direct_partner(unit.id, p1.id, d(80)).unwrap();
    ledger.ownership().add_group_member(group.id, p2.id, d(100)).unwrap();
    ledger.ownership().link_group(unit.id, group.id).unwrap();
    assert!(matches!(
        ledger.ownership().add_group_member(group.id, p1.id, d(1)),
        Err(LedgerError::PercentageOverflow {
            scope: PercentageScope::Group(_),
            ..
        })
    ));

    let allocation = ledger.ownership().unit_allocation(unit.id).unwrap();
    assert_eq!(allocation.direct, d(80));
    assert_eq!(allocation.via_groups, d(100));
}

#[test]
fn test_one_group_applies_in_full_to_every_linked_unit() {
    let ledger = ledger();
    let u1 = ledger.directory().create_unit("U1", d(100)).unwrap();
    let u2 = ledger.directory().create_unit("U2", d(300)).unwrap();
    let p = ledger.directory().create_partner("P", None, None).unwrap();
    let group = ledger.directory().create_group("G").unwrap();
    ledger.ownership().add_group_member(group.id, p.id, d(25)).unwrap();
    ledger.ownership().link_group(u1.id, group.id).unwrap();
    ledger.ownership().link_group(u2.id, group.id).unwrap();

    let share = ledger.revenue().partner_share(p.id).unwrap();
    assert_eq!(share.investment, d(400));
    assert_eq!(share.share, d(50));
}

#[test]
fn test_deleted_safe_is_not_found_for_new_movements() {
    let ledger = ledger();
    let a = ledger.safes().create("A", d(0)).unwrap();
    let b = ledger.safes().create("B", d(100)).unwrap();
    ledger.safes().soft_delete(a.id).unwrap();

    assert!(matches!(
        ledger.vouchers().apply(NewVoucher::receipt(a.id, d(1), "x")),
        Err(LedgerError::NotFound { .. })
    ));
    assert!(matches!(
        ledger.transfers().apply(NewTransfer::new(b.id, a.id, d(1), "x")),
        Err(LedgerError::NotFound { .. })
    ));
    assert_eq!(ledger.safes().get(b.id).unwrap().balance, d(100));
}
