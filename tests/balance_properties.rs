//! Randomized operation sequences checking the balance invariants.
//!
//! A shadow copy of the active vouchers and transfers is kept beside the ledger; after
//! every step each safe's stored balance must equal its opening balance plus the net of
//! the shadow movements, and never be negative. Rejected steps must change nothing.

use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use fake::Fake;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use safeledger::{
    Ledger, LedgerError, MemoryStore, NewTransfer, NewVoucher, Safe, SafeId, Transfer,
    TransferAmendment, TransferId, Voucher, VoucherAmendment, VoucherId, VoucherKind,
};
use std::collections::HashMap;

const SEEDS: u64 = 16;
const STEPS: usize = 250;

struct Harness {
    ledger: Ledger<MemoryStore>,
    safes: Vec<Safe>,
    vouchers: HashMap<VoucherId, Voucher>,
    transfers: HashMap<TransferId, Transfer>,
}

impl Harness {
    fn new(rng: &mut StdRng) -> Self {
        let ledger = Ledger::new(MemoryStore::new());
        let safes = (0..3)
            .map(|_| {
                let name: String = Name().fake_with_rng(rng);
                ledger
                    .safes()
                    .create(&name, cents(rng.gen_range(0..=100_000)))
                    .unwrap()
            })
            .collect();
        Self {
            ledger,
            safes,
            vouchers: HashMap::new(),
            transfers: HashMap::new(),
        }
    }

    fn balances(&self) -> Vec<Decimal> {
        self.safes
            .iter()
            .map(|s| self.ledger.safes().get(s.id).unwrap().balance)
            .collect()
    }

    fn expected(&self, safe: SafeId) -> Decimal {
        let opening = self
            .safes
            .iter()
            .find(|s| s.id == safe)
            .map(|s| s.opening_balance)
            .unwrap();
        let vouchers: Decimal = self
            .vouchers
            .values()
            .filter(|v| v.safe_id == safe)
            .map(|v| v.delta())
            .sum();
        let transfers: Decimal = self.transfers.values().map(|t| t.delta_for(safe)).sum();
        opening + vouchers + transfers
    }

    fn check(&self, step: usize) {
        for safe in &self.safes {
            let stored = self.ledger.safes().get(safe.id).unwrap().balance;
            assert!(stored >= Decimal::ZERO, "step {step}: {} negative", safe.name);
            assert_eq!(stored, self.expected(safe.id), "step {step}: {}", safe.name);
            assert!(self.ledger.safes().reconcile(safe.id).unwrap().is_balanced());
        }
    }

    fn pick_safe(&self, rng: &mut StdRng) -> SafeId {
        self.safes.choose(rng).map(|s| s.id).unwrap()
    }

    fn step(&mut self, rng: &mut StdRng) -> Result<(), LedgerError> {
        match rng.gen_range(0..6) {
            0 => {
                let kind = if rng.gen_bool(0.5) {
                    VoucherKind::Receipt
                } else {
                    VoucherKind::Payment
                };
                let description: String = Sentence(2..6).fake_with_rng(rng);
                let input = NewVoucher {
                    kind,
                    ..NewVoucher::receipt(self.pick_safe(rng), cents(rng.gen_range(1..=60_000)), description)
                };
                let posted = self.ledger.vouchers().apply(input)?;
                self.vouchers.insert(posted.voucher.id, posted.voucher);
            }
            1 => {
                let Some(id) = self.random_voucher(rng) else {
                    return Ok(());
                };
                let changes = VoucherAmendment {
                    kind: rng.gen_bool(0.3).then(|| {
                        if rng.gen_bool(0.5) {
                            VoucherKind::Receipt
                        } else {
                            VoucherKind::Payment
                        }
                    }),
                    amount: rng.gen_bool(0.5).then(|| cents(rng.gen_range(1..=60_000))),
                    safe_id: rng.gen_bool(0.3).then(|| self.pick_safe(rng)),
                    ..VoucherAmendment::default()
                };
                let posted = self.ledger.vouchers().amend(id, changes)?;
                self.vouchers.insert(id, posted.voucher);
            }
            2 => {
                let Some(id) = self.random_voucher(rng) else {
                    return Ok(());
                };
                self.ledger.vouchers().soft_delete(id)?;
                self.vouchers.remove(&id);
            }
            3 => {
                let from = self.pick_safe(rng);
                let to = self.pick_safe(rng);
                let posted = self.ledger.transfers().apply(NewTransfer::new(
                    from,
                    to,
                    cents(rng.gen_range(1..=40_000)),
                    "Float",
                ))?;
                self.transfers.insert(posted.transfer.id, posted.transfer);
            }
            4 => {
                let Some(id) = self.random_transfer(rng) else {
                    return Ok(());
                };
                self.ledger.transfers().soft_delete(id)?;
                self.transfers.remove(&id);
            }
            _ => {
                let Some(id) = self.random_transfer(rng) else {
                    return Ok(());
                };
                let description: String = Sentence(1..4).fake_with_rng(rng);
                let amended = self.ledger.transfers().amend(
                    id,
                    TransferAmendment {
                        description: Some(description),
                        ..TransferAmendment::default()
                    },
                )?;
                self.transfers.insert(id, amended);
            }
        }
        Ok(())
    }

    fn random_voucher(&self, rng: &mut StdRng) -> Option<VoucherId> {
        let mut ids: Vec<_> = self.vouchers.keys().copied().collect();
        ids.sort();
        ids.choose(rng).copied()
    }

    fn random_transfer(&self, rng: &mut StdRng) -> Option<TransferId> {
        let mut ids: Vec<_> = self.transfers.keys().copied().collect();
        ids.sort();
        ids.choose(rng).copied()
    }
}

fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

#[test]
fn test_random_sequences_preserve_balance_invariant() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut harness = Harness::new(&mut rng);
        let mut rejected = 0;

        for step in 0..STEPS {
            let before = harness.balances();
            match harness.step(&mut rng) {
                Ok(()) => {}
                Err(
                    LedgerError::InsufficientBalance { .. } | LedgerError::SameSafeTransfer(_),
                ) => {
                    rejected += 1;
                    assert_eq!(harness.balances(), before, "seed {seed} step {step}");
                }
                Err(other) => panic!("seed {seed} step {step}: unexpected {other}"),
            }
            harness.check(step);
        }
        assert!(rejected < STEPS, "seed {seed}: every step was rejected");
    }
}

#[test]
fn test_apply_then_delete_is_identity_for_every_safe() {
    let mut rng = StdRng::seed_from_u64(7);
    let harness = Harness::new(&mut rng);
    let ledger = &harness.ledger;

    for _ in 0..50 {
        let before = harness.balances();
        let from = harness.pick_safe(&mut rng);
        let to = harness.pick_safe(&mut rng);
        if from == to {
            continue;
        }
        let amount = cents(rng.gen_range(1..=1_000));
        match ledger.transfers().apply(NewTransfer::new(from, to, amount, "Round trip")) {
            Ok(posted) => {
                ledger.transfers().soft_delete(posted.transfer.id).unwrap();
            }
            Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected {other}"),
        }
        assert_eq!(harness.balances(), before);

        let posted = ledger
            .vouchers()
            .apply(NewVoucher::receipt(to, amount, "Round trip"))
            .unwrap();
        ledger.vouchers().soft_delete(posted.voucher.id).unwrap();
        assert_eq!(harness.balances(), before);
    }
}
