//! Read-only profit and revenue-share reports.
//!
//! Revenue of a unit is the sum of active receipts linked to it. A partner's share walks
//! every ownership path to every unit; a unit reached by two paths is counted twice.

use crate::error::{LedgerError, Result};
use crate::filter::VoucherFilter;
use crate::model::{
    EffectiveShare, PartnerId, PartnerShare, ShareContribution, Unit, UnitId, UnitProfitLoss,
    VoucherLink,
};
use crate::ownership::{active_unit, OwnershipGraph};
use crate::store::{LedgerStore, LedgerTx};
use crate::validation::{checked_total, FULL_SHARE};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

pub struct RevenueCalculator<'a, S> {
    store: &'a S,
}

impl<'a, S: LedgerStore> RevenueCalculator<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Investment, revenue, profit and ROI of one unit. `NotFound` for a missing or
    /// deleted unit.
    pub fn unit_profit_loss(&self, unit: UnitId) -> Result<UnitProfitLoss> {
        self.store.snapshot(|tx| {
            let unit = active_unit(tx, unit)?;
            let revenue = unit_revenue(tx, unit.id)?;
            profit_loss(&unit, revenue)
        })
    }

    /// Aggregate position of `partner` across every path to every unit. A partner with
    /// no links gets all zeros.
    pub fn partner_share(&self, partner: PartnerId) -> Result<PartnerShare> {
        let breakdown = self.partner_breakdown(partner)?;
        breakdown
            .iter()
            .try_fold(PartnerShare::default(), |share, line| {
                Ok(PartnerShare {
                    investment: checked_total(share.investment, line.investment)?,
                    revenue: checked_total(share.revenue, line.revenue)?,
                    share: checked_total(share.share, line.percentage)?,
                    partner_revenue: checked_total(share.partner_revenue, line.partner_revenue)?,
                })
            })
    }

    /// The per-path contributions that [`partner_share`](Self::partner_share) sums.
    pub fn partner_breakdown(&self, partner: PartnerId) -> Result<Vec<ShareContribution>> {
        let links = OwnershipGraph::new(self.store).partner_links(partner)?;
        self.store.snapshot(|tx| contributions(tx, &links))
    }
}

fn contributions(tx: &mut dyn LedgerTx, links: &[EffectiveShare]) -> Result<Vec<ShareContribution>> {
    let mut units: HashMap<UnitId, Option<(Decimal, Decimal)>> = HashMap::new();
    let mut lines = Vec::with_capacity(links.len());
    for link in links {
        let totals = match units.get(&link.unit_id) {
            Some(totals) => *totals,
            None => {
                let totals = match tx.get_unit(link.unit_id)? {
                    Some(unit) if unit.state.is_active() => {
                        Some((unit.total_price, unit_revenue(tx, unit.id)?))
                    }
                    _ => None,
                };
                units.insert(link.unit_id, totals);
                totals
            }
        };
        // Links are read before this snapshot; a unit deleted in between drops out.
        let Some((investment, revenue)) = totals else {
            continue;
        };
        lines.push(ShareContribution {
            unit_id: link.unit_id,
            path: link.path,
            percentage: link.percentage,
            investment,
            revenue,
            partner_revenue: share_of(revenue, link.percentage)?,
        });
    }
    Ok(lines)
}

fn unit_revenue(tx: &mut dyn LedgerTx, unit: UnitId) -> Result<Decimal> {
    let receipts = tx.find_vouchers(&VoucherFilter::receipts_for(VoucherLink::Unit(unit)))?;
    receipts
        .iter()
        .try_fold(Decimal::ZERO, |total, v| checked_total(total, v.amount))
}

/// `revenue * percentage / 100`.
fn share_of(revenue: Decimal, percentage: Decimal) -> Result<Decimal> {
    revenue
        .checked_mul(percentage)
        .and_then(|scaled| scaled.checked_div(FULL_SHARE))
        .ok_or(LedgerError::InvalidAmount(revenue))
}

fn profit_loss(unit: &Unit, revenue: Decimal) -> Result<UnitProfitLoss> {
    let investment = unit.total_price;
    let profit = revenue
        .checked_sub(investment)
        .ok_or(LedgerError::InvalidAmount(revenue))?;
    let roi_percent = if investment > Decimal::ZERO {
        profit
            .checked_div(investment)
            .and_then(|ratio| ratio.checked_mul(FULL_SHARE))
            .ok_or(LedgerError::InvalidAmount(profit))?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    } else {
        Decimal::ZERO
    };
    Ok(UnitProfitLoss {
        unit_id: unit.id,
        investment,
        revenue,
        profit,
        roi_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::model::{NewVoucher, RecordState};
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn unit(price: i64) -> Unit {
        Unit {
            id: UnitId::new(),
            name: "A-1".to_string(),
            total_price: d(price),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            state: RecordState::Active,
        }
    }

    #[test]
    fn test_roi_rounds_half_away_from_zero() {
        let pl = profit_loss(&unit(3), d(4)).unwrap();
        // 1/3 * 100 = 33.333...
        assert_eq!(pl.roi_percent, Decimal::new(3333, 2));
        let pl = profit_loss(&unit(8), d(7)).unwrap();
        // -1/8 * 100 = -12.5
        assert_eq!(pl.roi_percent, Decimal::new(-1250, 2));
        // 0.125 and -0.125
        assert_eq!(profit_loss(&unit(800), d(801)).unwrap().roi_percent, Decimal::new(13, 2));
        assert_eq!(profit_loss(&unit(800), d(799)).unwrap().roi_percent, Decimal::new(-13, 2));
    }

    #[test]
    fn test_share_of_overflow_is_an_error() {
        assert_eq!(share_of(d(150_000), d(40)).unwrap(), d(60_000));
        assert!(matches!(
            share_of(Decimal::MAX, d(60)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_zero_investment_has_zero_roi() {
        let pl = profit_loss(&unit(0), d(500)).unwrap();
        assert_eq!(pl.roi_percent, Decimal::ZERO);
        assert_eq!(pl.profit, d(500));
    }

    #[test]
    fn test_unit_profit_loss_counts_only_linked_receipts() {
        let ledger = Ledger::new(MemoryStore::new());
        let safe = ledger.safes().create("Main", d(0)).unwrap();
        let u = ledger.directory().create_unit("A-1", d(1000)).unwrap();
        let link = VoucherLink::Unit(u.id);
        ledger
            .vouchers()
            .apply(NewVoucher::receipt(safe.id, d(700), "Installment").linked_to(link))
            .unwrap();
        ledger
            .vouchers()
            .apply(NewVoucher::receipt(safe.id, d(900), "Unlinked"))
            .unwrap();
        ledger
            .vouchers()
            .apply(NewVoucher::payment(safe.id, d(100), "Fees").linked_to(link))
            .unwrap();

        let pl = ledger.revenue().unit_profit_loss(u.id).unwrap();
        assert_eq!(pl.revenue, d(700));
        assert_eq!(pl.profit, d(-300));
        assert_eq!(pl.roi_percent, d(-30));

        assert!(matches!(
            ledger.revenue().unit_profit_loss(UnitId::new()),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_partner_without_links_gets_zeros() {
        let ledger = Ledger::new(MemoryStore::new());
        let partner = ledger.directory().create_partner("Idle", None, None).unwrap();
        assert_eq!(
            ledger.revenue().partner_share(partner.id).unwrap(),
            PartnerShare::default()
        );
    }
}
