//! Typed list filters.
//!
//! Every field is optional and an absent field means "no constraint". Filters are
//! validated once at the component boundary with `validate()`; stores can then trust
//! them. [`MemoryStore`](crate::store::MemoryStore) evaluates them with `matches()`,
//! the Postgres store translates them to SQL.

use crate::error::{LedgerError, Result};
use crate::model::{
    ObligationStatus, Obligation, Party, SafeId, Transfer, Voucher, VoucherKind, VoucherLink,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoucherFilter {
    pub safe_id: Option<SafeId>,
    pub kind: Option<VoucherKind>,
    pub linked: Option<VoucherLink>,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive substring of description, payer or beneficiary.
    pub search: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl VoucherFilter {
    pub fn for_safe(safe_id: SafeId) -> Self {
        Self {
            safe_id: Some(safe_id),
            ..Self::default()
        }
    }

    /// Active receipts booked against `link`.
    pub fn receipts_for(link: VoucherLink) -> Self {
        Self {
            kind: Some(VoucherKind::Receipt),
            linked: Some(link),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_amount_range(self.amount_min, self.amount_max)?;
        check_date_range(self.date_from, self.date_to, "date")?;
        check_search(self.search.as_deref())
    }

    pub fn matches(&self, voucher: &Voucher) -> bool {
        (self.include_deleted || voucher.state.is_active())
            && self.safe_id.map_or(true, |id| voucher.safe_id == id)
            && self.kind.map_or(true, |kind| voucher.kind == kind)
            && self.linked.map_or(true, |link| voucher.linked == Some(link))
            && in_amount_range(voucher.amount, self.amount_min, self.amount_max)
            && in_date_range(voucher.date, self.date_from, self.date_to)
            && self.search.as_deref().map_or(true, |term| {
                contains_ci(&voucher.description, term)
                    || voucher.payer.as_deref().is_some_and(|p| contains_ci(p, term))
                    || voucher.beneficiary.as_deref().is_some_and(|b| contains_ci(b, term))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferFilter {
    pub from_safe: Option<SafeId>,
    pub to_safe: Option<SafeId>,
    /// Either endpoint.
    pub involving_safe: Option<SafeId>,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl TransferFilter {
    pub fn involving(safe_id: SafeId) -> Self {
        Self {
            involving_safe: Some(safe_id),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_amount_range(self.amount_min, self.amount_max)?;
        check_date_range(self.date_from, self.date_to, "date")?;
        check_search(self.search.as_deref())
    }

    pub fn matches(&self, transfer: &Transfer) -> bool {
        (self.include_deleted || transfer.state.is_active())
            && self.from_safe.map_or(true, |id| transfer.from_safe == id)
            && self.to_safe.map_or(true, |id| transfer.to_safe == id)
            && self
                .involving_safe
                .map_or(true, |id| transfer.from_safe == id || transfer.to_safe == id)
            && in_amount_range(transfer.amount, self.amount_min, self.amount_max)
            && in_date_range(transfer.date, self.date_from, self.date_to)
            && self
                .search
                .as_deref()
                .map_or(true, |term| contains_ci(&transfer.description, term))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObligationFilter {
    pub party: Option<Party>,
    pub status: Option<ObligationStatus>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl ObligationFilter {
    pub fn pending() -> Self {
        Self {
            status: Some(ObligationStatus::Pending),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_date_range(self.due_from, self.due_to, "due date")
    }

    pub fn matches(&self, obligation: &Obligation) -> bool {
        (self.include_deleted || obligation.state.is_active())
            && self.party.map_or(true, |party| obligation.party == party)
            && self.status.map_or(true, |status| obligation.status == status)
            && in_date_range(obligation.due_date, self.due_from, self.due_to)
    }
}

fn check_amount_range(min: Option<Decimal>, max: Option<Decimal>) -> Result<()> {
    for bound in [min, max].into_iter().flatten() {
        if bound < Decimal::ZERO {
            return Err(LedgerError::InvalidInput(format!(
                "amount bound {bound} is negative"
            )));
        }
    }
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(LedgerError::InvalidInput(format!(
            "amount_min {min} is greater than amount_max {max}"
        ))),
        _ => Ok(()),
    }
}

fn check_date_range(from: Option<NaiveDate>, to: Option<NaiveDate>, what: &str) -> Result<()> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(LedgerError::InvalidInput(format!(
            "{what} range starts {from} after it ends {to}"
        ))),
        _ => Ok(()),
    }
}

fn check_search(search: Option<&str>) -> Result<()> {
    match search {
        Some(term) if term.trim().is_empty() => Err(LedgerError::InvalidInput(
            "search term must not be blank".to_string(),
        )),
        _ => Ok(()),
    }
}

fn in_amount_range(amount: Decimal, min: Option<Decimal>, max: Option<Decimal>) -> bool {
    min.map_or(true, |min| amount >= min) && max.map_or(true, |max| amount <= max)
}

fn in_date_range(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.map_or(true, |from| date >= from) && to.map_or(true, |to| date <= to)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewVoucher, RecordState, VoucherId};
    use chrono::Utc;

    fn voucher(kind: VoucherKind, amount: i64, description: &str) -> Voucher {
        let input = NewVoucher::receipt(SafeId::new(), Decimal::from(amount), description);
        Voucher {
            id: VoucherId::new(),
            kind,
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            amount: input.amount,
            safe_id: input.safe_id,
            description: input.description,
            payer: Some("Acme Holdings".to_string()),
            beneficiary: None,
            linked: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            state: RecordState::Active,
        }
    }

    #[test]
    fn test_empty_filter_matches_active_only() {
        let mut v = voucher(VoucherKind::Receipt, 100, "Down payment");
        assert!(VoucherFilter::default().matches(&v));
        v.state = RecordState::Deleted { at: Utc::now() };
        assert!(!VoucherFilter::default().matches(&v));
        let all = VoucherFilter {
            include_deleted: true,
            ..VoucherFilter::default()
        };
        assert!(all.matches(&v));
    }

    #[test]
    fn test_amount_and_date_bounds_are_inclusive() {
        let v = voucher(VoucherKind::Payment, 100, "Commission");
        let filter = VoucherFilter {
            amount_min: Some(Decimal::from(100)),
            amount_max: Some(Decimal::from(100)),
            date_from: Some(v.date),
            date_to: Some(v.date),
            ..VoucherFilter::default()
        };
        assert!(filter.matches(&v));
        let later = VoucherFilter {
            date_from: v.date.succ_opt(),
            ..VoucherFilter::default()
        };
        assert!(!later.matches(&v));
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let v = voucher(VoucherKind::Receipt, 10, "Installment 3 for unit A-12");
        let by_description = VoucherFilter {
            search: Some("INSTALLMENT".to_string()),
            ..VoucherFilter::default()
        };
        let by_payer = VoucherFilter {
            search: Some("acme".to_string()),
            ..VoucherFilter::default()
        };
        let miss = VoucherFilter {
            search: Some("refund".to_string()),
            ..VoucherFilter::default()
        };
        assert!(by_description.matches(&v));
        assert!(by_payer.matches(&v));
        assert!(!miss.matches(&v));
    }

    #[test]
    fn test_validate_rejects_inverted_ranges() {
        let filter = VoucherFilter {
            amount_min: Some(Decimal::from(10)),
            amount_max: Some(Decimal::from(5)),
            ..VoucherFilter::default()
        };
        assert!(matches!(filter.validate(), Err(LedgerError::InvalidInput(_))));

        let filter = ObligationFilter {
            due_from: NaiveDate::from_ymd_opt(2024, 2, 1),
            due_to: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..ObligationFilter::default()
        };
        assert!(filter.validate().is_err());

        let filter = TransferFilter {
            search: Some("  ".to_string()),
            ..TransferFilter::default()
        };
        assert!(filter.validate().is_err());

        let filter = TransferFilter {
            amount_min: Some(Decimal::from(-1)),
            ..TransferFilter::default()
        };
        assert!(filter.validate().is_err());
    }
}
