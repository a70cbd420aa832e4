use super::{ContractId, RecordState, SafeId, UnitId, VoucherId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherKind {
    /// Money in: increases the safe balance.
    Receipt,
    /// Money out: decreases the safe balance.
    Payment,
}

impl VoucherKind {
    /// Signed balance effect of a voucher of this kind for `amount`.
    pub fn delta(self, amount: Decimal) -> Decimal {
        match self {
            VoucherKind::Receipt => amount,
            VoucherKind::Payment => -amount,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VoucherKind::Receipt => "receipt",
            VoucherKind::Payment => "payment",
        }
    }
}

impl fmt::Display for VoucherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoucherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipt" => Ok(VoucherKind::Receipt),
            "payment" => Ok(VoucherKind::Payment),
            other => Err(format!("unknown voucher kind '{other}'")),
        }
    }
}

/// External record a voucher is booked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum VoucherLink {
    Unit(UnitId),
    Contract(ContractId),
}

impl VoucherLink {
    /// Column pair (`link_type`, `link_id`) used by the SQL store.
    pub fn to_columns(self) -> (&'static str, uuid::Uuid) {
        match self {
            VoucherLink::Unit(id) => ("unit", id.0),
            VoucherLink::Contract(id) => ("contract", id.0),
        }
    }

    pub fn from_columns(link_type: &str, id: uuid::Uuid) -> Result<Self, String> {
        match link_type {
            "unit" => Ok(VoucherLink::Unit(UnitId(id))),
            "contract" => Ok(VoucherLink::Contract(ContractId(id))),
            other => Err(format!("unknown voucher link type '{other}'")),
        }
    }
}

/// A single-safe receipt or payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub kind: VoucherKind,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub safe_id: SafeId,
    pub description: String,
    pub payer: Option<String>,
    pub beneficiary: Option<String>,
    pub linked: Option<VoucherLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

impl Voucher {
    /// Signed effect of this voucher on its safe.
    pub fn delta(&self) -> Decimal {
        self.kind.delta(self.amount)
    }
}

/// Input for [`VoucherLedger::apply`](crate::ledger::VoucherLedger::apply).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVoucher {
    pub kind: VoucherKind,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub safe_id: SafeId,
    pub description: String,
    #[serde(default)]
    pub payer: Option<String>,
    #[serde(default)]
    pub beneficiary: Option<String>,
    #[serde(default)]
    pub linked: Option<VoucherLink>,
}

impl NewVoucher {
    pub fn receipt(safe_id: SafeId, amount: Decimal, description: impl Into<String>) -> Self {
        Self::with_kind(VoucherKind::Receipt, safe_id, amount, description)
    }

    pub fn payment(safe_id: SafeId, amount: Decimal, description: impl Into<String>) -> Self {
        Self::with_kind(VoucherKind::Payment, safe_id, amount, description)
    }

    fn with_kind(
        kind: VoucherKind,
        safe_id: SafeId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            date: Utc::now().date_naive(),
            amount,
            safe_id,
            description: description.into(),
            payer: None,
            beneficiary: None,
            linked: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn linked_to(mut self, link: VoucherLink) -> Self {
        self.linked = Some(link);
        self
    }

    pub fn payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    pub fn beneficiary(mut self, beneficiary: impl Into<String>) -> Self {
        self.beneficiary = Some(beneficiary.into());
        self
    }
}

/// Changes to an existing voucher. `None` leaves a field as stored; for the optional
/// fields `Some(None)` clears the stored value.
///
/// Only `kind`, `amount` and `safe_id` affect balances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoucherAmendment {
    pub kind: Option<VoucherKind>,
    pub amount: Option<Decimal>,
    pub safe_id: Option<SafeId>,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub payer: Option<Option<String>>,
    pub beneficiary: Option<Option<String>>,
    pub linked: Option<Option<VoucherLink>>,
}

/// A posted voucher and the resulting balance of its safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherPosting {
    pub voucher: Voucher,
    pub safe_balance: Decimal,
}

/// Sums over a set of vouchers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherTotals {
    pub receipts: Decimal,
    pub payments: Decimal,
    pub net: Decimal,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_delta_sign() {
        let amount = Decimal::from(250);
        assert_eq!(VoucherKind::Receipt.delta(amount), Decimal::from(250));
        assert_eq!(VoucherKind::Payment.delta(amount), Decimal::from(-250));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("receipt".parse::<VoucherKind>(), Ok(VoucherKind::Receipt));
        assert_eq!("payment".parse::<VoucherKind>(), Ok(VoucherKind::Payment));
        assert!("refund".parse::<VoucherKind>().is_err());
    }

    #[test]
    fn test_link_columns() {
        let unit = UnitId::new();
        let (kind, id) = VoucherLink::Unit(unit).to_columns();
        assert_eq!(kind, "unit");
        assert_eq!(VoucherLink::from_columns(kind, id), Ok(VoucherLink::Unit(unit)));
        assert!(VoucherLink::from_columns("invoice", id).is_err());
    }
}
