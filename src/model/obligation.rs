use super::{BrokerId, EntityKind, ObligationId, PartnerId, RecordState};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broker {
    pub id: BrokerId,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

/// The two obligation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationKind {
    BrokerDue,
    PartnerDebt,
}

impl ObligationKind {
    pub fn entity(self) -> EntityKind {
        match self {
            ObligationKind::BrokerDue => EntityKind::BrokerDue,
            ObligationKind::PartnerDebt => EntityKind::PartnerDebt,
        }
    }
}

/// Who an obligation belongs to. Determines its [`ObligationKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Party {
    Broker(BrokerId),
    Partner(PartnerId),
}

impl Party {
    pub fn kind(self) -> ObligationKind {
        match self {
            Party::Broker(_) => ObligationKind::BrokerDue,
            Party::Partner(_) => ObligationKind::PartnerDebt,
        }
    }

    pub fn uuid(self) -> uuid::Uuid {
        match self {
            Party::Broker(id) => id.0,
            Party::Partner(id) => id.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    Pending,
    Paid,
}

impl ObligationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ObligationStatus::Pending => "pending",
            ObligationStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObligationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ObligationStatus::Pending),
            "paid" => Ok(ObligationStatus::Paid),
            other => Err(format!("unknown obligation status '{other}'")),
        }
    }
}

/// A scheduled amount owed to a broker or partner.
///
/// Obligations never touch safe balances. Paying one only flips its status; the cash
/// itself, if any, is recorded separately as a voucher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: ObligationId,
    pub party: Party,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub status: ObligationStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

impl Obligation {
    pub fn kind(&self) -> ObligationKind {
        self.party.kind()
    }

    /// Pending and due strictly before `as_of`.
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.status == ObligationStatus::Pending && self.due_date < as_of
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObligation {
    pub party: Party,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObligationUpdate {
    pub amount: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Counts and sums over one obligation table, as of a date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationStats {
    pub total_count: u64,
    pub total_amount: Decimal,
    pub pending_count: u64,
    pub pending_amount: Decimal,
    pub paid_count: u64,
    pub paid_amount: Decimal,
    pub overdue_count: u64,
    pub overdue_amount: Decimal,
}
