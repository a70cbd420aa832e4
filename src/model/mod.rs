//! Ledger records.
//!
//! Every persisted record carries a [`RecordState`] instead of a nullable deletion
//! timestamp. Read paths filter on the tag explicitly.

mod ids;
mod obligation;
mod ownership;
mod safe;
mod transfer;
mod voucher;

pub use ids::*;
pub use obligation::*;
pub use ownership::*;
pub use safe::*;
pub use transfer::*;
pub use voucher::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Soft-delete tag carried by every ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    Active,
    Deleted { at: DateTime<Utc> },
}

impl RecordState {
    pub fn is_active(&self) -> bool {
        matches!(self, RecordState::Active)
    }

    pub fn is_deleted(&self) -> bool {
        !self.is_active()
    }

    /// The deletion timestamp, as stored in the `deleted_at` column.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RecordState::Active => None,
            RecordState::Deleted { at } => Some(*at),
        }
    }

    /// Inverse of [`RecordState::deleted_at`].
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            None => RecordState::Active,
            Some(at) => RecordState::Deleted { at },
        }
    }
}

impl Default for RecordState {
    fn default() -> Self {
        RecordState::Active
    }
}

/// Record kinds, used to name the missing record in `NotFound` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Safe,
    Voucher,
    Transfer,
    Unit,
    Partner,
    PartnerGroup,
    GroupMember,
    UnitPartner,
    UnitGroupLink,
    Broker,
    BrokerDue,
    PartnerDebt,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Safe => "safe",
            EntityKind::Voucher => "voucher",
            EntityKind::Transfer => "transfer",
            EntityKind::Unit => "unit",
            EntityKind::Partner => "partner",
            EntityKind::PartnerGroup => "partner group",
            EntityKind::GroupMember => "group membership",
            EntityKind::UnitPartner => "unit partner link",
            EntityKind::UnitGroupLink => "unit group link",
            EntityKind::Broker => "broker",
            EntityKind::BrokerDue => "broker due",
            EntityKind::PartnerDebt => "partner debt",
        };
        f.write_str(name)
    }
}
