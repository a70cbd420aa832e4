use super::{GroupId, MemberId, PartnerId, RecordState, UnitGroupId, UnitId, UnitPartnerId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A sellable property unit. Only the fields the revenue calculator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    /// Acquisition cost, treated as the investment in the unit.
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

/// A named bundle of partners that can be linked to units as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerGroup {
    pub id: GroupId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

/// A partner's percentage inside a group. Active memberships of one group sum to at most 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: MemberId,
    pub group_id: GroupId,
    pub partner_id: PartnerId,
    pub percentage: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

/// A direct stake in a unit. Active direct links of one unit sum to at most 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPartner {
    pub id: UnitPartnerId,
    pub unit_id: UnitId,
    pub partner_id: PartnerId,
    pub percentage: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

/// Links a unit to a group; the group's membership percentages then apply to the unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitGroupLink {
    pub id: UnitGroupId,
    pub unit_id: UnitId,
    pub group_id: GroupId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: RecordState,
}

/// How a partner reaches a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum OwnershipPath {
    Direct { link: UnitPartnerId },
    Group { link: UnitGroupId, group: GroupId, member: MemberId },
}

impl fmt::Display for OwnershipPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipPath::Direct { link } => write!(f, "direct ({link})"),
            OwnershipPath::Group { group, member, .. } => {
                write!(f, "group {group} (membership {member})")
            }
        }
    }
}

/// One resolved (partner, percentage) entry for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveShare {
    pub unit_id: UnitId,
    pub partner_id: PartnerId,
    pub percentage: Decimal,
    pub path: OwnershipPath,
}

/// Active percentage totals for one unit, per relationship kind.
///
/// The two totals are capped independently; their sum is not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAllocation {
    pub direct: Decimal,
    pub via_groups: Decimal,
}

impl UnitAllocation {
    pub fn combined(&self) -> Decimal {
        self.direct + self.via_groups
    }
}

/// Investment/revenue summary for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProfitLoss {
    pub unit_id: UnitId,
    pub investment: Decimal,
    pub revenue: Decimal,
    pub profit: Decimal,
    /// `profit / investment * 100`, two decimal places; zero when investment is zero.
    pub roi_percent: Decimal,
}

/// Aggregate position of a partner across every unit they reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerShare {
    pub investment: Decimal,
    pub revenue: Decimal,
    /// Sum of percentages over every path; may exceed 100 across several units.
    pub share: Decimal,
    pub partner_revenue: Decimal,
}

/// One unit's contribution to a [`PartnerShare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareContribution {
    pub unit_id: UnitId,
    pub path: OwnershipPath,
    pub percentage: Decimal,
    pub investment: Decimal,
    pub revenue: Decimal,
    pub partner_revenue: Decimal,
}
