//! The ownership graph.
//!
//! Writers lock the unit (direct links) or group (memberships) whose percentage total
//! they change, so concurrent additions to one scope are serialized and the 100% cap
//! holds per scope.

use super::directory::{active_partner, active_unit};
use crate::error::{LedgerError, PercentageScope, Result};
use crate::ledger::instrument;
use crate::model::{
    EffectiveShare, EntityKind, GroupId, GroupMember, MemberId, OwnershipPath, PartnerGroup,
    PartnerId, RecordState, UnitAllocation, UnitGroupId, UnitGroupLink, UnitId, UnitPartner,
    UnitPartnerId,
};
use crate::store::{LedgerStore, LedgerTx};
use crate::validation::{ensure_percentage, percentage_total};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;

pub struct OwnershipGraph<'a, S> {
    store: &'a S,
}

impl<'a, S: LedgerStore> OwnershipGraph<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Give `partner` a direct stake in `unit`.
    pub fn add_direct_partner(
        &self,
        unit: UnitId,
        partner: PartnerId,
        percentage: Decimal,
    ) -> Result<UnitPartner> {
        instrument("ownership", "add_direct_partner", || {
            ensure_percentage(percentage)?;
            self.store.transaction(|tx| {
                lock_active_unit(tx, unit)?;
                active_partner(tx, partner)?;
                let existing = tx.active_partners_of_unit(unit)?;
                if existing.iter().any(|link| link.partner_id == partner) {
                    return Err(LedgerError::DuplicateLink(format!(
                        "partner {partner} already holds a direct share of unit {unit}"
                    )));
                }
                let current: Decimal = existing.iter().map(|link| link.percentage).sum();
                percentage_total(PercentageScope::Unit(unit), current, percentage)?;

                let now = Utc::now();
                let link = UnitPartner {
                    id: UnitPartnerId::new(),
                    unit_id: unit,
                    partner_id: partner,
                    percentage,
                    created_at: now,
                    updated_at: now,
                    state: RecordState::Active,
                };
                tx.insert_unit_partner(&link)?;
                Ok(link)
            })
        })
    }

    pub fn update_direct_percentage(
        &self,
        link: UnitPartnerId,
        percentage: Decimal,
    ) -> Result<UnitPartner> {
        instrument("ownership", "update_direct_percentage", || {
            ensure_percentage(percentage)?;
            self.store.transaction(|tx| {
                let mut row = active_unit_partner(tx, link)?;
                lock_active_unit(tx, row.unit_id)?;
                let others: Decimal = tx
                    .active_partners_of_unit(row.unit_id)?
                    .into_iter()
                    .filter(|other| other.id != link)
                    .map(|other| other.percentage)
                    .sum();
                percentage_total(PercentageScope::Unit(row.unit_id), others, percentage)?;

                row.percentage = percentage;
                row.updated_at = Utc::now();
                tx.update_unit_partner(&row)?;
                Ok(row)
            })
        })
    }

    pub fn remove_direct_partner(&self, link: UnitPartnerId) -> Result<UnitPartner> {
        instrument("ownership", "remove_direct_partner", || {
            self.store.transaction(|tx| {
                let mut row = active_unit_partner(tx, link)?;
                let now = Utc::now();
                row.state = RecordState::Deleted { at: now };
                row.updated_at = now;
                tx.update_unit_partner(&row)?;
                Ok(row)
            })
        })
    }

    pub fn add_group_member(
        &self,
        group: GroupId,
        partner: PartnerId,
        percentage: Decimal,
    ) -> Result<GroupMember> {
        instrument("ownership", "add_group_member", || {
            ensure_percentage(percentage)?;
            self.store.transaction(|tx| {
                lock_active_group(tx, group)?;
                active_partner(tx, partner)?;
                let existing = tx.active_members_of_group(group)?;
                if existing.iter().any(|m| m.partner_id == partner) {
                    return Err(LedgerError::DuplicateLink(format!(
                        "partner {partner} is already a member of group {group}"
                    )));
                }
                let current: Decimal = existing.iter().map(|m| m.percentage).sum();
                percentage_total(PercentageScope::Group(group), current, percentage)?;

                let now = Utc::now();
                let member = GroupMember {
                    id: MemberId::new(),
                    group_id: group,
                    partner_id: partner,
                    percentage,
                    created_at: now,
                    updated_at: now,
                    state: RecordState::Active,
                };
                tx.insert_member(&member)?;
                Ok(member)
            })
        })
    }

    pub fn update_member_percentage(
        &self,
        member: MemberId,
        percentage: Decimal,
    ) -> Result<GroupMember> {
        instrument("ownership", "update_member_percentage", || {
            ensure_percentage(percentage)?;
            self.store.transaction(|tx| {
                let mut row = active_member(tx, member)?;
                lock_active_group(tx, row.group_id)?;
                let others: Decimal = tx
                    .active_members_of_group(row.group_id)?
                    .into_iter()
                    .filter(|other| other.id != member)
                    .map(|other| other.percentage)
                    .sum();
                percentage_total(PercentageScope::Group(row.group_id), others, percentage)?;

                row.percentage = percentage;
                row.updated_at = Utc::now();
                tx.update_member(&row)?;
                Ok(row)
            })
        })
    }

    pub fn remove_group_member(&self, member: MemberId) -> Result<GroupMember> {
        instrument("ownership", "remove_group_member", || {
            self.store.transaction(|tx| {
                let mut row = active_member(tx, member)?;
                let now = Utc::now();
                row.state = RecordState::Deleted { at: now };
                row.updated_at = now;
                tx.update_member(&row)?;
                Ok(row)
            })
        })
    }

    /// Link a group to a unit. A group may be linked to any number of units; each unit
    /// applies the full membership percentages.
    pub fn link_group(&self, unit: UnitId, group: GroupId) -> Result<UnitGroupLink> {
        instrument("ownership", "link_group", || {
            self.store.transaction(|tx| {
                lock_active_unit(tx, unit)?;
                active_group(tx, group)?;
                if tx
                    .active_groups_of_unit(unit)?
                    .iter()
                    .any(|link| link.group_id == group)
                {
                    return Err(LedgerError::DuplicateLink(format!(
                        "group {group} is already linked to unit {unit}"
                    )));
                }
                let now = Utc::now();
                let link = UnitGroupLink {
                    id: UnitGroupId::new(),
                    unit_id: unit,
                    group_id: group,
                    created_at: now,
                    updated_at: now,
                    state: RecordState::Active,
                };
                tx.insert_unit_group(&link)?;
                Ok(link)
            })
        })
    }

    pub fn unlink_group(&self, link: UnitGroupId) -> Result<UnitGroupLink> {
        instrument("ownership", "unlink_group", || {
            self.store.transaction(|tx| {
                let mut row = match tx.get_unit_group(link)? {
                    Some(row) if row.state.is_active() => row,
                    _ => return Err(LedgerError::not_found(EntityKind::UnitGroupLink, link)),
                };
                let now = Utc::now();
                row.state = RecordState::Deleted { at: now };
                row.updated_at = now;
                tx.update_unit_group(&row)?;
                Ok(row)
            })
        })
    }

    /// Every (partner, percentage) entry reaching `unit`: direct links first, then each
    /// linked group's memberships. A partner reached by several paths appears once per
    /// path.
    pub fn resolve_effective_partners(&self, unit: UnitId) -> Result<EffectivePartners> {
        self.store.snapshot(|tx| {
            active_unit(tx, unit)?;
            let direct = tx.active_partners_of_unit(unit)?;
            let mut groups = Vec::new();
            for link in tx.active_groups_of_unit(unit)? {
                let members = tx.active_members_of_group(link.group_id)?;
                groups.push((link, members));
            }
            Ok(EffectivePartners::new(unit, direct, groups))
        })
    }

    /// Reverse walk: every unit `partner` reaches, one entry per path.
    pub fn partner_links(&self, partner: PartnerId) -> Result<Vec<EffectiveShare>> {
        self.store.snapshot(|tx| {
            let mut shares: Vec<EffectiveShare> = tx
                .active_units_of_partner(partner)?
                .into_iter()
                .map(|link| EffectiveShare {
                    unit_id: link.unit_id,
                    partner_id: partner,
                    percentage: link.percentage,
                    path: OwnershipPath::Direct { link: link.id },
                })
                .collect();

            let mut seen_groups = HashSet::new();
            for member in tx.active_memberships_of_partner(partner)? {
                if !seen_groups.insert(member.group_id) {
                    continue;
                }
                for link in tx.active_units_of_group(member.group_id)? {
                    shares.push(EffectiveShare {
                        unit_id: link.unit_id,
                        partner_id: partner,
                        percentage: member.percentage,
                        path: OwnershipPath::Group {
                            link: link.id,
                            group: member.group_id,
                            member: member.id,
                        },
                    });
                }
            }
            Ok(shares)
        })
    }

    /// Active direct and via-group percentage totals of `unit`.
    pub fn unit_allocation(&self, unit: UnitId) -> Result<UnitAllocation> {
        Ok(self
            .resolve_effective_partners(unit)?
            .fold(UnitAllocation::default(), |mut totals, share| {
                match share.path {
                    OwnershipPath::Direct { .. } => totals.direct += share.percentage,
                    OwnershipPath::Group { .. } => totals.via_groups += share.percentage,
                }
                totals
            }))
    }
}

/// Lazily resolved ownership entries of one unit.
pub struct EffectivePartners {
    unit: UnitId,
    direct: std::vec::IntoIter<UnitPartner>,
    groups: std::vec::IntoIter<(UnitGroupLink, Vec<GroupMember>)>,
    current: Option<(UnitGroupLink, std::vec::IntoIter<GroupMember>)>,
}

impl EffectivePartners {
    fn new(
        unit: UnitId,
        direct: Vec<UnitPartner>,
        groups: Vec<(UnitGroupLink, Vec<GroupMember>)>,
    ) -> Self {
        Self {
            unit,
            direct: direct.into_iter(),
            groups: groups.into_iter(),
            current: None,
        }
    }
}

impl Iterator for EffectivePartners {
    type Item = EffectiveShare;

    fn next(&mut self) -> Option<EffectiveShare> {
        if let Some(link) = self.direct.next() {
            return Some(EffectiveShare {
                unit_id: self.unit,
                partner_id: link.partner_id,
                percentage: link.percentage,
                path: OwnershipPath::Direct { link: link.id },
            });
        }
        loop {
            if let Some((link, members)) = &mut self.current {
                if let Some(member) = members.next() {
                    return Some(EffectiveShare {
                        unit_id: self.unit,
                        partner_id: member.partner_id,
                        percentage: member.percentage,
                        path: OwnershipPath::Group {
                            link: link.id,
                            group: link.group_id,
                            member: member.id,
                        },
                    });
                }
            }
            let (link, members) = self.groups.next()?;
            self.current = Some((link, members.into_iter()));
        }
    }
}

fn lock_active_unit(tx: &mut dyn LedgerTx, id: UnitId) -> Result<()> {
    match tx.lock_unit(id)? {
        Some(unit) if unit.state.is_active() => Ok(()),
        _ => Err(LedgerError::not_found(EntityKind::Unit, id)),
    }
}

fn lock_active_group(tx: &mut dyn LedgerTx, id: GroupId) -> Result<PartnerGroup> {
    match tx.lock_group(id)? {
        Some(group) if group.state.is_active() => Ok(group),
        _ => Err(LedgerError::not_found(EntityKind::PartnerGroup, id)),
    }
}

fn active_group(tx: &mut dyn LedgerTx, id: GroupId) -> Result<PartnerGroup> {
    match tx.get_group(id)? {
        Some(group) if group.state.is_active() => Ok(group),
        _ => Err(LedgerError::not_found(EntityKind::PartnerGroup, id)),
    }
}

fn active_unit_partner(tx: &mut dyn LedgerTx, id: UnitPartnerId) -> Result<UnitPartner> {
    match tx.get_unit_partner(id)? {
        Some(link) if link.state.is_active() => Ok(link),
        _ => Err(LedgerError::not_found(EntityKind::UnitPartner, id)),
    }
}

fn active_member(tx: &mut dyn LedgerTx, id: MemberId) -> Result<GroupMember> {
    match tx.get_member(id)? {
        Some(member) if member.state.is_active() => Ok(member),
        _ => Err(LedgerError::not_found(EntityKind::GroupMember, id)),
    }
}
