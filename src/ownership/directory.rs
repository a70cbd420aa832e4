//! Reference records: units, partners, partner groups and brokers.

use crate::error::{LedgerError, Result};
use crate::ledger::instrument;
use crate::model::{
    Broker, BrokerId, EntityKind, GroupId, Partner, PartnerGroup, PartnerId, RecordState, Unit,
    UnitId,
};
use crate::store::{LedgerStore, LedgerTx};
use crate::validation::{ensure_name, ensure_non_negative_amount};
use chrono::Utc;
use rust_decimal::Decimal;

pub struct Directory<'a, S> {
    store: &'a S,
}

impl<'a, S: LedgerStore> Directory<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Self { store }
    }

    // Units

    pub fn create_unit(&self, name: &str, total_price: Decimal) -> Result<Unit> {
        instrument("directory", "create_unit", || {
            let name = ensure_name("unit name", name)?;
            ensure_non_negative_amount(total_price)?;
            let now = Utc::now();
            let unit = Unit {
                id: UnitId::new(),
                name,
                total_price,
                created_at: now,
                updated_at: now,
                state: RecordState::Active,
            };
            self.store.transaction(|tx| Ok(tx.insert_unit(&unit)?))?;
            Ok(unit)
        })
    }

    pub fn get_unit(&self, id: UnitId) -> Result<Unit> {
        self.store.snapshot(|tx| active_unit(tx, id))
    }

    pub fn list_units(&self) -> Result<Vec<Unit>> {
        self.store.snapshot(|tx| Ok(tx.list_units()?))
    }

    /// Soft-delete a unit together with its active direct links and group links.
    pub fn delete_unit(&self, id: UnitId) -> Result<Unit> {
        instrument("directory", "delete_unit", || {
            self.store.transaction(|tx| {
                let mut unit = match tx.lock_unit(id)? {
                    Some(unit) if unit.state.is_active() => unit,
                    _ => return Err(LedgerError::not_found(EntityKind::Unit, id)),
                };
                let now = Utc::now();
                let deleted = RecordState::Deleted { at: now };
                for mut link in tx.active_partners_of_unit(id)? {
                    link.state = deleted;
                    link.updated_at = now;
                    tx.update_unit_partner(&link)?;
                }
                for mut link in tx.active_groups_of_unit(id)? {
                    link.state = deleted;
                    link.updated_at = now;
                    tx.update_unit_group(&link)?;
                }
                unit.state = deleted;
                unit.updated_at = now;
                tx.update_unit(&unit)?;
                Ok(unit)
            })
        })
    }

    // Partners

    pub fn create_partner(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Partner> {
        instrument("directory", "create_partner", || {
            let now = Utc::now();
            let partner = Partner {
                id: PartnerId::new(),
                name: ensure_name("partner name", name)?,
                phone: optional_text(phone),
                email: optional_text(email),
                created_at: now,
                updated_at: now,
                state: RecordState::Active,
            };
            self.store.transaction(|tx| Ok(tx.insert_partner(&partner)?))?;
            Ok(partner)
        })
    }

    pub fn get_partner(&self, id: PartnerId) -> Result<Partner> {
        self.store.snapshot(|tx| active_partner(tx, id))
    }

    pub fn list_partners(&self) -> Result<Vec<Partner>> {
        self.store.snapshot(|tx| Ok(tx.list_partners()?))
    }

    /// Soft-delete a partner together with their direct links and group memberships.
    pub fn delete_partner(&self, id: PartnerId) -> Result<Partner> {
        instrument("directory", "delete_partner", || {
            self.store.transaction(|tx| {
                let mut partner = active_partner(tx, id)?;
                let now = Utc::now();
                let deleted = RecordState::Deleted { at: now };
                for mut link in tx.active_units_of_partner(id)? {
                    link.state = deleted;
                    link.updated_at = now;
                    tx.update_unit_partner(&link)?;
                }
                for mut member in tx.active_memberships_of_partner(id)? {
                    member.state = deleted;
                    member.updated_at = now;
                    tx.update_member(&member)?;
                }
                partner.state = deleted;
                partner.updated_at = now;
                tx.update_partner(&partner)?;
                Ok(partner)
            })
        })
    }

    // Groups

    pub fn create_group(&self, name: &str) -> Result<PartnerGroup> {
        instrument("directory", "create_group", || {
            let now = Utc::now();
            let group = PartnerGroup {
                id: GroupId::new(),
                name: ensure_name("group name", name)?,
                created_at: now,
                updated_at: now,
                state: RecordState::Active,
            };
            self.store.transaction(|tx| Ok(tx.insert_group(&group)?))?;
            Ok(group)
        })
    }

    pub fn get_group(&self, id: GroupId) -> Result<PartnerGroup> {
        self.store.snapshot(|tx| match tx.get_group(id)? {
            Some(group) if group.state.is_active() => Ok(group),
            _ => Err(LedgerError::not_found(EntityKind::PartnerGroup, id)),
        })
    }

    pub fn list_groups(&self) -> Result<Vec<PartnerGroup>> {
        self.store.snapshot(|tx| Ok(tx.list_groups()?))
    }

    // Brokers

    pub fn create_broker(&self, name: &str, phone: Option<&str>) -> Result<Broker> {
        instrument("directory", "create_broker", || {
            let now = Utc::now();
            let broker = Broker {
                id: BrokerId::new(),
                name: ensure_name("broker name", name)?,
                phone: optional_text(phone),
                created_at: now,
                updated_at: now,
                state: RecordState::Active,
            };
            self.store.transaction(|tx| Ok(tx.insert_broker(&broker)?))?;
            Ok(broker)
        })
    }

    pub fn get_broker(&self, id: BrokerId) -> Result<Broker> {
        self.store.snapshot(|tx| active_broker(tx, id))
    }

    pub fn list_brokers(&self) -> Result<Vec<Broker>> {
        self.store.snapshot(|tx| Ok(tx.list_brokers()?))
    }

    /// Soft-delete a broker. Their recorded dues stay as they are.
    pub fn delete_broker(&self, id: BrokerId) -> Result<Broker> {
        instrument("directory", "delete_broker", || {
            self.store.transaction(|tx| {
                let mut broker = active_broker(tx, id)?;
                let now = Utc::now();
                broker.state = RecordState::Deleted { at: now };
                broker.updated_at = now;
                tx.update_broker(&broker)?;
                Ok(broker)
            })
        })
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

pub(crate) fn active_unit(tx: &mut dyn LedgerTx, id: UnitId) -> Result<Unit> {
    match tx.get_unit(id)? {
        Some(unit) if unit.state.is_active() => Ok(unit),
        _ => Err(LedgerError::not_found(EntityKind::Unit, id)),
    }
}

pub(crate) fn active_partner(tx: &mut dyn LedgerTx, id: PartnerId) -> Result<Partner> {
    match tx.get_partner(id)? {
        Some(partner) if partner.state.is_active() => Ok(partner),
        _ => Err(LedgerError::not_found(EntityKind::Partner, id)),
    }
}

pub(crate) fn active_broker(tx: &mut dyn LedgerTx, id: BrokerId) -> Result<Broker> {
    match tx.get_broker(id)? {
        Some(broker) if broker.state.is_active() => Ok(broker),
        _ => Err(LedgerError::not_found(EntityKind::Broker, id)),
    }
}
