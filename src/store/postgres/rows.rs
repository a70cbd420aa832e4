//! Row decoding.
//!
//! Every ledger table carries `created_at`, `updated_at` and a nullable `deleted_at`;
//! the last one becomes the record's [`RecordState`].

use crate::error::StoreError;
use crate::model::*;
use may_postgres::types::FromSql;
use may_postgres::Row;

pub(super) const SAFE_COLUMNS: &str =
    "id, name, opening_balance, balance, created_at, updated_at, deleted_at";
pub(super) const VOUCHER_COLUMNS: &str = "id, kind, date, amount, safe_id, description, payer, \
     beneficiary, link_type, link_id, created_at, updated_at, deleted_at";
pub(super) const TRANSFER_COLUMNS: &str = "id, from_safe_id, to_safe_id, amount, date, description, \
     created_at, updated_at, deleted_at";
pub(super) const UNIT_COLUMNS: &str = "id, name, total_price, created_at, updated_at, deleted_at";
pub(super) const PARTNER_COLUMNS: &str =
    "id, name, phone, email, created_at, updated_at, deleted_at";
pub(super) const GROUP_COLUMNS: &str = "id, name, created_at, updated_at, deleted_at";
pub(super) const MEMBER_COLUMNS: &str =
    "id, group_id, partner_id, percentage, created_at, updated_at, deleted_at";
pub(super) const UNIT_PARTNER_COLUMNS: &str =
    "id, unit_id, partner_id, percentage, created_at, updated_at, deleted_at";
pub(super) const UNIT_GROUP_COLUMNS: &str =
    "id, unit_id, group_id, created_at, updated_at, deleted_at";
pub(super) const BROKER_COLUMNS: &str = "id, name, phone, created_at, updated_at, deleted_at";

/// Table and party column of an obligation kind.
pub(super) fn obligation_table(kind: ObligationKind) -> (&'static str, &'static str) {
    match kind {
        ObligationKind::BrokerDue => ("broker_dues", "broker_id"),
        ObligationKind::PartnerDebt => ("partner_debts", "partner_id"),
    }
}

pub(super) fn obligation_columns(kind: ObligationKind) -> String {
    let (_, party) = obligation_table(kind);
    format!(
        "id, {party}, amount, due_date, notes, status, paid_at, created_at, updated_at, deleted_at"
    )
}

/// Reads rows of one table, tagging decode failures with the table name.
pub(super) struct RowReader<'r> {
    table: &'static str,
    row: &'r Row,
}

impl<'r> RowReader<'r> {
    pub(super) fn new(table: &'static str, row: &'r Row) -> Self {
        Self { table, row }
    }

    pub(super) fn get<T>(&self, column: &str) -> Result<T, StoreError>
    where
        T: FromSql<'r>,
    {
        self.row
            .try_get::<_, T>(column)
            .map_err(|e| self.decode_error(format!("column {column}: {e}")))
    }

    fn state(&self) -> Result<RecordState, StoreError> {
        Ok(RecordState::from_deleted_at(self.get("deleted_at")?))
    }

    fn decode_error(&self, reason: String) -> StoreError {
        StoreError::Decode {
            table: self.table,
            reason,
        }
    }
}

pub(super) fn safe(row: &Row) -> Result<Safe, StoreError> {
    let r = RowReader::new("safes", row);
    Ok(Safe {
        id: SafeId(r.get("id")?),
        name: r.get("name")?,
        opening_balance: r.get("opening_balance")?,
        balance: r.get("balance")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn voucher(row: &Row) -> Result<Voucher, StoreError> {
    let r = RowReader::new("vouchers", row);
    let kind: String = r.get("kind")?;
    let link_type: Option<String> = r.get("link_type")?;
    let link_id: Option<uuid::Uuid> = r.get("link_id")?;
    let linked = match (link_type, link_id) {
        (Some(t), Some(id)) => Some(VoucherLink::from_columns(&t, id).map_err(|e| r.decode_error(e))?),
        (None, None) => None,
        _ => return Err(r.decode_error("link_type and link_id must be set together".to_string())),
    };
    Ok(Voucher {
        id: VoucherId(r.get("id")?),
        kind: kind.parse().map_err(|e| r.decode_error(e))?,
        date: r.get("date")?,
        amount: r.get("amount")?,
        safe_id: SafeId(r.get("safe_id")?),
        description: r.get("description")?,
        payer: r.get("payer")?,
        beneficiary: r.get("beneficiary")?,
        linked,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn transfer(row: &Row) -> Result<Transfer, StoreError> {
    let r = RowReader::new("transfers", row);
    Ok(Transfer {
        id: TransferId(r.get("id")?),
        from_safe: SafeId(r.get("from_safe_id")?),
        to_safe: SafeId(r.get("to_safe_id")?),
        amount: r.get("amount")?,
        date: r.get("date")?,
        description: r.get("description")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn unit(row: &Row) -> Result<Unit, StoreError> {
    let r = RowReader::new("units", row);
    Ok(Unit {
        id: UnitId(r.get("id")?),
        name: r.get("name")?,
        total_price: r.get("total_price")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn partner(row: &Row) -> Result<Partner, StoreError> {
    let r = RowReader::new("partners", row);
    Ok(Partner {
        id: PartnerId(r.get("id")?),
        name: r.get("name")?,
        phone: r.get("phone")?,
        email: r.get("email")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn group(row: &Row) -> Result<PartnerGroup, StoreError> {
    let r = RowReader::new("partner_groups", row);
    Ok(PartnerGroup {
        id: GroupId(r.get("id")?),
        name: r.get("name")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn member(row: &Row) -> Result<GroupMember, StoreError> {
    let r = RowReader::new("partner_group_partners", row);
    Ok(GroupMember {
        id: MemberId(r.get("id")?),
        group_id: GroupId(r.get("group_id")?),
        partner_id: PartnerId(r.get("partner_id")?),
        percentage: r.get("percentage")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn unit_partner(row: &Row) -> Result<UnitPartner, StoreError> {
    let r = RowReader::new("unit_partners", row);
    Ok(UnitPartner {
        id: UnitPartnerId(r.get("id")?),
        unit_id: UnitId(r.get("unit_id")?),
        partner_id: PartnerId(r.get("partner_id")?),
        percentage: r.get("percentage")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn unit_group(row: &Row) -> Result<UnitGroupLink, StoreError> {
    let r = RowReader::new("unit_partner_groups", row);
    Ok(UnitGroupLink {
        id: UnitGroupId(r.get("id")?),
        unit_id: UnitId(r.get("unit_id")?),
        group_id: GroupId(r.get("group_id")?),
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn broker(row: &Row) -> Result<Broker, StoreError> {
    let r = RowReader::new("brokers", row);
    Ok(Broker {
        id: BrokerId(r.get("id")?),
        name: r.get("name")?,
        phone: r.get("phone")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}

pub(super) fn obligation(kind: ObligationKind, row: &Row) -> Result<Obligation, StoreError> {
    let (table, party_column) = obligation_table(kind);
    let r = RowReader::new(table, row);
    let party_id: uuid::Uuid = r.get(party_column)?;
    let party = match kind {
        ObligationKind::BrokerDue => Party::Broker(BrokerId(party_id)),
        ObligationKind::PartnerDebt => Party::Partner(PartnerId(party_id)),
    };
    let status: String = r.get("status")?;
    Ok(Obligation {
        id: ObligationId(r.get("id")?),
        party,
        amount: r.get("amount")?,
        due_date: r.get("due_date")?,
        notes: r.get("notes")?,
        status: status.parse().map_err(|e| r.decode_error(e))?,
        paid_at: r.get("paid_at")?,
        created_at: r.get("created_at")?,
        updated_at: r.get("updated_at")?,
        state: r.state()?,
    })
}
