use crate::macros::entity_id;

entity_id!(
    /// Identifies a [`Safe`](super::Safe).
    SafeId
);
entity_id!(VoucherId);
entity_id!(TransferId);
entity_id!(UnitId);
entity_id!(
    /// Sales contract id. Contracts live outside the ledger; vouchers only point at them.
    ContractId
);
entity_id!(PartnerId);
entity_id!(GroupId);
entity_id!(
    /// One (group, partner, percentage) membership row.
    MemberId
);
entity_id!(
    /// One direct (unit, partner, percentage) link.
    UnitPartnerId
);
entity_id!(
    /// One (unit, group) link.
    UnitGroupId
);
entity_id!(BrokerId);
entity_id!(ObligationId);
