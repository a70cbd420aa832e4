//! Units, partners, groups and brokers, and the ownership graph linking them.
//!
//! A partner reaches a unit either directly, with a percentage, or through a group
//! linked to the unit, with their membership percentage. The two paths are independent
//! and both count when they coexist.

mod directory;
mod graph;

pub use directory::Directory;
pub use graph::{EffectivePartners, OwnershipGraph};

pub(crate) use directory::{active_broker, active_partner, active_unit};
