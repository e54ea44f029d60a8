//! Group initiative engine
//!
//! Membership is derived from member tags ([`resolver`]), a group's shared
//! initiative is computed by [`aggregator`], and [`gate`] decides when a
//! group is complete enough to finalize. [`GroupManager`] ties these to a
//! [`Host`](crate::host::Host) and exposes the lifecycle operations.

pub mod aggregator;
pub mod events;
pub mod gate;
pub mod lifecycle;
pub mod resolver;
pub mod roll;
pub mod store;

pub use aggregator::{aggregate, group_value, Assignment, GroupOrder, InitiativeEntry};
pub use events::GroupEvent;
pub use gate::{FinalizationGate, FinalizeOutcome, FinalizeTrigger};
pub use lifecycle::GroupManager;
pub use resolver::{resolve, GroupEntry, GroupRecords, GroupView};
pub use store::GroupStore;
