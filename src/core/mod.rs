pub mod config;
pub mod error;
pub mod types;

pub use config::Settings;
pub use error::{GroupError, Result};
pub use types::{GroupId, GroupRecord, Member, MemberId, MemberUpdate, UNGROUPED};
