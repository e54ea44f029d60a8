//! Host collaborators the group engine calls through
//!
//! Everything the engine needs from the surrounding tracker goes through
//! the narrow traits in this module: flag persistence, the member roster,
//! dice, notifications and the privilege check. [`memory`] provides an
//! in-process implementation of all of them.

pub mod dice;
pub mod flags;
pub mod memory;

pub use dice::{Keep, RollFormula, RollMode, SeededDice};
pub use flags::{FlagKey, GroupField};
pub use memory::{
    MemoryEncounter, RecordingNotifier, ScriptedDice, ScriptedPrompter, StaticPrivilege,
};

use crate::core::error::{GroupError, Result};
use crate::core::types::{GroupId, Member, MemberId, MemberUpdate};
use crate::group::events::GroupEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Key/value flag persistence on the encounter and its members
///
/// Each call touches exactly one key path and is all-or-nothing for it.
#[async_trait]
pub trait TagStore: Send + Sync {
    async fn get_flag(&self, key: &FlagKey) -> Result<Option<Value>>;
    async fn set_flag(&self, key: &FlagKey, value: Value) -> Result<()>;
    async fn unset_flag(&self, key: &FlagKey) -> Result<()>;

    /// Group tag of a member
    async fn member_group(&self, member: &MemberId) -> Result<Option<GroupId>>;
    async fn set_member_group(&self, member: &MemberId, group: &GroupId) -> Result<()>;
    async fn unset_member_group(&self, member: &MemberId) -> Result<()>;
}

/// The encounter's members
#[async_trait]
pub trait MemberRoster: Send + Sync {
    /// Snapshot of every member, tags included
    async fn members(&self) -> Result<Vec<Member>>;

    async fn member(&self, id: &MemberId) -> Result<Option<Member>> {
        Ok(self.members().await?.into_iter().find(|m| &m.id == id))
    }

    /// Apply a batch of member updates in one call
    ///
    /// Either every update lands or none does.
    async fn bulk_update(&self, updates: &[MemberUpdate]) -> Result<()>;
}

/// Abstract dice evaluator
#[async_trait]
pub trait RollService: Send + Sync {
    async fn roll(&self, formula: &RollFormula) -> Result<f64>;
}

/// Who may read a broadcast summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    Privileged,
}

/// Announcement sent after an explicit group roll
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub title: String,
    pub lines: Vec<String>,
    pub recipients: Recipients,
}

/// User-facing messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn info(&self, message: &str);
    async fn warn(&self, message: &str);
    /// Privileged-only announcement channel
    async fn broadcast(&self, summary: Summary) -> Result<()>;
}

/// Whether the current user may change shared group state
pub trait PrivilegeCheck: Send + Sync {
    fn is_privileged(&self) -> bool;
}

/// Runs after the host finishes rolling initiative for the whole encounter
#[async_trait]
pub trait RollCompletionHook: Send + Sync {
    async fn after_roll_all(&self) -> Result<()>;
}

/// Host extension point for roll-all completion
pub trait RollHookRegistry: Send + Sync {
    fn register_roll_completion(&self, hook: Arc<dyn RollCompletionHook>);
}

/// Confirmation and text-entry dialogs
///
/// A dismissed dialog answers `false` or `None` and the caller changes nothing.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn confirm(&self, title: &str, body: &str) -> bool;
    async fn prompt(&self, title: &str, initial: &str) -> Option<String>;
}

/// Receives typed change notifications from the host
#[async_trait]
pub trait EncounterListener: Send + Sync {
    async fn on_event(&self, event: GroupEvent);
}

/// Bundle of collaborators for one encounter
#[derive(Clone)]
pub struct Host {
    pub tags: Arc<dyn TagStore>,
    pub roster: Arc<dyn MemberRoster>,
    pub dice: Arc<dyn RollService>,
    pub notifier: Arc<dyn Notifier>,
    pub privilege: Arc<dyn PrivilegeCheck>,
}

impl Host {
    /// Wire every collaborator to one in-memory encounter
    pub fn in_memory(
        encounter: Arc<MemoryEncounter>,
        dice: Arc<dyn RollService>,
        notifier: Arc<dyn Notifier>,
        privilege: Arc<dyn PrivilegeCheck>,
    ) -> Self {
        Self {
            tags: encounter.clone(),
            roster: encounter,
            dice,
            notifier,
            privilege,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.privilege.is_privileged()
    }

    /// Fail with `PermissionDenied` unless the current user is privileged
    pub fn require_privilege(&self) -> Result<()> {
        if self.privilege.is_privileged() {
            Ok(())
        } else {
            Err(GroupError::PermissionDenied)
        }
    }
}
