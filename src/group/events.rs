//! Typed events from the host and their dispatch

use crate::core::error::{GroupError, Result};
use crate::core::types::{GroupId, MemberId};
use crate::group::GroupManager;
use crate::host::EncounterListener;
use async_trait::async_trait;

/// A change the host reports to the group engine
#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    InitiativeChanged {
        member: MemberId,
        group: Option<GroupId>,
        value: Option<f64>,
    },
    MemberCreated {
        member: MemberId,
    },
    TurnChanged {
        active_member: Option<MemberId>,
    },
    RollAllCompleted,
}

impl GroupManager {
    /// Route one event to its handler
    pub async fn dispatch(&self, event: &GroupEvent) -> Result<()> {
        match event {
            GroupEvent::InitiativeChanged { member, group, .. } => {
                let outcome = self.on_initiative_changed(member, group.as_ref()).await?;
                tracing::trace!(member = %member, ?outcome, "initiative change handled");
            }
            GroupEvent::MemberCreated { member } => self.on_member_created(member).await?,
            GroupEvent::TurnChanged { active_member } => {
                self.on_turn_changed(active_member.as_ref()).await?;
            }
            GroupEvent::RollAllCompleted => {
                self.after_roll_all_groups().await?;
            }
        }
        Ok(())
    }

    /// Tag a new member as ungrouped if it carries no tag
    pub async fn on_member_created(&self, member: &MemberId) -> Result<()> {
        if !self.host().is_privileged() {
            return Ok(());
        }
        if self.host().tags.member_group(member).await?.is_none() {
            self.host()
                .tags
                .set_member_group(member, &GroupId::ungrouped())
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EncounterListener for GroupManager {
    async fn on_event(&self, event: GroupEvent) {
        match self.dispatch(&event).await {
            Ok(()) => {}
            Err(GroupError::PermissionDenied) => {
                tracing::trace!(?event, "ignoring event without privilege");
            }
            Err(e) => tracing::warn!(?event, error = %e, "group event failed"),
        }
    }
}
