//! Header controls and drag-and-drop, routed to lifecycle operations

use crate::core::error::Result;
use crate::core::types::{GroupId, MemberId};
use crate::group::GroupManager;
use crate::host::{Prompter, RollMode};
use crate::tracker::header::HeaderControl;
use tracing::debug;

/// What activating a control did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    /// A dialog was dismissed; nothing changed
    Cancelled,
    /// The operation ran but had nothing to change
    Unchanged,
}

impl GroupManager {
    /// Run one header control, asking for confirmation or input where needed
    pub async fn activate(
        &self,
        group: &GroupId,
        control: HeaderControl,
        mode: RollMode,
        prompter: &dyn Prompter,
    ) -> Result<ControlOutcome> {
        self.host().require_privilege()?;
        let record = self.require_record(group).await?;
        let name = record.display_name().to_string();
        debug!(group = %group, ?control, "header control");

        let outcome = match control {
            HeaderControl::Pin => {
                self.toggle_pin(group).await?;
                ControlOutcome::Applied
            }
            HeaderControl::Roll => match self.roll_group(group, mode).await? {
                Some(_) => ControlOutcome::Applied,
                None => ControlOutcome::Unchanged,
            },
            HeaderControl::Reset => {
                let title = format!("Reset Initiative for \"{}\"", name);
                if !prompter
                    .confirm(&title, "Clear initiative for all members of this group?")
                    .await
                {
                    return Ok(ControlOutcome::Cancelled);
                }
                self.reset_group_initiative(group).await?;
                ControlOutcome::Applied
            }
            HeaderControl::Delete => {
                let title = format!("Delete Group \"{}\"", name);
                if !prompter
                    .confirm(&title, "Delete this group and unassign its members?")
                    .await
                {
                    return Ok(ControlOutcome::Cancelled);
                }
                self.delete_group(group).await?;
                ControlOutcome::Applied
            }
            HeaderControl::Rename => {
                let Some(input) = prompter.prompt(control.label(), &name).await else {
                    return Ok(ControlOutcome::Cancelled);
                };
                if self.rename_group(group, &input).await? {
                    ControlOutcome::Applied
                } else {
                    ControlOutcome::Unchanged
                }
            }
            HeaderControl::SetInitiative => {
                let current = record
                    .finite_initiative()
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let Some(input) = prompter.prompt(control.label(), &current).await else {
                    return Ok(ControlOutcome::Cancelled);
                };
                self.set_group_initiative_from_input(group, &input).await?;
                ControlOutcome::Applied
            }
        };
        Ok(outcome)
    }

    /// A member dropped onto a group header, or anywhere else (`None`)
    pub async fn drop_member(
        &self,
        member: &MemberId,
        target: Option<&GroupId>,
    ) -> Result<Option<GroupId>> {
        match target {
            Some(group) if !group.is_ungrouped() => {
                self.assign_member(member, group).await?;
                Ok(Some(group.clone()))
            }
            _ => {
                self.unassign_member(member).await?;
                Ok(None)
            }
        }
    }
}
