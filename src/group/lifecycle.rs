//! Group lifecycle operations
//!
//! Create, rename, pin, assign, unassign, delete and manual initiative.
//! Every mutating operation checks privilege before its first write and
//! returns `PermissionDenied` without touching state otherwise.

use crate::core::config::Settings;
use crate::core::error::{GroupError, Result};
use crate::core::types::{
    round_hundredths, Appearance, GroupId, GroupRecord, Member, MemberId, MemberUpdate,
};
use crate::group::aggregator::{
    is_settled, restagger, stagger_with_newcomer, GroupOrder, InitiativeEntry,
};
use crate::group::gate::FinalizationGate;
use crate::group::resolver::{resolve, GroupView};
use crate::group::store::GroupStore;
use crate::host::{GroupField, Host, RollHookRegistry};
use crate::tracker::expand::ExpandStore;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the group engine for one encounter
pub struct GroupManager {
    host: Host,
    store: GroupStore,
    settings: Arc<Settings>,
    gate: Arc<FinalizationGate>,
    expanded: ExpandStore,
    roll_hook_registered: AtomicBool,
}

impl GroupManager {
    /// Manager with its own finalization gate
    pub fn new(host: Host, settings: Arc<Settings>) -> Self {
        Self::with_gate(host, settings, Arc::new(FinalizationGate::new()))
    }

    /// Manager sharing a gate, so finalize runs serialize across encounters
    pub fn with_gate(host: Host, settings: Arc<Settings>, gate: Arc<FinalizationGate>) -> Self {
        let store = GroupStore::new(host.tags.clone());
        Self {
            host,
            store,
            settings,
            gate,
            expanded: ExpandStore::new(),
            roll_hook_registered: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gate(&self) -> &Arc<FinalizationGate> {
        &self.gate
    }

    pub fn expanded(&self) -> &ExpandStore {
        &self.expanded
    }

    /// Current membership view
    pub async fn groups(&self) -> Result<GroupView> {
        let members = self.host.roster.members().await?;
        let records = self.store.records().await?;
        Ok(resolve(&members, &records))
    }

    /// Members currently tagged with a group
    pub async fn group_members(&self, group: &GroupId) -> Result<Vec<Member>> {
        Ok(self
            .host
            .roster
            .members()
            .await?
            .into_iter()
            .filter(|m| m.belongs_to(group))
            .collect())
    }

    /// Record for a group, warning the user when it is gone
    pub(crate) async fn require_record(&self, group: &GroupId) -> Result<GroupRecord> {
        match self.store.record(group).await? {
            Some(record) => Ok(record),
            None => {
                warn!(group = %group, "no stored data for group");
                self.host.notifier.warn("Could not find group data.").await;
                Err(GroupError::MissingGroup(group.clone()))
            }
        }
    }

    /// Create a group and tag the given members with it
    pub async fn create_group(
        &self,
        name: &str,
        appearance: Appearance,
        members: &[MemberId],
    ) -> Result<GroupId> {
        self.host.require_privilege()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(GroupError::InvalidInput("group name is empty".into()));
        }

        let roster = self.host.roster.members().await?;
        let selected: Vec<&MemberId> = members
            .iter()
            .filter(|id| {
                let known = roster.iter().any(|m| &m.id == *id);
                if !known {
                    warn!(member = %id, "selected member is not in the encounter");
                }
                known
            })
            .collect();

        let defaults = &self.settings.groups;
        let id = GroupId::generate();
        let record = GroupRecord {
            name: Some(name.to_string()),
            initiative: None,
            pinned: false,
            expanded: true,
            img: appearance
                .img
                .filter(|s| !s.trim().is_empty())
                .or_else(|| Some(defaults.img.clone())),
            color: appearance
                .color
                .filter(|s| !s.trim().is_empty())
                .or_else(|| Some(defaults.color.clone())),
        };
        self.store.put(&id, &record).await?;
        self.expanded.expand(&id);

        for member in &selected {
            self.host.tags.set_member_group(member, &id).await?;
        }

        info!(group = %id, name, members = selected.len(), "created group");
        self.host
            .notifier
            .info(&format!(
                "Created group \u{201c}{}\u{201d} with {} member(s).",
                name,
                selected.len()
            ))
            .await;
        Ok(id)
    }

    /// Rename a group; returns whether the name changed
    pub async fn rename_group(&self, group: &GroupId, new_name: &str) -> Result<bool> {
        self.host.require_privilege()?;
        let record = self.require_record(group).await?;

        let new_name = new_name.trim();
        if new_name.is_empty() || Some(new_name) == record.name.as_deref() {
            return Ok(false);
        }

        self.store
            .set_field(group, GroupField::Name, Value::from(new_name))
            .await?;
        debug!(group = %group, name = new_name, "renamed group");
        Ok(true)
    }

    /// Flip a group's pin; returns the new state
    pub async fn toggle_pin(&self, group: &GroupId) -> Result<bool> {
        self.host.require_privilege()?;
        let record = self.require_record(group).await?;
        let pinned = !record.pinned;
        self.store
            .set_field(group, GroupField::Pinned, Value::Bool(pinned))
            .await?;
        Ok(pinned)
    }

    /// Tag a member with a group
    ///
    /// Joining a group with a finalized initiative slots the member in at the
    /// bottom of the stagger and re-staggers the existing members above it,
    /// all in one batch with the passive listener suspended.
    pub async fn assign_member(&self, member: &MemberId, group: &GroupId) -> Result<()> {
        self.host.require_privilege()?;
        if group.is_ungrouped() {
            self.unassign_member(member).await?;
            return Ok(());
        }

        let record = self.require_record(group).await?;
        let joining = self
            .host
            .roster
            .member(member)
            .await?
            .ok_or_else(|| GroupError::InvalidInput(format!("unknown member {}", member)))?;
        let previous = joining.group.clone().filter(|g| g != group && !g.is_ungrouped());

        self.host.tags.set_member_group(member, group).await?;
        if let Some(previous) = &previous {
            self.settle_after_departure(previous).await?;
        }

        let Some(base) = record.finite_initiative() else {
            debug!(group = %group, member = %member, "assigned to unrolled group");
            return Ok(());
        };

        let default_tiebreak = self.settings.initiative.default_tiebreak;
        let existing: Vec<Member> = self
            .group_members(group)
            .await?
            .into_iter()
            .filter(|m| &m.id != member)
            .collect();
        let entries: Vec<InitiativeEntry> = existing
            .iter()
            .filter_map(|m| InitiativeEntry::from_member(m, default_tiebreak))
            .collect();
        let max_sort = existing
            .iter()
            .filter(|m| m.has_finite_initiative())
            .filter_map(|m| m.sort)
            .fold(0, i64::max);

        let updates: Vec<MemberUpdate> = stagger_with_newcomer(base, &entries, member)
            .into_iter()
            .map(|(id, value)| {
                let update = MemberUpdate::initiative(id.clone(), value);
                if &id == member {
                    update.with_sort(max_sort + self.settings.initiative.sort_stride)
                } else {
                    update
                }
            })
            .collect();

        self.suspend_finalize(group).await?;
        let written = self.host.roster.bulk_update(&updates).await;
        self.resume_finalize(group).await?;
        written?;

        debug!(group = %group, member = %member, base, "slotted member into finalized group");
        Ok(())
    }

    /// Clear a member's group tag; returns the group it left
    pub async fn unassign_member(&self, member: &MemberId) -> Result<Option<GroupId>> {
        self.host.require_privilege()?;
        let Some(previous) = self
            .host
            .tags
            .member_group(member)
            .await?
            .filter(|g| !g.is_ungrouped())
        else {
            return Ok(None);
        };

        self.host.tags.unset_member_group(member).await?;
        self.settle_after_departure(&previous).await?;
        debug!(group = %previous, member = %member, "unassigned member");
        Ok(Some(previous))
    }

    /// Keep a group consistent after a member left it
    ///
    /// An emptied group loses its cached initiative. A finalized group whose
    /// remaining members are all rolled is re-staggered so it stays settled.
    async fn settle_after_departure(&self, group: &GroupId) -> Result<()> {
        let remaining = self.group_members(group).await?;
        if remaining.is_empty() {
            self.store.set_initiative(group, None).await?;
            debug!(group = %group, "last member left, cleared group initiative");
            return Ok(());
        }

        let cached = self
            .store
            .record(group)
            .await?
            .and_then(|r| r.finite_initiative());
        let Some(base) = cached else {
            return Ok(());
        };
        if !FinalizationGate::is_ready(&remaining) {
            return Ok(());
        }

        let default_tiebreak = self.settings.initiative.default_tiebreak;
        let entries: Vec<InitiativeEntry> = remaining
            .iter()
            .filter_map(|m| InitiativeEntry::from_member(m, default_tiebreak))
            .collect();
        if is_settled(base, &entries) {
            return Ok(());
        }

        let updates: Vec<MemberUpdate> = restagger(base, &entries)
            .into_iter()
            .map(|(id, value)| MemberUpdate::initiative(id, value))
            .collect();
        self.suspend_finalize(group).await?;
        let written = self.host.roster.bulk_update(&updates).await;
        self.resume_finalize(group).await?;
        written?;

        debug!(group = %group, remaining = updates.len(), "re-staggered after departure");
        Ok(())
    }

    /// Delete a group and return its former members to ungrouped
    pub async fn delete_group(&self, group: &GroupId) -> Result<Vec<MemberId>> {
        self.host.require_privilege()?;
        self.require_record(group).await?;

        let former: Vec<MemberId> = self
            .group_members(group)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        self.store.remove(group).await?;
        for member in &former {
            self.host.tags.unset_member_group(member).await?;
        }
        self.store.clear_skip_finalize(group).await?;
        self.store.set_manual_override(group, false).await?;
        self.expanded.collapse(group);

        info!(group = %group, members = former.len(), "deleted group");
        Ok(former)
    }

    /// Move a group to a new base initiative, keeping member spacing
    ///
    /// The shift is `new_base - old`, where `old` is the cached group value,
    /// or the mean of rolled members when nothing is cached. Unrolled members
    /// stay unrolled. The base is kept to hundredths so the shifted members
    /// remain an exact stagger of it.
    pub async fn set_group_initiative_manually(
        &self,
        group: &GroupId,
        new_base: f64,
    ) -> Result<()> {
        self.host.require_privilege()?;
        if !new_base.is_finite() {
            return Err(GroupError::InvalidInput(format!(
                "initiative must be a number, got {}",
                new_base
            )));
        }
        let new_base = round_hundredths(new_base);
        let record = self.require_record(group).await?;

        let members = self.group_members(group).await?;
        let rolled: Vec<(MemberId, f64)> = members
            .iter()
            .filter_map(|m| m.initiative.filter(|v| v.is_finite()).map(|v| (m.id.clone(), v)))
            .collect();
        if members.is_empty() {
            return Ok(());
        }

        let old = record.finite_initiative().unwrap_or_else(|| {
            if rolled.is_empty() {
                0.0
            } else {
                rolled.iter().map(|(_, v)| v).sum::<f64>() / rolled.len() as f64
            }
        });
        let updates: Vec<MemberUpdate> = rolled
            .into_iter()
            .map(|(id, v)| MemberUpdate::initiative(id, round_hundredths(new_base + (v - old))))
            .collect();

        self.suspend_finalize(group).await?;
        let written = self.write_manual_initiative(group, &updates, new_base).await;
        self.resume_finalize(group).await?;
        written?;

        info!(group = %group, from = old, to = new_base, "set group initiative");
        Ok(())
    }

    async fn write_manual_initiative(
        &self,
        group: &GroupId,
        updates: &[MemberUpdate],
        new_base: f64,
    ) -> Result<()> {
        if !updates.is_empty() {
            self.host.roster.bulk_update(updates).await?;
        }
        self.store.set_initiative(group, Some(new_base)).await
    }

    /// Parse a typed initiative and apply it
    pub async fn set_group_initiative_from_input(
        &self,
        group: &GroupId,
        input: &str,
    ) -> Result<()> {
        let value: f64 = input
            .trim()
            .parse()
            .map_err(|_| GroupError::InvalidInput(format!("not a number: {:?}", input)))?;
        self.set_group_initiative_manually(group, value).await
    }

    /// Persist a finalized order: member values in one batch, then the group value
    pub(crate) async fn apply_group_order(
        &self,
        group: &GroupId,
        order: &GroupOrder,
    ) -> Result<()> {
        self.host.require_privilege()?;
        self.host.roster.bulk_update(&order.updates()).await?;
        self.store.set_initiative(group, Some(order.group_value)).await?;
        debug!(group = %group, updates = order.assignments.len(), "applied group order");
        Ok(())
    }

    /// Register this manager's roll-all hook with the host, once
    pub fn wrap_roll_completion(self: &Arc<Self>, registry: &dyn RollHookRegistry) -> bool {
        if self.roll_hook_registered.swap(true, Ordering::SeqCst) {
            return false;
        }
        registry.register_roll_completion(self.clone());
        debug!("registered roll-all completion hook");
        true
    }
}
