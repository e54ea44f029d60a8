//! Finalization gate
//!
//! Decides, whenever a member's initiative changes, whether its group is
//! now fully rolled and should be finalized. Finalize runs are serialized
//! through one [`FinalizationGate`]: a request arriving while another run
//! is in progress, for any group, is dropped rather than queued. The next
//! member change re-evaluates readiness and asks again.
//!
//! A group can also be suspended with its skip flag while a caller writes a
//! batch of member initiatives itself; the passive listener ignores the
//! group until the flag is cleared.

use crate::core::error::Result;
use crate::core::types::{GroupId, Member, MemberId};
use crate::group::aggregator::{
    aggregate, canonical_order, is_settled, GroupOrder, InitiativeEntry,
};
use crate::group::GroupManager;
use crate::host::{Recipients, Summary};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Why a finalize was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeTrigger {
    /// A user rolled the group or the whole encounter; a summary is broadcast
    Explicit,
    /// The last missing initiative arrived some other way; silent
    Passive,
}

/// What a finalize request did
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// Group value computed and written
    Finalized(GroupOrder),
    /// Members already hold the stagger of the cached value; nothing written
    AlreadySettled,
    /// Some member still lacks a finite initiative
    NotReady,
    /// Group has no members
    Empty,
    /// Another finalize was running; request dropped
    Reentrant,
    /// Group is suspended by its skip flag
    Skipped,
    /// Change did not concern a real group
    Ignored,
    /// Members are tagged with a group that has no stored record
    MissingGroup,
}

impl FinalizeOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, FinalizeOutcome::Finalized(_))
    }
}

/// Re-entrancy token shared by every finalize run it guards
#[derive(Debug, Default)]
pub struct FinalizationGate {
    running: AtomicBool,
    finalized: AtomicUsize,
}

/// Held for the duration of one finalize run
pub struct GateGuard<'a> {
    gate: &'a FinalizationGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

impl FinalizationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Enter the gate, or `None` if a run is already in progress
    pub fn try_enter(&self) -> Option<GateGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    /// Number of finalize runs that wrote a result
    pub fn finalized_count(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }

    fn record_finalized(&self) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
    }

    /// Readiness predicate: at least one member, every initiative finite
    pub fn is_ready(members: &[Member]) -> bool {
        !members.is_empty() && members.iter().all(Member::has_finite_initiative)
    }
}

fn summary(name: &str, group_value: f64, ranked: &[InitiativeEntry]) -> Summary {
    let mut lines = vec![format!("Group initiative: {}", group_value)];
    lines.extend(ranked.iter().map(|e| format!("{}: {}", e.name, e.initiative)));
    Summary {
        title: format!("{} initiative rolled", name),
        lines,
        recipients: Recipients::Privileged,
    }
}

/// Summary for a group that was already settled; member values are placements
fn settled_summary(name: &str, group_value: f64, ranked: &[InitiativeEntry]) -> Summary {
    let mut lines = vec![format!("Group initiative: {}", group_value)];
    lines.extend(
        ranked
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}. {} (placed at {})", i + 1, e.name, e.initiative)),
    );
    Summary {
        title: format!("{} turn order", name),
        lines,
        recipients: Recipients::Privileged,
    }
}

impl GroupManager {
    /// Finalize a group if it is ready
    ///
    /// The result is a pure function of current member state: a group that
    /// is already settled at its cached value is left untouched.
    pub async fn finalize_group(
        &self,
        group: &GroupId,
        trigger: FinalizeTrigger,
    ) -> Result<FinalizeOutcome> {
        let Some(_guard) = self.gate().try_enter() else {
            debug!(group = %group, "finalize already running, dropping request");
            return Ok(FinalizeOutcome::Reentrant);
        };
        self.host().require_privilege()?;

        let Some(record) = self.store().record(group).await? else {
            warn!(group = %group, "Could not find group data.");
            return Ok(FinalizeOutcome::MissingGroup);
        };

        let members = self.group_members(group).await?;
        if members.is_empty() {
            return Ok(FinalizeOutcome::Empty);
        }
        if !FinalizationGate::is_ready(&members) {
            debug!(group = %group, "group still waiting on initiative");
            return Ok(FinalizeOutcome::NotReady);
        }

        let default_tiebreak = self.settings().initiative.default_tiebreak;
        let entries: Vec<InitiativeEntry> = members
            .iter()
            .filter_map(|m| InitiativeEntry::from_member(m, default_tiebreak))
            .collect();

        let name = record.display_name().to_string();

        if let Some(cached) = record.finite_initiative() {
            if is_settled(cached, &entries) {
                debug!(group = %group, cached, "group already settled");
                if trigger == FinalizeTrigger::Explicit {
                    let mut ranked = entries;
                    canonical_order(&mut ranked);
                    self.host()
                        .notifier
                        .broadcast(settled_summary(&name, cached, &ranked))
                        .await?;
                }
                return Ok(FinalizeOutcome::AlreadySettled);
            }
        }

        let lowest_sort = self
            .host()
            .roster
            .members()
            .await?
            .iter()
            .filter_map(|m| m.sort)
            .min()
            .unwrap_or(0);
        let Some(order) = aggregate(&entries, lowest_sort, &self.settings().initiative) else {
            return Ok(FinalizeOutcome::Empty);
        };

        self.apply_group_order(group, &order).await?;
        self.gate().record_finalized();

        info!(
            group = %group,
            value = order.group_value,
            members = order.ranked.len(),
            "finalized group initiative"
        );

        if trigger == FinalizeTrigger::Explicit {
            self.host()
                .notifier
                .broadcast(summary(&name, order.group_value, &order.ranked))
                .await?;
        }
        Ok(FinalizeOutcome::Finalized(order))
    }

    /// Passive listener for a member's initiative change
    pub async fn on_initiative_changed(
        &self,
        member: &MemberId,
        group: Option<&GroupId>,
    ) -> Result<FinalizeOutcome> {
        if self.gate().is_running() {
            return Ok(FinalizeOutcome::Reentrant);
        }

        let group = match group {
            Some(g) => Some(g.clone()),
            None => self.host().tags.member_group(member).await?,
        };
        let Some(group) = group.filter(|g| !g.is_ungrouped()) else {
            return Ok(FinalizeOutcome::Ignored);
        };

        if self.store().skip_finalize(&group).await? {
            debug!(group = %group, member = %member, "finalize suspended for batch");
            return Ok(FinalizeOutcome::Skipped);
        }

        self.finalize_group(&group, FinalizeTrigger::Passive).await
    }

    /// Set the skip flag before the first write of a batch
    pub(crate) async fn suspend_finalize(&self, group: &GroupId) -> Result<()> {
        self.store().set_skip_finalize(group).await
    }

    /// Clear the skip flag after the last write of a batch
    pub(crate) async fn resume_finalize(&self, group: &GroupId) -> Result<()> {
        self.store().clear_skip_finalize(group).await
    }
}
