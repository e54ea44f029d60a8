//! Rolling and clearing initiative for a whole group

use crate::core::error::{GroupError, Result};
use crate::core::types::{GroupId, Member, MemberUpdate};
use crate::group::gate::{FinalizeOutcome, FinalizeTrigger};
use crate::group::GroupManager;
use crate::host::{RollCompletionHook, RollMode};
use async_trait::async_trait;
use tracing::{debug, info};

impl GroupManager {
    /// Roll every member of a group that has no initiative yet, then finalize
    ///
    /// Returns `None` when nothing needed rolling. A failed roll aborts the
    /// whole operation before any member is written.
    pub async fn roll_group(
        &self,
        group: &GroupId,
        mode: RollMode,
    ) -> Result<Option<FinalizeOutcome>> {
        self.host().require_privilege()?;
        let record = self.require_record(group).await?;

        let pending: Vec<Member> = self
            .group_members(group)
            .await?
            .into_iter()
            .filter(|m| !m.has_finite_initiative())
            .collect();
        if pending.is_empty() {
            self.host()
                .notifier
                .info(&format!(
                    "Group \"{}\" already has initiative.",
                    record.display_name()
                ))
                .await;
            return Ok(None);
        }

        let mut updates = Vec::with_capacity(pending.len());
        for member in &pending {
            let formula = mode.formula(member.initiative_modifier);
            let total = self.host().dice.roll(&formula).await.map_err(|e| {
                GroupError::Roll(format!("{} for {}: {}", formula, member.name, e))
            })?;
            debug!(group = %group, member = %member.id, %formula, total, "rolled");
            updates.push(MemberUpdate::initiative(member.id.clone(), total));
        }

        self.suspend_finalize(group).await?;
        let written = self.host().roster.bulk_update(&updates).await;
        self.resume_finalize(group).await?;
        written?;

        info!(group = %group, rolled = updates.len(), ?mode, "rolled group initiative");
        let outcome = self.finalize_group(group, FinalizeTrigger::Explicit).await?;
        Ok(Some(outcome))
    }

    /// Finalize every real group after the host rolled the whole encounter
    pub async fn after_roll_all_groups(&self) -> Result<Vec<(GroupId, FinalizeOutcome)>> {
        self.host().require_privilege()?;
        let view = self.groups().await?;

        let mut outcomes = Vec::new();
        for entry in view.groups().filter(|e| !e.is_empty()) {
            let outcome = self
                .finalize_group(&entry.id, FinalizeTrigger::Explicit)
                .await?;
            outcomes.push((entry.id.clone(), outcome));
        }
        debug!(groups = outcomes.len(), "roll-all completion handled");
        Ok(outcomes)
    }

    /// Clear every member's initiative and the cached group value
    pub async fn reset_group_initiative(&self, group: &GroupId) -> Result<()> {
        self.host().require_privilege()?;
        let record = self.require_record(group).await?;

        let updates: Vec<MemberUpdate> = self
            .group_members(group)
            .await?
            .into_iter()
            .map(|m| MemberUpdate::clear_initiative(m.id))
            .collect();

        self.suspend_finalize(group).await?;
        let written = self.write_reset(group, &updates).await;
        self.resume_finalize(group).await?;
        written?;

        self.host()
            .notifier
            .info(&format!(
                "Initiative cleared for group \"{}\".",
                record.display_name()
            ))
            .await;
        Ok(())
    }

    async fn write_reset(&self, group: &GroupId, updates: &[MemberUpdate]) -> Result<()> {
        if !updates.is_empty() {
            self.host().roster.bulk_update(updates).await?;
        }
        self.store().set_initiative(group, None).await
    }
}

#[async_trait]
impl RollCompletionHook for GroupManager {
    async fn after_roll_all(&self) -> Result<()> {
        self.after_roll_all_groups().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Settings;
    use crate::core::types::{Appearance, MemberId};
    use crate::host::{
        Host, Keep, MemberRoster, MemoryEncounter, RecordingNotifier, ScriptedDice,
        StaticPrivilege,
    };
    use std::sync::Arc;

    struct Fixture {
        encounter: Arc<MemoryEncounter>,
        dice: Arc<ScriptedDice>,
        notifier: Arc<RecordingNotifier>,
        manager: Arc<GroupManager>,
    }

    fn fixture(members: Vec<Member>, totals: Vec<f64>) -> Fixture {
        let encounter = Arc::new(MemoryEncounter::with_members(members));
        let dice = Arc::new(ScriptedDice::new(totals));
        let notifier = Arc::new(RecordingNotifier::new());
        let host = Host::in_memory(
            encounter.clone(),
            dice.clone(),
            notifier.clone(),
            Arc::new(StaticPrivilege::new(true)),
        );
        let manager = Arc::new(GroupManager::new(host, Arc::new(Settings::default())));
        encounter.subscribe(&manager);
        Fixture {
            encounter,
            dice,
            notifier,
            manager,
        }
    }

    async fn initiative(encounter: &MemoryEncounter, id: &str) -> Option<f64> {
        encounter
            .member(&MemberId::new(id))
            .await
            .unwrap()
            .and_then(|m| m.initiative)
    }

    #[tokio::test]
    async fn test_roll_group_finalizes_with_summary() {
        let f = fixture(
            vec![
                Member::new("a", "Alpha").with_tiebreak(2.0),
                Member::new("b", "Beta").with_tiebreak(1.0),
                Member::new("c", "Gamma").with_tiebreak(3.0),
            ],
            vec![18.0, 15.0, 15.0],
        );
        let ids = [MemberId::new("a"), MemberId::new("b"), MemberId::new("c")];
        let group = f
            .manager
            .create_group("Wolves", Appearance::default(), &ids)
            .await
            .unwrap();

        let outcome = f.manager.roll_group(&group, RollMode::Normal).await.unwrap();
        assert!(outcome.unwrap().is_finalized());

        assert_eq!(initiative(&f.encounter, "a").await, Some(16.03));
        assert_eq!(initiative(&f.encounter, "c").await, Some(16.02));
        assert_eq!(initiative(&f.encounter, "b").await, Some(16.01));
        let record = f.manager.store().record(&group).await.unwrap().unwrap();
        assert_eq!(record.initiative, Some(16.0));

        let summaries = f.notifier.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].lines[0], "Group initiative: 16");
        assert!(!f.manager.store().skip_finalize(&group).await.unwrap());
        assert_eq!(f.manager.gate().finalized_count(), 1);
    }

    #[tokio::test]
    async fn test_roll_group_skips_rolled_members() {
        let f = fixture(
            vec![Member::new("a", "A").with_initiative(12.0), Member::new("b", "B")],
            vec![8.0],
        );
        let ids = [MemberId::new("a"), MemberId::new("b")];
        let group = f
            .manager
            .create_group("Pair", Appearance::default(), &ids)
            .await
            .unwrap();

        f.manager.roll_group(&group, RollMode::Advantage).await.unwrap();
        let formulas = f.dice.formulas();
        assert_eq!(formulas.len(), 1);
        assert_eq!(formulas[0].keep, Keep::Highest);
        assert_eq!(f.manager.store().record(&group).await.unwrap().unwrap().initiative, Some(10.0));
    }

    #[tokio::test]
    async fn test_roll_group_with_nothing_to_roll() {
        let f = fixture(vec![Member::new("a", "A").with_initiative(12.0)], vec![]);
        let group = f
            .manager
            .create_group("Solo", Appearance::default(), &[MemberId::new("a")])
            .await
            .unwrap();

        let outcome = f.manager.roll_group(&group, RollMode::Normal).await.unwrap();
        assert!(outcome.is_none());
        assert!(f
            .notifier
            .infos()
            .contains(&"Group \"Solo\" already has initiative.".to_string()));
        assert_eq!(f.encounter.bulk_update_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_roll_writes_nothing() {
        let f = fixture(vec![Member::new("a", "A"), Member::new("b", "B")], vec![11.0]);
        let ids = [MemberId::new("a"), MemberId::new("b")];
        let group = f
            .manager
            .create_group("Pair", Appearance::default(), &ids)
            .await
            .unwrap();

        let result = f.manager.roll_group(&group, RollMode::Normal).await;
        assert!(matches!(result, Err(GroupError::Roll(_))));
        assert_eq!(initiative(&f.encounter, "a").await, None);
        assert_eq!(f.encounter.bulk_update_count(), 0);
        assert!(!f.manager.store().skip_finalize(&group).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_clears_members_and_cache() {
        let f = fixture(vec![Member::new("a", "A"), Member::new("b", "B")], vec![9.0, 6.0]);
        let ids = [MemberId::new("a"), MemberId::new("b")];
        let group = f
            .manager
            .create_group("Pair", Appearance::default(), &ids)
            .await
            .unwrap();
        f.manager.roll_group(&group, RollMode::Normal).await.unwrap();

        f.manager.reset_group_initiative(&group).await.unwrap();
        assert_eq!(initiative(&f.encounter, "a").await, None);
        assert_eq!(initiative(&f.encounter, "b").await, None);
        assert_eq!(f.manager.store().record(&group).await.unwrap().unwrap().initiative, None);
        assert!(f
            .notifier
            .infos()
            .contains(&"Initiative cleared for group \"Pair\".".to_string()));
    }

    #[tokio::test]
    async fn test_roll_all_hook_finalizes_groups() {
        let f = fixture(
            vec![Member::new("a", "A"), Member::new("b", "B"), Member::new("loner", "L")],
            vec![14.0, 9.0, 3.0],
        );
        let ids = [MemberId::new("a"), MemberId::new("b")];
        let group = f
            .manager
            .create_group("Pair", Appearance::default(), &ids)
            .await
            .unwrap();
        assert!(f.manager.wrap_roll_completion(f.encounter.as_ref()));

        f.encounter.roll_all(f.dice.as_ref()).await.unwrap();

        let record = f.manager.store().record(&group).await.unwrap().unwrap();
        assert_eq!(record.initiative, Some(12.0));
        assert_eq!(initiative(&f.encounter, "a").await, Some(12.02));
        assert_eq!(initiative(&f.encounter, "b").await, Some(12.01));
        assert_eq!(initiative(&f.encounter, "loner").await, Some(3.0));
        assert_eq!(f.notifier.summaries().len(), 1);
    }
}
