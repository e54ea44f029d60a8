//! Group lifecycle integration tests

use squad_initiative::core::config::Settings;
use squad_initiative::core::error::GroupError;
use squad_initiative::core::types::{Appearance, GroupId, Member, MemberId};
use squad_initiative::group::{FinalizeTrigger, GroupManager};
use squad_initiative::host::{
    Host, MemberRoster, MemoryEncounter, RecordingNotifier, SeededDice, StaticPrivilege,
};
use std::sync::Arc;

struct Encounter {
    encounter: Arc<MemoryEncounter>,
    privilege: Arc<StaticPrivilege>,
    notifier: Arc<RecordingNotifier>,
    manager: Arc<GroupManager>,
}

fn encounter(members: Vec<Member>) -> Encounter {
    encounter_with(members, Settings::default())
}

fn encounter_with(members: Vec<Member>, settings: Settings) -> Encounter {
    let encounter = Arc::new(MemoryEncounter::with_members(members));
    let privilege = Arc::new(StaticPrivilege::new(true));
    let notifier = Arc::new(RecordingNotifier::new());
    let host = Host::in_memory(
        encounter.clone(),
        Arc::new(SeededDice::new(42)),
        notifier.clone(),
        privilege.clone(),
    );
    let manager = Arc::new(GroupManager::new(host, Arc::new(settings)));
    encounter.subscribe(&manager);
    Encounter {
        encounter,
        privilege,
        notifier,
        manager,
    }
}

fn ids(raw: &[&str]) -> Vec<MemberId> {
    raw.iter().map(|id| MemberId::new(*id)).collect()
}

async fn initiatives(encounter: &MemoryEncounter, raw: &[&str]) -> Vec<Option<f64>> {
    let mut values = Vec::new();
    for id in raw {
        let member = encounter.member(&MemberId::new(*id)).await.unwrap();
        values.push(member.and_then(|m| m.initiative));
    }
    values
}

fn trio() -> Vec<Member> {
    vec![
        Member::new("a", "A").with_initiative(18.0).with_tiebreak(2.0),
        Member::new("b", "B").with_initiative(15.0).with_tiebreak(1.0),
        Member::new("c", "C").with_initiative(15.0).with_tiebreak(3.0),
        Member::new("d", "D").with_initiative(4.0).with_tiebreak(9.0),
    ]
}

async fn finalized_trio(e: &Encounter) -> GroupId {
    let group = e
        .manager
        .create_group("Wolves", Appearance::default(), &ids(&["a", "b", "c"]))
        .await
        .unwrap();
    let outcome = e
        .manager
        .finalize_group(&group, FinalizeTrigger::Passive)
        .await
        .unwrap();
    assert!(outcome.is_finalized());
    group
}

#[tokio::test]
async fn test_finalize_spreads_shared_initiative() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;

    assert_eq!(
        initiatives(&e.encounter, &["a", "c", "b"]).await,
        vec![Some(16.03), Some(16.02), Some(16.01)]
    );
    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.initiative, Some(16.0));
    // passive path is silent
    assert!(e.notifier.summaries().is_empty());
}

#[tokio::test]
async fn test_finalize_twice_is_stable() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;
    let before = initiatives(&e.encounter, &["a", "b", "c"]).await;

    e.manager
        .finalize_group(&group, FinalizeTrigger::Passive)
        .await
        .unwrap();
    assert_eq!(initiatives(&e.encounter, &["a", "b", "c"]).await, before);
    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.initiative, Some(16.0));
    assert_eq!(e.manager.gate().finalized_count(), 1);
}

#[tokio::test]
async fn test_assign_into_finalized_group_slots_at_bottom() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;

    e.manager
        .assign_member(&MemberId::new("d"), &group)
        .await
        .unwrap();

    assert_eq!(
        initiatives(&e.encounter, &["a", "c", "b", "d"]).await,
        vec![Some(16.04), Some(16.03), Some(16.02), Some(16.01)]
    );
    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.initiative, Some(16.0));
    assert!(!e.manager.store().skip_finalize(&group).await.unwrap());
    assert_eq!(e.manager.gate().finalized_count(), 1);
}

#[tokio::test]
async fn test_assign_unassign_round_trip() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;
    let before = initiatives(&e.encounter, &["a", "b", "c"]).await;

    e.manager
        .assign_member(&MemberId::new("d"), &group)
        .await
        .unwrap();
    let left = e.manager.unassign_member(&MemberId::new("d")).await.unwrap();
    assert_eq!(left, Some(group.clone()));

    assert_eq!(initiatives(&e.encounter, &["a", "b", "c"]).await, before);
    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.initiative, Some(16.0));
}

#[tokio::test]
async fn test_unassign_last_member_clears_initiative() {
    let e = encounter(vec![Member::new("solo", "Solo").with_initiative(14.0)]);
    let group = e
        .manager
        .create_group("Solo", Appearance::default(), &ids(&["solo"]))
        .await
        .unwrap();
    e.manager
        .finalize_group(&group, FinalizeTrigger::Passive)
        .await
        .unwrap();
    assert_eq!(initiatives(&e.encounter, &["solo"]).await, vec![Some(14.01)]);

    e.manager.unassign_member(&MemberId::new("solo")).await.unwrap();

    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.initiative, None);
    // the record outlives its last member
    let view = e.manager.groups().await.unwrap();
    assert!(view.get(&group).unwrap().is_empty());
}

#[tokio::test]
async fn test_move_between_groups_clears_emptied_group() {
    let e = encounter(vec![
        Member::new("x", "X").with_initiative(10.0),
        Member::new("y", "Y").with_initiative(7.0),
    ]);
    let first = e
        .manager
        .create_group("First", Appearance::default(), &ids(&["x"]))
        .await
        .unwrap();
    let second = e
        .manager
        .create_group("Second", Appearance::default(), &ids(&["y"]))
        .await
        .unwrap();
    e.manager
        .finalize_group(&first, FinalizeTrigger::Passive)
        .await
        .unwrap();

    e.manager
        .assign_member(&MemberId::new("x"), &second)
        .await
        .unwrap();

    let first_record = e.manager.store().record(&first).await.unwrap().unwrap();
    assert_eq!(first_record.initiative, None);
    let x = e.encounter.member(&MemberId::new("x")).await.unwrap().unwrap();
    assert_eq!(x.group, Some(second));
}

#[tokio::test]
async fn test_delete_returns_members_to_ungrouped() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;

    let former = e.manager.delete_group(&group).await.unwrap();
    assert_eq!(former.len(), 3);

    let view = e.manager.groups().await.unwrap();
    assert!(!view.contains(&group));
    let ungrouped = view.ungrouped().unwrap();
    assert_eq!(ungrouped.members.len(), 4);
    assert!(!e.manager.expanded().is_expanded(&group));
}

#[tokio::test]
async fn test_manual_initiative_shifts_and_suspends_listener() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;

    e.manager
        .set_group_initiative_manually(&group, 20.0)
        .await
        .unwrap();

    assert_eq!(
        initiatives(&e.encounter, &["a", "c", "b"]).await,
        vec![Some(20.03), Some(20.02), Some(20.01)]
    );
    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.initiative, Some(20.0));
    assert!(!e.manager.store().skip_finalize(&group).await.unwrap());
    assert_eq!(e.manager.gate().finalized_count(), 1);
}

#[tokio::test]
async fn test_manual_initiative_without_cached_value_uses_mean() {
    let e = encounter(vec![
        Member::new("p", "P").with_initiative(12.0),
        Member::new("q", "Q").with_initiative(8.0),
        Member::new("r", "R"),
    ]);
    let group = e
        .manager
        .create_group("Mixed", Appearance::default(), &ids(&["p", "q", "r"]))
        .await
        .unwrap();

    e.manager
        .set_group_initiative_from_input(&group, " 15 ")
        .await
        .unwrap();

    assert_eq!(
        initiatives(&e.encounter, &["p", "q", "r"]).await,
        vec![Some(17.0), Some(13.0), None]
    );
}

#[tokio::test]
async fn test_fractional_manual_base_survives_roll_all() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;
    assert!(e.manager.wrap_roll_completion(e.encounter.as_ref()));

    e.manager
        .set_group_initiative_from_input(&group, "12.345")
        .await
        .unwrap();
    let placed = vec![Some(12.38), Some(12.37), Some(12.36)];
    assert_eq!(initiatives(&e.encounter, &["a", "c", "b"]).await, placed);

    e.encounter
        .roll_all(&SeededDice::new(7))
        .await
        .unwrap();

    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.initiative, Some(12.35));
    assert_eq!(initiatives(&e.encounter, &["a", "c", "b"]).await, placed);
    assert_eq!(e.manager.gate().finalized_count(), 1);
    assert_eq!(e.notifier.summaries().len(), 1);
}

#[tokio::test]
async fn test_unprivileged_operations_change_nothing() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;
    let before = initiatives(&e.encounter, &["a", "b", "c", "d"]).await;
    let updates = e.encounter.bulk_update_count();
    e.privilege.set(false);

    let d = MemberId::new("d");
    assert!(matches!(
        e.manager.assign_member(&d, &group).await,
        Err(GroupError::PermissionDenied)
    ));
    assert!(matches!(
        e.manager.unassign_member(&MemberId::new("a")).await,
        Err(GroupError::PermissionDenied)
    ));
    assert!(matches!(
        e.manager.rename_group(&group, "Cats").await,
        Err(GroupError::PermissionDenied)
    ));
    assert!(matches!(
        e.manager.set_group_initiative_manually(&group, 3.0).await,
        Err(GroupError::PermissionDenied)
    ));
    assert!(matches!(
        e.manager.delete_group(&group).await,
        Err(GroupError::PermissionDenied)
    ));
    assert!(matches!(
        e.manager.finalize_group(&group, FinalizeTrigger::Explicit).await,
        Err(GroupError::PermissionDenied)
    ));

    assert_eq!(initiatives(&e.encounter, &["a", "b", "c", "d"]).await, before);
    assert_eq!(e.encounter.bulk_update_count(), updates);
    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.display_name(), "Wolves");
    let view = e.manager.groups().await.unwrap();
    assert_eq!(view.get(&group).unwrap().members.len(), 3);
}

#[tokio::test]
async fn test_inline_edit_triggers_passive_finalize() {
    let e = encounter(vec![
        Member::new("a", "A").with_initiative(11.0),
        Member::new("b", "B"),
    ]);
    let group = e
        .manager
        .create_group("Pair", Appearance::default(), &ids(&["a", "b"]))
        .await
        .unwrap();

    e.encounter
        .set_initiative(&MemberId::new("b"), Some(6.0))
        .await
        .unwrap();

    let record = e.manager.store().record(&group).await.unwrap().unwrap();
    assert_eq!(record.initiative, Some(9.0));
    assert_eq!(
        initiatives(&e.encounter, &["a", "b"]).await,
        vec![Some(9.02), Some(9.01)]
    );
    assert!(e.notifier.summaries().is_empty());
}

#[tokio::test]
async fn test_turn_change_collapses_inactive_groups() {
    let e = encounter(vec![
        Member::new("a", "A").with_initiative(20.0),
        Member::new("b", "B").with_initiative(10.0),
        Member::new("c", "C").with_initiative(5.0),
    ]);
    let front = e
        .manager
        .create_group("Front", Appearance::default(), &ids(&["a"]))
        .await
        .unwrap();
    let back = e
        .manager
        .create_group("Back", Appearance::default(), &ids(&["b"]))
        .await
        .unwrap();
    let pinned = e
        .manager
        .create_group("Pinned", Appearance::default(), &ids(&["c"]))
        .await
        .unwrap();
    e.manager.toggle_pin(&pinned).await.unwrap();

    // turn 0 -> 1 makes b active
    e.encounter.advance_turn().await.unwrap();

    assert!(!e.manager.expanded().is_expanded(&front));
    assert!(e.manager.expanded().is_expanded(&back));
    assert!(e.manager.expanded().is_expanded(&pinned));
}

#[tokio::test]
async fn test_manual_override_survives_turn_change() {
    let e = encounter(vec![
        Member::new("a", "A").with_initiative(20.0),
        Member::new("b", "B").with_initiative(10.0),
    ]);
    let kept_open = e
        .manager
        .create_group("Open", Appearance::default(), &ids(&["a"]))
        .await
        .unwrap();
    e.manager.create_group("Other", Appearance::default(), &ids(&["b"])).await.unwrap();
    e.manager
        .set_collapse_override(&kept_open, true)
        .await
        .unwrap();

    e.encounter.advance_turn().await.unwrap();
    assert!(e.manager.expanded().is_expanded(&kept_open));
}

#[tokio::test]
async fn test_auto_collapse_disabled() {
    let mut settings = Settings::default();
    settings.tracker.auto_collapse_groups = false;
    let e = encounter_with(
        vec![
            Member::new("a", "A").with_initiative(20.0),
            Member::new("b", "B").with_initiative(10.0),
        ],
        settings,
    );
    let group = e
        .manager
        .create_group("Front", Appearance::default(), &ids(&["a"]))
        .await
        .unwrap();

    e.encounter.advance_turn().await.unwrap();
    assert!(e.manager.expanded().is_expanded(&group));
}

#[tokio::test]
async fn test_headers_reflect_state() {
    let e = encounter(trio());
    let group = finalized_trio(&e).await;

    let headers = e.manager.headers().await.unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].id, group);
    assert_eq!(headers[0].initiative, Some(16.0));
    assert_eq!(headers[0].member_count, 3);
    assert!(headers[0].expanded);

    e.privilege.set(false);
    let headers = e.manager.headers().await.unwrap();
    assert!(headers[0].controls.is_empty());
}
