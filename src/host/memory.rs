//! In-process host: an encounter held in memory
//!
//! Every write yields to the scheduler first, so concurrent tasks on a
//! single-threaded runtime interleave at the same points they would
//! against a real persistence layer.

use crate::core::error::{GroupError, Result};
use crate::core::types::{GroupId, Member, MemberId, MemberUpdate};
use crate::group::events::GroupEvent;
use crate::host::{
    EncounterListener, FlagKey, MemberRoster, Notifier, PrivilegeCheck, Prompter,
    RollCompletionHook, RollFormula, RollHookRegistry, RollMode, RollService, Summary, TagStore,
};
use async_trait::async_trait;
use ordered_float::OrderedFloat;
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

struct EncounterState {
    members: Vec<Member>,
    flags: Value,
    turn: usize,
}

/// An encounter document with its members and flags
pub struct MemoryEncounter {
    state: Mutex<EncounterState>,
    listener: Mutex<Option<Weak<dyn EncounterListener>>>,
    hooks: Mutex<Vec<Arc<dyn RollCompletionHook>>>,
    bulk_updates: AtomicUsize,
}

impl MemoryEncounter {
    pub fn new() -> Self {
        Self::with_members(Vec::new())
    }

    pub fn with_members(members: Vec<Member>) -> Self {
        Self {
            state: Mutex::new(EncounterState {
                members,
                flags: Value::Object(Map::new()),
                turn: 0,
            }),
            listener: Mutex::new(None),
            hooks: Mutex::new(Vec::new()),
            bulk_updates: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, EncounterState>> {
        self.state
            .lock()
            .map_err(|_| GroupError::Store("encounter state poisoned".into()))
    }

    /// Route change events to a listener (held weakly)
    pub fn subscribe<L: EncounterListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn EncounterListener> = weak;
        if let Ok(mut slot) = self.listener.lock() {
            *slot = Some(weak);
        }
    }

    async fn emit(&self, event: GroupEvent) {
        let listener = self
            .listener
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade));
        if let Some(listener) = listener {
            listener.on_event(event).await;
        }
    }

    /// Add a member and announce it
    pub async fn add_member(&self, member: Member) -> Result<()> {
        tokio::task::yield_now().await;
        let id = member.id.clone();
        {
            let mut state = self.lock()?;
            if state.members.iter().any(|m| m.id == id) {
                return Err(GroupError::Store(format!("duplicate member {}", id)));
            }
            state.members.push(member);
        }
        self.emit(GroupEvent::MemberCreated { member: id }).await;
        Ok(())
    }

    /// Set one member's initiative, as an inline edit would
    pub async fn set_initiative(&self, id: &MemberId, value: Option<f64>) -> Result<()> {
        let update = match value {
            Some(v) => MemberUpdate::initiative(id.clone(), v),
            None => MemberUpdate::clear_initiative(id.clone()),
        };
        self.bulk_update(&[update]).await
    }

    /// Number of batch updates applied so far
    pub fn bulk_update_count(&self) -> usize {
        self.bulk_updates.load(Ordering::SeqCst)
    }

    /// Members in turn order: initiative descending, unrolled last, then sort key
    pub fn turn_order(&self) -> Result<Vec<Member>> {
        let mut members = self.lock()?.members.clone();
        members.sort_by_key(|m| {
            (
                Reverse(m.initiative.map(OrderedFloat)),
                m.sort.unwrap_or(0),
            )
        });
        Ok(members)
    }

    pub fn active_member(&self) -> Result<Option<Member>> {
        let turn = self.lock()?.turn;
        Ok(self.turn_order()?.into_iter().nth(turn))
    }

    /// Move to the next turn, wrapping at the end of the round
    pub async fn advance_turn(&self) -> Result<Option<MemberId>> {
        let count = self.lock()?.members.len();
        if count == 0 {
            return Ok(None);
        }
        {
            let mut state = self.lock()?;
            state.turn = (state.turn + 1) % count;
        }
        let active = self.active_member()?.map(|m| m.id);
        self.emit(GroupEvent::TurnChanged {
            active_member: active.clone(),
        })
        .await;
        Ok(active)
    }

    /// Roll every member without initiative, then run roll-completion hooks
    pub async fn roll_all(&self, dice: &dyn RollService) -> Result<()> {
        let pending: Vec<Member> = self
            .lock()?
            .members
            .iter()
            .filter(|m| m.initiative.is_none())
            .cloned()
            .collect();

        let mut updates = Vec::with_capacity(pending.len());
        for member in &pending {
            let total = dice
                .roll(&RollMode::Normal.formula(member.initiative_modifier))
                .await?;
            updates.push(MemberUpdate::initiative(member.id.clone(), total));
        }
        if !updates.is_empty() {
            self.bulk_update(&updates).await?;
        }

        let hooks: Vec<Arc<dyn RollCompletionHook>> = self
            .hooks
            .lock()
            .map_err(|_| GroupError::Store("hook registry poisoned".into()))?
            .clone();
        for hook in hooks {
            hook.after_roll_all().await?;
        }
        Ok(())
    }

    fn flag_at<'a>(root: &'a Value, key: &FlagKey) -> Option<&'a Value> {
        key.segments()
            .into_iter()
            .try_fold(root, |node, segment| node.get(segment))
    }
}

impl Default for MemoryEncounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagStore for MemoryEncounter {
    async fn get_flag(&self, key: &FlagKey) -> Result<Option<Value>> {
        let state = self.lock()?;
        Ok(Self::flag_at(&state.flags, key).cloned())
    }

    async fn set_flag(&self, key: &FlagKey, value: Value) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.lock()?;
        let segments = key.segments();
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(GroupError::Store("empty flag path".into()));
        };

        let mut node = &mut state.flags;
        for segment in parents {
            let object = node
                .as_object_mut()
                .ok_or_else(|| GroupError::Store(format!("{} is not an object", key)))?;
            node = object
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
        }
        node.as_object_mut()
            .ok_or_else(|| GroupError::Store(format!("{} is not an object", key)))?
            .insert(leaf.to_string(), value);
        Ok(())
    }

    async fn unset_flag(&self, key: &FlagKey) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.lock()?;
        let segments = key.segments();
        let Some((leaf, parents)) = segments.split_last() else {
            return Ok(());
        };

        let mut node = &mut state.flags;
        for segment in parents {
            match node.get_mut(*segment) {
                Some(next) => node = next,
                None => return Ok(()),
            }
        }
        if let Some(object) = node.as_object_mut() {
            object.remove(*leaf);
        }
        Ok(())
    }

    async fn member_group(&self, member: &MemberId) -> Result<Option<GroupId>> {
        let state = self.lock()?;
        Ok(state
            .members
            .iter()
            .find(|m| &m.id == member)
            .and_then(|m| m.group.clone()))
    }

    async fn set_member_group(&self, member: &MemberId, group: &GroupId) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.lock()?;
        let target = state
            .members
            .iter_mut()
            .find(|m| &m.id == member)
            .ok_or_else(|| GroupError::Store(format!("unknown member {}", member)))?;
        target.group = Some(group.clone());
        Ok(())
    }

    async fn unset_member_group(&self, member: &MemberId) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.lock()?;
        if let Some(target) = state.members.iter_mut().find(|m| &m.id == member) {
            target.group = None;
        }
        Ok(())
    }
}

#[async_trait]
impl MemberRoster for MemoryEncounter {
    async fn members(&self) -> Result<Vec<Member>> {
        Ok(self.lock()?.members.clone())
    }

    async fn bulk_update(&self, updates: &[MemberUpdate]) -> Result<()> {
        tokio::task::yield_now().await;
        let events = {
            let mut state = self.lock()?;
            if let Some(missing) = updates
                .iter()
                .find(|u| !state.members.iter().any(|m| m.id == u.id))
            {
                return Err(GroupError::Store(format!("unknown member {}", missing.id)));
            }

            let mut events = Vec::new();
            for update in updates {
                if let Some(member) = state.members.iter_mut().find(|m| m.id == update.id) {
                    update.apply_to(member);
                    if update.initiative.is_some() {
                        events.push(GroupEvent::InitiativeChanged {
                            member: member.id.clone(),
                            group: member.group.clone(),
                            value: member.initiative,
                        });
                    }
                }
            }
            events
        };
        self.bulk_updates.fetch_add(1, Ordering::SeqCst);

        for event in events {
            self.emit(event).await;
        }
        Ok(())
    }
}

impl RollHookRegistry for MemoryEncounter {
    fn register_roll_completion(&self, hook: Arc<dyn RollCompletionHook>) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.push(hook);
        }
    }
}

/// A message captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Warn(String),
    Broadcast(Summary),
}

/// Notifier that keeps every message for later inspection
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Info(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Warn(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<Summary> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Broadcast(summary) => Some(summary),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn info(&self, message: &str) {
        self.push(Notice::Info(message.to_string()));
    }

    async fn warn(&self, message: &str) {
        self.push(Notice::Warn(message.to_string()));
    }

    async fn broadcast(&self, summary: Summary) -> Result<()> {
        self.push(Notice::Broadcast(summary));
        Ok(())
    }
}

/// Privilege check with a switchable answer
pub struct StaticPrivilege(AtomicBool);

impl StaticPrivilege {
    pub fn new(privileged: bool) -> Self {
        Self(AtomicBool::new(privileged))
    }

    pub fn set(&self, privileged: bool) {
        self.0.store(privileged, Ordering::SeqCst);
    }
}

impl PrivilegeCheck for StaticPrivilege {
    fn is_privileged(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Dice that return queued totals in order and fail once the queue is empty
#[derive(Default)]
pub struct ScriptedDice {
    totals: Mutex<VecDeque<f64>>,
    formulas: Mutex<Vec<RollFormula>>,
}

impl ScriptedDice {
    pub fn new(totals: impl IntoIterator<Item = f64>) -> Self {
        Self {
            totals: Mutex::new(totals.into_iter().collect()),
            formulas: Mutex::new(Vec::new()),
        }
    }

    /// Formulas requested so far
    pub fn formulas(&self) -> Vec<RollFormula> {
        self.formulas.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RollService for ScriptedDice {
    async fn roll(&self, formula: &RollFormula) -> Result<f64> {
        tokio::task::yield_now().await;
        if let Ok(mut formulas) = self.formulas.lock() {
            formulas.push(formula.clone());
        }
        self.totals
            .lock()
            .map_err(|_| GroupError::Roll("dice state poisoned".into()))?
            .pop_front()
            .ok_or_else(|| GroupError::Roll(format!("no result scripted for {}", formula)))
    }
}

/// Dialog answers queued in advance
///
/// Confirms and prompts draw from separate queues; an empty queue answers
/// as a dismissed dialog.
#[derive(Default)]
pub struct ScriptedPrompter {
    confirms: Mutex<VecDeque<bool>>,
    answers: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirming(self, answer: bool) -> Self {
        if let Ok(mut confirms) = self.confirms.lock() {
            confirms.push_back(answer);
        }
        self
    }

    pub fn answering(self, answer: Option<&str>) -> Self {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push_back(answer.map(str::to_string));
        }
        self
    }

    /// Titles of every dialog shown so far
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&self, title: &str) {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(title.to_string());
        }
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, title: &str, _body: &str) -> bool {
        tokio::task::yield_now().await;
        self.record(title);
        self.confirms
            .lock()
            .ok()
            .and_then(|mut c| c.pop_front())
            .unwrap_or(false)
    }

    async fn prompt(&self, title: &str, _initial: &str) -> Option<String> {
        tokio::task::yield_now().await;
        self.record(title);
        self.answers.lock().ok().and_then(|mut a| a.pop_front()).flatten()
    }
}
