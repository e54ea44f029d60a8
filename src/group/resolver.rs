//! Membership view: which members belong to which group
//!
//! Pure and cheap; rebuilt on every render and every lifecycle operation.

use crate::core::types::{GroupId, GroupRecord, Member, UNNAMED_GROUP};
use ahash::AHashMap;
use std::collections::BTreeMap;

/// Stored group metadata keyed by id
pub type GroupRecords = BTreeMap<GroupId, GroupRecord>;

/// One bucket of the view
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<Member>,
}

impl GroupEntry {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Ready to finalize: at least one member and every initiative finite
    pub fn is_ready(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(Member::has_finite_initiative)
    }
}

/// Derived group membership, never persisted
#[derive(Debug, Clone, Default)]
pub struct GroupView {
    entries: Vec<GroupEntry>,
    index: AHashMap<GroupId, usize>,
}

impl GroupView {
    pub fn get(&self, id: &GroupId) -> Option<&GroupEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &GroupId) -> bool {
        self.index.contains_key(id)
    }

    /// Every entry, the ungrouped bucket included
    pub fn iter(&self) -> impl Iterator<Item = &GroupEntry> {
        self.entries.iter()
    }

    /// Real groups only
    pub fn groups(&self) -> impl Iterator<Item = &GroupEntry> {
        self.entries.iter().filter(|e| !e.id.is_ungrouped())
    }

    pub fn ungrouped(&self) -> Option<&GroupEntry> {
        self.get(&GroupId::ungrouped())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: GroupEntry) -> usize {
        let idx = self.entries.len();
        self.index.insert(entry.id.clone(), idx);
        self.entries.push(entry);
        idx
    }
}

fn stored_name(stored: &GroupRecords, id: &GroupId) -> String {
    stored
        .get(id)
        .and_then(|r| r.name.clone())
        .unwrap_or_else(|| UNNAMED_GROUP.to_string())
}

/// Bucket members by group tag and add empty stored groups
pub fn resolve(members: &[Member], stored: &GroupRecords) -> GroupView {
    let mut view = GroupView::default();

    for member in members {
        let id = member.group_or_ungrouped();
        let idx = match view.index.get(&id) {
            Some(&idx) => idx,
            None => {
                let name = stored_name(stored, &id);
                view.push(GroupEntry {
                    id,
                    name,
                    members: Vec::new(),
                })
            }
        };
        view.entries[idx].members.push(member.clone());
    }

    for id in stored.keys() {
        if id.is_ungrouped() || view.contains(id) {
            continue;
        }
        view.push(GroupEntry {
            id: id.clone(),
            name: stored_name(stored, id),
            members: Vec::new(),
        });
    }

    tracing::debug!(groups = view.len(), "resolved group view");
    view
}
