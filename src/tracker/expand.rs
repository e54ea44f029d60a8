//! Per-client expand/collapse state of group headers

use crate::core::error::Result;
use crate::core::types::{GroupId, MemberId};
use crate::group::GroupManager;
use ahash::AHashSet;
use std::sync::Mutex;
use tracing::debug;

/// Set of expanded group ids for one encounter
///
/// Local to the viewing client; never written to the shared store. Saved
/// and restored as a JSON array of ids.
#[derive(Debug, Default)]
pub struct ExpandStore {
    expanded: Mutex<AHashSet<GroupId>>,
}

impl ExpandStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self, id: &GroupId) -> bool {
        self.expanded
            .lock()
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }

    pub fn set(&self, id: &GroupId, expanded: bool) {
        if let Ok(mut set) = self.expanded.lock() {
            if expanded {
                set.insert(id.clone());
            } else {
                set.remove(id);
            }
        }
    }

    pub fn expand(&self, id: &GroupId) {
        self.set(id, true);
    }

    pub fn collapse(&self, id: &GroupId) {
        self.set(id, false);
    }

    /// Flip one header; returns the new state
    pub fn toggle(&self, id: &GroupId) -> bool {
        let expanded = !self.is_expanded(id);
        self.set(id, expanded);
        expanded
    }

    /// Expanded ids, sorted
    pub fn snapshot(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self
            .expanded
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Restore from saved state; unreadable input yields an empty store
    pub fn from_json(raw: &str) -> Self {
        let ids: Vec<GroupId> = serde_json::from_str(raw).unwrap_or_else(|e| {
            debug!(error = %e, "discarding unreadable expand state");
            Vec::new()
        });
        Self {
            expanded: Mutex::new(ids.into_iter().collect()),
        }
    }
}

impl GroupManager {
    /// Header click: flip a group's expanded state for this client
    pub fn toggle_expanded(&self, group: &GroupId) -> bool {
        self.expanded().toggle(group)
    }

    /// Exempt a group from auto-collapse, or return it to automatic handling
    pub async fn set_collapse_override(&self, group: &GroupId, manual: bool) -> Result<()> {
        self.host().require_privilege()?;
        self.store().set_manual_override(group, manual).await
    }

    /// Auto-collapse on turn change
    ///
    /// Each stored group without a manual override is expanded iff it is
    /// pinned or holds the active member.
    pub async fn on_turn_changed(&self, active_member: Option<&MemberId>) -> Result<()> {
        if !self.settings().tracker.auto_collapse_groups {
            return Ok(());
        }

        let active_group = match active_member {
            Some(member) => self.host().tags.member_group(member).await?,
            None => None,
        };

        for (id, record) in self.store().records().await? {
            if self.store().has_manual_override(&id).await? {
                continue;
            }
            let expand = record.pinned || active_group.as_ref() == Some(&id);
            self.expanded().set(&id, expand);
        }
        debug!(
            active = ?active_group,
            expanded = ?self.expanded().snapshot(),
            "auto-collapsed groups"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_flips_state() {
        let store = ExpandStore::new();
        let id = GroupId::new("gr-1");
        assert!(!store.is_expanded(&id));
        assert!(store.toggle(&id));
        assert!(store.is_expanded(&id));
        assert!(!store.toggle(&id));
    }

    #[test]
    fn test_json_restore() {
        let store = ExpandStore::new();
        store.expand(&GroupId::new("gr-b"));
        store.expand(&GroupId::new("gr-a"));
        let saved = store.to_json().unwrap();
        assert_eq!(saved, r#"["gr-a","gr-b"]"#);

        let restored = ExpandStore::from_json(&saved);
        assert!(restored.is_expanded(&GroupId::new("gr-a")));
        assert!(ExpandStore::from_json("not json").snapshot().is_empty());
    }
}
