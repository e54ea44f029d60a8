//! Group header view model

use crate::core::config::GroupDefaults;
use crate::core::error::Result;
use crate::core::types::GroupId;
use crate::group::resolver::{GroupEntry, GroupRecords, GroupView};
use crate::group::GroupManager;
use crate::tracker::expand::ExpandStore;
use serde::Serialize;
use std::fmt;

/// A control shown on a group header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderControl {
    Pin,
    Reset,
    Roll,
    Delete,
    Rename,
    SetInitiative,
}

impl HeaderControl {
    /// Header buttons followed by context-menu entries
    pub const ALL: [HeaderControl; 6] = [
        HeaderControl::Pin,
        HeaderControl::Reset,
        HeaderControl::Roll,
        HeaderControl::Delete,
        HeaderControl::Rename,
        HeaderControl::SetInitiative,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            HeaderControl::Pin => "Pin Group",
            HeaderControl::Reset => "Reset Initiative",
            HeaderControl::Roll => "Roll Initiative",
            HeaderControl::Delete => "Delete Group",
            HeaderControl::Rename => "Rename Group",
            HeaderControl::SetInitiative => "Set Group Initiative",
        }
    }
}

/// Everything needed to draw one group header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupHeader {
    pub id: GroupId,
    pub name: String,
    pub img: String,
    pub color: String,
    pub member_count: usize,
    /// Shown only once every member has a finite initiative
    pub initiative: Option<f64>,
    pub pinned: bool,
    pub expanded: bool,
    /// Empty for viewers without privilege
    pub controls: Vec<HeaderControl>,
}

impl fmt::Display for GroupHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.expanded { "v" } else { ">" };
        write!(f, "{} {} ({} members)", marker, self.name, self.member_count)?;
        if let Some(initiative) = self.initiative {
            write!(f, " [{}]", initiative)?;
        }
        if self.pinned {
            f.write_str(" pinned")?;
        }
        Ok(())
    }
}

/// Displayed group initiative: the cached value, else the rounded mean
fn display_initiative(entry: &GroupEntry, cached: Option<f64>) -> Option<f64> {
    if !entry.is_ready() {
        return None;
    }
    cached.or_else(|| {
        let sum: f64 = entry.members.iter().filter_map(|m| m.initiative).sum();
        Some((sum / entry.members.len() as f64).round())
    })
}

/// Build headers for every real group in the view
pub fn build_headers(
    view: &GroupView,
    records: &GroupRecords,
    expanded: &ExpandStore,
    defaults: &GroupDefaults,
    privileged: bool,
) -> Vec<GroupHeader> {
    view.groups()
        .map(|entry| {
            let record = records.get(&entry.id);
            let cached = record.and_then(|r| r.finite_initiative());
            GroupHeader {
                id: entry.id.clone(),
                name: entry.name.clone(),
                img: record
                    .and_then(|r| r.img.clone())
                    .unwrap_or_else(|| defaults.img.clone()),
                color: record
                    .and_then(|r| r.color.clone())
                    .unwrap_or_else(|| defaults.color.clone()),
                member_count: entry.members.len(),
                initiative: display_initiative(entry, cached),
                pinned: record.is_some_and(|r| r.pinned),
                expanded: expanded.is_expanded(&entry.id),
                controls: if privileged {
                    HeaderControl::ALL.to_vec()
                } else {
                    Vec::new()
                },
            }
        })
        .collect()
}

impl GroupManager {
    /// Headers for the current encounter state
    pub async fn headers(&self) -> Result<Vec<GroupHeader>> {
        let members = self.host().roster.members().await?;
        let records = self.store().records().await?;
        let view = crate::group::resolve(&members, &records);
        Ok(build_headers(
            &view,
            &records,
            self.expanded(),
            &self.settings().groups,
            self.host().is_privileged(),
        ))
    }
}
