//! Typed key paths for encounter-level flags
//!
//! The host stores group state as nested key/value flags on the encounter
//! document. Paths are dotted (`groups.<id>.initiative`), and every key the
//! engine touches is one of the variants below.

use crate::core::types::GroupId;
use std::fmt;

/// Field of a stored group record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupField {
    Name,
    Initiative,
    Pinned,
    Expanded,
    Img,
    Color,
}

impl GroupField {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupField::Name => "name",
            GroupField::Initiative => "initiative",
            GroupField::Pinned => "pinned",
            GroupField::Expanded => "expanded",
            GroupField::Img => "img",
            GroupField::Color => "color",
        }
    }
}

/// A key path on the encounter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlagKey {
    /// The whole `groups` map
    Groups,
    /// One group record
    Group(GroupId),
    /// One field of a group record
    GroupField(GroupId, GroupField),
    /// Suppresses the passive finalize listener for a group during a batch
    SkipFinalize(GroupId),
    /// Group whose expanded state was set by hand and ignores auto-collapse
    ManualOverride(GroupId),
}

impl FlagKey {
    pub fn group_field(group: &GroupId, field: GroupField) -> Self {
        FlagKey::GroupField(group.clone(), field)
    }

    /// Path segments from the encounter root
    pub fn segments(&self) -> Vec<&str> {
        match self {
            FlagKey::Groups => vec!["groups"],
            FlagKey::Group(id) => vec!["groups", id.as_str()],
            FlagKey::GroupField(id, field) => vec!["groups", id.as_str(), field.as_str()],
            FlagKey::SkipFinalize(id) => vec!["skipFinalize", id.as_str()],
            FlagKey::ManualOverride(id) => vec!["groupManualOverrides", id.as_str()],
        }
    }

    pub fn path(&self) -> String {
        self.segments().join(".")
    }
}

impl fmt::Display for FlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
