//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reserved group id for members with no explicit group tag
pub const UNGROUPED: &str = "ungrouped";

/// Name shown for groups whose record carries no name
pub const UNNAMED_GROUP: &str = "Unnamed Group";

/// Unique identifier for encounter members
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque group identifier
///
/// Real groups are allocated as `gr-<uuid>`; the reserved [`UNGROUPED`]
/// value is only ever a bucket, never a stored group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh, unique group id
    pub fn generate() -> Self {
        Self(format!("gr-{}", Uuid::new_v4().simple()))
    }

    pub fn ungrouped() -> Self {
        Self(UNGROUPED.to_string())
    }

    pub fn is_ungrouped(&self) -> bool {
        self.0 == UNGROUPED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entity taking part in the encounter
///
/// Members are owned by the host. The group engine only reads them and
/// writes `initiative`, `sort` and the group tag back through the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    /// Current initiative, `None` until rolled
    pub initiative: Option<f64>,
    /// Secondary ranking for equal initiative (e.g. dexterity score)
    pub tiebreak: Option<f64>,
    /// Modifier added to initiative rolls (e.g. dexterity modifier)
    #[serde(default)]
    pub initiative_modifier: f64,
    /// Secondary display ordering key
    pub sort: Option<i64>,
    /// Group tag; absent means ungrouped
    pub group: Option<GroupId>,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: MemberId::new(id),
            name: name.into(),
            initiative: None,
            tiebreak: None,
            initiative_modifier: 0.0,
            sort: None,
            group: None,
        }
    }

    pub fn with_initiative(mut self, initiative: f64) -> Self {
        self.initiative = Some(initiative);
        self
    }

    pub fn with_tiebreak(mut self, tiebreak: f64) -> Self {
        self.tiebreak = Some(tiebreak);
        self
    }

    pub fn with_modifier(mut self, modifier: f64) -> Self {
        self.initiative_modifier = modifier;
        self
    }

    pub fn with_sort(mut self, sort: i64) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn in_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    /// The bucket this member resolves to
    pub fn group_or_ungrouped(&self) -> GroupId {
        self.group.clone().unwrap_or_else(GroupId::ungrouped)
    }

    /// Is this member tagged with the given group?
    pub fn belongs_to(&self, group: &GroupId) -> bool {
        self.group.as_ref() == Some(group)
    }

    pub fn has_finite_initiative(&self) -> bool {
        self.initiative.is_some_and(f64::is_finite)
    }
}

/// Header appearance chosen when a group is created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub img: Option<String>,
    pub color: Option<String>,
}

/// Persisted group metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(default)]
    pub name: Option<String>,
    /// Last finalized representative initiative
    #[serde(default)]
    pub initiative: Option<f64>,
    #[serde(default)]
    pub pinned: bool,
    /// Stored for other clients to read; headers render from the local
    /// expand state, not from this flag
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl GroupRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            initiative: None,
            pinned: false,
            expanded: true,
            img: None,
            color: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED_GROUP)
    }

    /// Cached initiative, if it is a usable number
    pub fn finite_initiative(&self) -> Option<f64> {
        self.initiative.filter(|v| v.is_finite())
    }
}

/// A single member's field changes inside a batch update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub id: MemberId,
    /// `Some(None)` clears the initiative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiative: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<i64>,
}

impl MemberUpdate {
    pub fn initiative(id: MemberId, value: f64) -> Self {
        Self {
            id,
            initiative: Some(Some(value)),
            sort: None,
        }
    }

    pub fn clear_initiative(id: MemberId) -> Self {
        Self {
            id,
            initiative: Some(None),
            sort: None,
        }
    }

    pub fn with_sort(mut self, sort: i64) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Apply this update to a member in place
    pub fn apply_to(&self, member: &mut Member) {
        if let Some(initiative) = self.initiative {
            member.initiative = initiative;
        }
        if let Some(sort) = self.sort {
            member.sort = Some(sort);
        }
    }
}

/// Round to exactly two decimals, the precision of the stagger encoding
pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
