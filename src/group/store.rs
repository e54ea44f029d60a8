//! Typed access to group flags on the encounter

use crate::core::error::Result;
use crate::core::types::{GroupId, GroupRecord};
use crate::group::resolver::GroupRecords;
use crate::host::{FlagKey, GroupField, TagStore};
use serde_json::Value;
use std::sync::Arc;

/// Group records, skip flags and manual overrides over a [`TagStore`]
#[derive(Clone)]
pub struct GroupStore {
    tags: Arc<dyn TagStore>,
}

impl GroupStore {
    pub fn new(tags: Arc<dyn TagStore>) -> Self {
        Self { tags }
    }

    pub fn tags(&self) -> &Arc<dyn TagStore> {
        &self.tags
    }

    /// Every stored group; malformed records are skipped
    pub async fn records(&self) -> Result<GroupRecords> {
        let mut records = GroupRecords::new();
        let Some(Value::Object(map)) = self.tags.get_flag(&FlagKey::Groups).await? else {
            return Ok(records);
        };
        for (id, raw) in map {
            match serde_json::from_value::<GroupRecord>(raw) {
                Ok(record) => {
                    records.insert(GroupId::new(id), record);
                }
                Err(e) => {
                    tracing::warn!(group = %id, error = %e, "skipping malformed group record")
                }
            }
        }
        Ok(records)
    }

    pub async fn record(&self, id: &GroupId) -> Result<Option<GroupRecord>> {
        match self.tags.get_flag(&FlagKey::Group(id.clone())).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, id: &GroupId, record: &GroupRecord) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.tags.set_flag(&FlagKey::Group(id.clone()), value).await
    }

    pub async fn remove(&self, id: &GroupId) -> Result<()> {
        self.tags.unset_flag(&FlagKey::Group(id.clone())).await
    }

    pub async fn set_field(&self, id: &GroupId, field: GroupField, value: Value) -> Result<()> {
        self.tags.set_flag(&FlagKey::group_field(id, field), value).await
    }

    /// Store or clear the cached group initiative
    pub async fn set_initiative(&self, id: &GroupId, value: Option<f64>) -> Result<()> {
        let key = FlagKey::group_field(id, GroupField::Initiative);
        match value {
            Some(v) => self.tags.set_flag(&key, Value::from(v)).await,
            None => self.tags.unset_flag(&key).await,
        }
    }

    pub async fn skip_finalize(&self, id: &GroupId) -> Result<bool> {
        let flag = self.tags.get_flag(&FlagKey::SkipFinalize(id.clone())).await?;
        Ok(flag.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub async fn set_skip_finalize(&self, id: &GroupId) -> Result<()> {
        self.tags
            .set_flag(&FlagKey::SkipFinalize(id.clone()), Value::Bool(true))
            .await
    }

    pub async fn clear_skip_finalize(&self, id: &GroupId) -> Result<()> {
        self.tags.unset_flag(&FlagKey::SkipFinalize(id.clone())).await
    }

    pub async fn has_manual_override(&self, id: &GroupId) -> Result<bool> {
        let flag = self.tags.get_flag(&FlagKey::ManualOverride(id.clone())).await?;
        Ok(flag.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub async fn set_manual_override(&self, id: &GroupId, pinned: bool) -> Result<()> {
        let key = FlagKey::ManualOverride(id.clone());
        if pinned {
            self.tags.set_flag(&key, Value::Bool(true)).await
        } else {
            self.tags.unset_flag(&key).await
        }
    }
}
