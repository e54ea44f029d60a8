//! Tracker settings with documented defaults
//!
//! Settings are loaded from TOML. Every section is optional; missing keys
//! fall back to the defaults below.

use crate::core::error::Result;
use crate::core::types::UNNAMED_GROUP;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// User-facing toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Expand the active member's group on each turn change and collapse
    /// the others (pinned groups stay open)
    pub auto_collapse_groups: bool,
    /// Verbose debug logging for troubleshooting
    pub enable_logging: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            auto_collapse_groups: true,
            enable_logging: false,
        }
    }
}

/// Tunables for the initiative encoding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitiativeSettings {
    /// Tiebreak used for members that carry none (an average ability score)
    pub default_tiebreak: f64,
    /// Gap between consecutive ordering keys inside a group
    pub sort_stride: i64,
    /// How far below the lowest existing ordering key a finalized group starts
    pub sort_margin: i64,
}

impl Default for InitiativeSettings {
    fn default() -> Self {
        Self {
            default_tiebreak: 10.0,
            sort_stride: 100,
            sort_margin: 1000,
        }
    }
}

/// Defaults applied when a group is created without explicit values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupDefaults {
    pub name: String,
    pub img: String,
    pub color: String,
}

impl Default for GroupDefaults {
    fn default() -> Self {
        Self {
            name: UNNAMED_GROUP.to_string(),
            img: "icons/svg/combat.svg".to_string(),
            color: "#00ff00".to_string(),
        }
    }
}

/// Complete settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub tracker: TrackerSettings,
    #[serde(default)]
    pub initiative: InitiativeSettings,
    #[serde(default)]
    pub groups: GroupDefaults,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Validate settings for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.initiative.sort_stride <= 0 {
            return Err(format!(
                "sort_stride ({}) must be positive",
                self.initiative.sort_stride
            ));
        }

        if self.initiative.sort_margin < 0 {
            return Err(format!(
                "sort_margin ({}) must not be negative",
                self.initiative.sort_margin
            ));
        }

        if !self.initiative.default_tiebreak.is_finite() {
            return Err("default_tiebreak must be a finite number".into());
        }

        if self.groups.name.trim().is_empty() {
            return Err("default group name must not be empty".into());
        }

        Ok(())
    }

    /// Filter directive for the tracing subscriber
    pub fn log_directive(&self) -> &'static str {
        if self.tracker.enable_logging {
            "squad_initiative=debug"
        } else {
            "squad_initiative=info"
        }
    }
}
