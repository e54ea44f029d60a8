use crate::core::types::GroupId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("Permission denied: group changes require a privileged user")]
    PermissionDenied,

    #[error("Group not ready to finalize: {0}")]
    NotReady(GroupId),

    #[error("Finalize already running")]
    Reentrant,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Group not found: {0}")]
    MissingGroup(GroupId),

    #[error("Roll failed: {0}")]
    Roll(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, GroupError>;
