//! Error types for workbench-sync.

use thiserror::Error;

use workbench_core::{CoreError, NodePath};

use crate::channel::ChannelKind;

/// All errors that can arise from sync and mutation operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The channel needed for this operation is not open.
    #[error("{0} channel is not connected")]
    Connectivity(ChannelKind),

    /// Storage refused a create because the path is taken.
    #[error("{path} already exists")]
    Conflict { path: NodePath },

    /// Storage has no object at the path.
    #[error("{path} not found")]
    NotFound { path: NodePath },

    /// A storage or container request failed in transit.
    #[error("{operation} failed for '{target}': {message}")]
    TransientIo {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// Rename target rejected before reaching storage.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// An operation needed an open file and none is selected.
    #[error("no file is open")]
    NoActiveFile,

    /// Delta application or forest validation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The workspace mailbox or a reply channel went away.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl SyncError {
    /// Errors the user should be told about. Connectivity gaps are skipped
    /// silently; edits stay local until the channel comes back.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, SyncError::Connectivity(_) | SyncError::ChannelClosed(_))
    }
}

/// Convenience constructor for [`SyncError::TransientIo`].
pub fn transient(
    operation: &'static str,
    target: impl Into<String>,
    message: impl std::fmt::Display,
) -> SyncError {
    SyncError::TransientIo {
        operation,
        target: target.into(),
        message: message.to_string(),
    }
}
