//! # workbench-sync
//!
//! Keeps the editor buffer, the storage tree and the container filesystem in
//! step with each other.
//!
//! A [`Workspace`] owns the [`TreeStore`] and processes one [`WorkspaceEvent`]
//! at a time: commands from the user, deltas from the Storage Channel, and
//! terminal output or filesystem events from the Container Channel. Storage and
//! container access goes through the [`StorageService`] and
//! [`ContainerService`] traits.

pub mod channel;
pub mod delta_sync;
pub mod error;
pub mod mutation;
pub mod service;
pub mod terminal;
pub mod tree_store;
pub mod workspace;

pub use channel::{
    ChannelHandle, ChannelKind, ChannelSpec, Channels, ContainerChannel, ContainerInbound,
    ContainerOutbound, OpenedChannel, PathDeltas, ReconnectPolicy, StorageChannel,
    StorageInbound, StorageOutbound,
};
pub use delta_sync::{DeltaSyncEngine, Emission, SyncStats};
pub use error::{transient, SyncError};
pub use mutation::{Mirror, MutationCoordinator, RenameOutcome};
pub use service::{AddObject, ContainerService, StorageService};
pub use terminal::{normalize_container_path, BufferReload, ReplayOutcome, TerminalBridge};
pub use tree_store::{AppliedChange, PendingSave, SelectPlan, TreeStore};
pub use workspace::{
    ChannelStatus, Command, CommandOutput, CommandResult, Notice, NoticeLevel, Workspace,
    WorkspaceEvent, WorkspaceHandle, WorkspaceSnapshot, WorkspaceView,
};
