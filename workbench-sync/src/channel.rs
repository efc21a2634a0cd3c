//! Message types and handles for the Storage and Container channels.
//!
//! Each frame on the wire is one JSON object `{"event": <name>, "data": <payload>}`.
//! A [`ChannelHandle`] is the sending half of one open channel; the workspace
//! keeps it in [`Channels`] and drops it when the transport reports a close.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use workbench_core::{Delta, NodeKind, NodePath, ReconnectSettings};

use crate::error::SyncError;
use crate::workspace::WorkspaceEvent;

// ---------------------------------------------------------------------------
// Channel identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Storage,
    Container,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Storage => write!(f, "storage"),
            ChannelKind::Container => write!(f, "container"),
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Deltas tagged with the file they apply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDeltas {
    pub path: NodePath,
    pub content: Vec<Delta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StorageOutbound {
    #[serde(rename = "send-delta")]
    SendDelta(PathDeltas),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StorageInbound {
    #[serde(rename = "receive-delta")]
    ReceiveDelta(Vec<Delta>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ContainerOutbound {
    #[serde(rename = "editor:send-delta")]
    EditorSendDelta(PathDeltas),
    #[serde(rename = "terminal:write")]
    TerminalWrite(String),
}

/// A file or folder that appeared inside the container.
///
/// `path` is as reported by the container, still carrying its project-root prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRemoval {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerUpdate {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ContainerInbound {
    #[serde(rename = "terminal:data")]
    TerminalData(String),
    #[serde(rename = "docker:add")]
    DockerAdd(ContainerEntry),
    #[serde(rename = "docker:remove")]
    DockerRemove(ContainerRemoval),
    #[serde(rename = "docker:update")]
    DockerUpdate(ContainerUpdate),
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Sending half of one open channel.
#[derive(Debug)]
pub struct ChannelHandle<M> {
    kind: ChannelKind,
    tx: mpsc::UnboundedSender<M>,
}

impl<M> Clone for ChannelHandle<M> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            tx: self.tx.clone(),
        }
    }
}

impl<M> ChannelHandle<M> {
    /// New handle plus the receiver the transport drains.
    pub fn new(kind: ChannelKind) -> (Self, mpsc::UnboundedReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { kind, tx }, rx)
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn send(&self, message: M) -> Result<(), SyncError> {
        self.tx
            .send(message)
            .map_err(|_| SyncError::Connectivity(self.kind))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A freshly opened channel, announced to the workspace by the transport.
#[derive(Debug)]
pub enum OpenedChannel {
    Storage(ChannelHandle<StorageOutbound>),
    Container(ChannelHandle<ContainerOutbound>),
}

/// The two nullable channel handles.
#[derive(Debug, Default)]
pub struct Channels {
    pub storage: Option<ChannelHandle<StorageOutbound>>,
    pub container: Option<ChannelHandle<ContainerOutbound>>,
}

impl Channels {
    pub fn open(&mut self, opened: OpenedChannel) {
        match opened {
            OpenedChannel::Storage(handle) => self.storage = Some(handle),
            OpenedChannel::Container(handle) => self.container = Some(handle),
        }
    }

    pub fn close(&mut self, kind: ChannelKind) {
        match kind {
            ChannelKind::Storage => self.storage = None,
            ChannelKind::Container => self.container = None,
        }
    }

    pub fn is_connected(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Storage => self.storage.as_ref().is_some_and(|h| !h.is_closed()),
            ChannelKind::Container => self.container.as_ref().is_some_and(|h| !h.is_closed()),
        }
    }

    /// Send on the Storage Channel. A handle whose transport has gone away is
    /// dropped so later sends fail fast.
    pub fn send_storage(&mut self, message: StorageOutbound) -> Result<(), SyncError> {
        let handle = self
            .storage
            .as_ref()
            .ok_or(SyncError::Connectivity(ChannelKind::Storage))?;
        let result = handle.send(message);
        if result.is_err() {
            self.storage = None;
        }
        result
    }

    pub fn send_container(&mut self, message: ContainerOutbound) -> Result<(), SyncError> {
        let handle = self
            .container
            .as_ref()
            .ok_or(SyncError::Connectivity(ChannelKind::Container))?;
        let result = handle.send(message);
        if result.is_err() {
            self.container = None;
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Transport binding
// ---------------------------------------------------------------------------

/// Ties a channel's message types to the workspace events its transport emits.
pub trait ChannelSpec: Send + Sync + 'static {
    const KIND: ChannelKind;
    type Outbound: Serialize + Send + 'static;
    type Inbound: DeserializeOwned + Send + 'static;

    fn opened(handle: ChannelHandle<Self::Outbound>) -> WorkspaceEvent;
    fn inbound(message: Self::Inbound) -> WorkspaceEvent;
}

pub struct StorageChannel;

impl ChannelSpec for StorageChannel {
    const KIND: ChannelKind = ChannelKind::Storage;
    type Outbound = StorageOutbound;
    type Inbound = StorageInbound;

    fn opened(handle: ChannelHandle<StorageOutbound>) -> WorkspaceEvent {
        WorkspaceEvent::ChannelOpened(OpenedChannel::Storage(handle))
    }

    fn inbound(message: StorageInbound) -> WorkspaceEvent {
        WorkspaceEvent::Storage(message)
    }
}

pub struct ContainerChannel;

impl ChannelSpec for ContainerChannel {
    const KIND: ChannelKind = ChannelKind::Container;
    type Outbound = ContainerOutbound;
    type Inbound = ContainerInbound;

    fn opened(handle: ChannelHandle<ContainerOutbound>) -> WorkspaceEvent {
        WorkspaceEvent::ChannelOpened(OpenedChannel::Container(handle))
    }

    fn inbound(message: ContainerInbound) -> WorkspaceEvent {
        WorkspaceEvent::Container(message)
    }
}

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

/// Exponential backoff for re-opening a dropped channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl From<&ReconnectSettings> for ReconnectPolicy {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based), or `None` once the
    /// attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.min(20));
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}
