//! The workspace: a single task that owns the Tree Store and applies every
//! event in arrival order.
//!
//! Channel transports, the control socket and tests only ever talk to the
//! workspace through its mailbox ([`WorkspaceHandle`]), so buffer changes are
//! applied one at a time even on a multi-threaded runtime. Selections are
//! serialized too: the last *requested* selection is the one left open.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use workbench_core::{tree, Buffer, Delta, FileNode, NodeKind, NodePath};

use crate::channel::{ChannelKind, Channels, ContainerInbound, OpenedChannel, StorageInbound};
use crate::delta_sync::{DeltaSyncEngine, SyncStats};
use crate::error::SyncError;
use crate::mutation::{Mirror, MutationCoordinator, RenameOutcome};
use crate::service::AddObject;
use crate::terminal::{BufferReload, ReplayOutcome, TerminalBridge};
use crate::tree_store::{SelectPlan, TreeStore};

const NOTICE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Events and commands
// ---------------------------------------------------------------------------

pub type CommandResult = Result<CommandOutput, SyncError>;

/// Everything the workspace task reacts to.
#[derive(Debug)]
pub enum WorkspaceEvent {
    ChannelOpened(OpenedChannel),
    ChannelClosed(ChannelKind),
    Storage(StorageInbound),
    Container(ContainerInbound),
    Command {
        command: Command,
        respond_to: oneshot::Sender<CommandResult>,
    },
}

/// User-facing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select { path: NodePath },
    ToggleExpanded { path: NodePath },
    Create {
        path: NodePath,
        kind: NodeKind,
        content: Option<String>,
    },
    Rename { path: NodePath, name: String },
    Delete { path: NodePath },
    Save,
    Edit { deltas: Vec<Delta> },
    TerminalWrite { data: String },
    Refresh,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutput {
    Opened { path: NodePath, language: String },
    Unchanged,
    Expanded { path: NodePath, expanded: bool },
    Created { path: NodePath },
    Renamed { from: NodePath, to: NodePath },
    Deleted { path: NodePath, cleared_selection: bool },
    Saved { path: NodePath },
    Edited { storage: bool, container: bool },
    Written,
    Refreshed { files: usize },
    Snapshot(WorkspaceSnapshot),
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub storage: bool,
    pub container: bool,
}

/// Full state dump returned by [`Command::Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceSnapshot {
    pub forest: Vec<FileNode>,
    pub selected: Option<NodePath>,
    pub expanded: Vec<NodePath>,
    pub buffer: Buffer,
    pub channels: ChannelStatus,
    pub stats: SyncStats,
}

/// Small, frequently published view of the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceView {
    /// A file load is in flight; editors should block input.
    pub selecting: bool,
    pub selected: Option<NodePath>,
    pub dirty: bool,
    pub channels: ChannelStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable sender into the workspace mailbox.
#[derive(Debug, Clone)]
pub struct WorkspaceHandle {
    tx: mpsc::Sender<WorkspaceEvent>,
}

impl WorkspaceHandle {
    pub fn new(tx: mpsc::Sender<WorkspaceEvent>) -> Self {
        Self { tx }
    }

    pub fn sender(&self) -> mpsc::Sender<WorkspaceEvent> {
        self.tx.clone()
    }

    /// Run a command and wait for its result.
    pub async fn request(&self, command: Command) -> CommandResult {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(WorkspaceEvent::Command {
                command,
                respond_to,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed("workspace mailbox"))?;
        rx.await
            .map_err(|_| SyncError::ChannelClosed("workspace response"))?
    }

    pub async fn event(&self, event: WorkspaceEvent) -> Result<(), SyncError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SyncError::ChannelClosed("workspace mailbox"))
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

pub struct Workspace {
    store: TreeStore,
    coordinator: MutationCoordinator,
    engine: DeltaSyncEngine,
    bridge: TerminalBridge,
    channels: Channels,
    notices: broadcast::Sender<Notice>,
    view: watch::Sender<WorkspaceView>,
}

impl Workspace {
    pub fn new(coordinator: MutationCoordinator, bridge: TerminalBridge) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (view, _) = watch::channel(WorkspaceView::default());
        Self {
            store: TreeStore::default(),
            coordinator,
            engine: DeltaSyncEngine::new(),
            bridge,
            channels: Channels::default(),
            notices,
            view,
        }
    }

    /// Fetch the initial forest from storage.
    pub async fn enter(&mut self) -> Result<(), SyncError> {
        self.coordinator.refresh(&mut self.store).await?;
        tracing::info!(
            files = tree::file_count(self.store.forest()),
            "workspace entered",
        );
        self.publish_view();
        Ok(())
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<WorkspaceView> {
        self.view.subscribe()
    }

    pub fn subscribe_terminal(&self) -> broadcast::Receiver<String> {
        self.bridge.subscribe()
    }

    /// Drain the mailbox until it closes or shutdown is broadcast. Closing
    /// returns with both channel handles dropped.
    pub async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<WorkspaceEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = mailbox.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event).await;
                }
            }
        }
        self.channels.close(ChannelKind::Storage);
        self.channels.close(ChannelKind::Container);
        tracing::info!("workspace closed");
    }

    /// Apply one event. Failures become notices; they never stop the loop.
    pub async fn handle(&mut self, event: WorkspaceEvent) {
        match event {
            WorkspaceEvent::ChannelOpened(opened) => {
                let kind = match &opened {
                    OpenedChannel::Storage(handle) => handle.kind(),
                    OpenedChannel::Container(handle) => handle.kind(),
                };
                tracing::info!(channel = %kind, "channel opened");
                self.channels.open(opened);
            }
            WorkspaceEvent::ChannelClosed(kind) => {
                tracing::warn!(channel = %kind, "channel closed");
                self.channels.close(kind);
            }
            WorkspaceEvent::Storage(StorageInbound::ReceiveDelta(deltas)) => {
                self.engine
                    .remote_deltas(&mut self.store, &mut self.channels, deltas);
            }
            WorkspaceEvent::Container(inbound) => self.container_event(inbound).await,
            WorkspaceEvent::Command {
                command,
                respond_to,
            } => {
                let result = self.execute(command).await;
                if let Err(err) = &result {
                    self.report(err);
                }
                // The requester may have given up waiting.
                let _ = respond_to.send(result);
            }
        }
        self.publish_view();
    }

    pub async fn execute(&mut self, command: Command) -> CommandResult {
        match command {
            Command::Select { path } => self.select(&path).await,
            Command::ToggleExpanded { path } => {
                let expanded = self.store.toggle_expanded(&path);
                Ok(CommandOutput::Expanded { path, expanded })
            }
            Command::Create {
                path,
                kind,
                content,
            } => {
                let request = AddObject {
                    path: path.clone(),
                    kind,
                    content,
                };
                self.coordinator
                    .create(&mut self.store, request, Mirror::Container)
                    .await?;
                Ok(CommandOutput::Created { path })
            }
            Command::Rename { path, name } => {
                match self.coordinator.rename(&mut self.store, &path, &name).await? {
                    RenameOutcome::Unchanged => Ok(CommandOutput::Unchanged),
                    RenameOutcome::Renamed { from, to } => Ok(CommandOutput::Renamed { from, to }),
                }
            }
            Command::Delete { path } => {
                let kind = tree::find(self.store.forest(), &path)
                    .map(|node| node.kind)
                    .ok_or_else(|| SyncError::NotFound { path: path.clone() })?;
                let cleared_selection = self
                    .coordinator
                    .delete(&mut self.store, &path, kind, Mirror::Container)
                    .await?;
                Ok(CommandOutput::Deleted {
                    path,
                    cleared_selection,
                })
            }
            Command::Save => {
                let path = self
                    .store
                    .buffer()
                    .owner
                    .clone()
                    .ok_or(SyncError::NoActiveFile)?;
                let content = self.store.buffer().content.clone();
                self.coordinator
                    .save(&mut self.store, &path, &content)
                    .await?;
                Ok(CommandOutput::Saved { path })
            }
            Command::Edit { deltas } => {
                let emission = self
                    .engine
                    .local_edit(&mut self.store, &mut self.channels, deltas)?;
                Ok(CommandOutput::Edited {
                    storage: emission.storage,
                    container: emission.container,
                })
            }
            Command::TerminalWrite { data } => {
                self.bridge.write(&mut self.channels, data)?;
                Ok(CommandOutput::Written)
            }
            Command::Refresh => {
                self.coordinator.refresh(&mut self.store).await?;
                Ok(CommandOutput::Refreshed {
                    files: tree::file_count(self.store.forest()),
                })
            }
            Command::Snapshot => Ok(CommandOutput::Snapshot(self.snapshot())),
        }
    }

    /// Folder: toggle. File: save the previous buffer, load, mirror to the
    /// container, open.
    async fn select(&mut self, path: &NodePath) -> CommandResult {
        let (previous, target) = match self.store.plan_select(path)? {
            SelectPlan::ToggleFolder(folder) => {
                let expanded = self.store.toggle_expanded(&folder);
                return Ok(CommandOutput::Expanded {
                    path: folder,
                    expanded,
                });
            }
            SelectPlan::AlreadyOpen(_) => return Ok(CommandOutput::Unchanged),
            SelectPlan::OpenFile { previous, target } => (previous, target),
        };

        if let Some(previous) = previous {
            if let Err(err) = self
                .coordinator
                .save(&mut self.store, &previous.path, &previous.content)
                .await
            {
                self.report(&err);
            }
        }

        self.store.begin_select();
        self.publish_view();
        let content = match self.coordinator.load(&target).await {
            Ok(content) => content,
            Err(err) => {
                self.store.abort_select();
                return Err(err);
            }
        };

        if let Err(err) = self.coordinator.sync_container(&target, &content).await {
            self.report(&err);
        }

        self.store.finish_select(target.clone(), content);
        tracing::info!(path = %target, language = %self.store.buffer().language, "file opened");
        Ok(CommandOutput::Opened {
            path: target,
            language: self.store.buffer().language.clone(),
        })
    }

    async fn container_event(&mut self, inbound: ContainerInbound) {
        let replayed = match inbound {
            ContainerInbound::TerminalData(data) => {
                self.bridge.relay_output(data);
                return;
            }
            ContainerInbound::DockerAdd(entry) => {
                self.bridge
                    .replay_add(&self.coordinator, &mut self.store, entry)
                    .await
            }
            ContainerInbound::DockerRemove(removal) => {
                self.bridge
                    .replay_remove(&self.coordinator, &mut self.store, removal)
                    .await
            }
            ContainerInbound::DockerUpdate(update) => {
                self.bridge
                    .replay_update(&self.coordinator, &mut self.store, update)
                    .await
            }
        };

        match replayed {
            Ok(ReplayOutcome::Updated {
                path,
                buffer: BufferReload::KeptDirty,
            }) => self.notify(
                NoticeLevel::Warning,
                format!("{path} changed in the container; the open buffer has unsaved edits"),
            ),
            Ok(outcome) => tracing::debug!(?outcome, "container event replayed"),
            Err(err) => self.report(&err),
        }
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            forest: self.store.forest().to_vec(),
            selected: self.store.selected().cloned(),
            expanded: self.store.expanded(),
            buffer: self.store.buffer().clone(),
            channels: self.channel_status(),
            stats: self.engine.stats(),
        }
    }

    fn channel_status(&self) -> ChannelStatus {
        ChannelStatus {
            storage: self.channels.is_connected(ChannelKind::Storage),
            container: self.channels.is_connected(ChannelKind::Container),
        }
    }

    fn publish_view(&self) {
        let next = WorkspaceView {
            selecting: self.store.is_selecting(),
            selected: self.store.selected().cloned(),
            dirty: self.store.buffer().dirty,
            channels: self.channel_status(),
        };
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Turn an operation failure into a notice. Connectivity gaps are only logged.
    fn report(&self, err: &SyncError) {
        if err.is_user_facing() {
            self.notify(NoticeLevel::Error, err.to_string());
        } else {
            tracing::debug!(error = %err, "skipped");
        }
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Error => tracing::error!(%message, "notice"),
            NoticeLevel::Warning => tracing::warn!(%message, "notice"),
            NoticeLevel::Info => tracing::info!(%message, "notice"),
        }
        let _ = self.notices.send(Notice {
            level,
            message,
            at: Utc::now(),
        });
    }
}
