//! Terminal Bridge: shell byte relay plus replay of container filesystem events
//! into storage.

use tokio::sync::broadcast;

use workbench_core::{HotReload, NodeKind, NodePath};

use crate::channel::{Channels, ContainerEntry, ContainerOutbound, ContainerRemoval, ContainerUpdate};
use crate::error::SyncError;
use crate::mutation::{Mirror, MutationCoordinator};
use crate::service::AddObject;
use crate::tree_store::TreeStore;

const OUTPUT_CAPACITY: usize = 256;

/// Strip the container's project-root prefix from `raw`.
///
/// Everything up to and including the last occurrence of `marker` is removed.
/// Returns `None` when the marker is absent or nothing is left after it.
pub fn normalize_container_path(raw: &str, marker: &str) -> Option<NodePath> {
    let rest = if marker.is_empty() {
        raw
    } else {
        let at = raw.rfind(marker)?;
        &raw[at + marker.len()..]
    };
    let path = NodePath::new(rest);
    (!path.as_str().is_empty()).then_some(path)
}

/// What happened to the open buffer on a `docker:update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferReload {
    /// The updated file is not the open one.
    NotOpen,
    Reloaded,
    /// The open buffer has unsaved edits and was left alone.
    KeptDirty,
    /// Hot reload is turned off.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    Created(NodePath),
    Deleted { path: NodePath, cleared_selection: bool },
    Updated { path: NodePath, buffer: BufferReload },
    /// The event's path lies outside the project root.
    Ignored(String),
}

pub struct TerminalBridge {
    root_marker: String,
    hot_reload: HotReload,
    output: broadcast::Sender<String>,
}

impl TerminalBridge {
    pub fn new(root_marker: impl Into<String>, hot_reload: HotReload) -> Self {
        let (output, _) = broadcast::channel(OUTPUT_CAPACITY);
        Self {
            root_marker: root_marker.into(),
            hot_reload,
            output,
        }
    }

    /// Receive terminal output from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.output.subscribe()
    }

    /// Forward keystrokes to the container shell.
    pub fn write(&self, channels: &mut Channels, data: String) -> Result<(), SyncError> {
        channels.send_container(ContainerOutbound::TerminalWrite(data))
    }

    /// Hand `terminal:data` to every attached viewer verbatim.
    pub fn relay_output(&self, data: String) {
        // No attached viewers is fine.
        let _ = self.output.send(data);
    }

    fn normalize(&self, raw: &str) -> Option<NodePath> {
        let path = normalize_container_path(raw, &self.root_marker);
        if path.is_none() {
            tracing::warn!(path = raw, marker = %self.root_marker, "container path outside project root");
        }
        path
    }

    /// `docker:add`: create the object in storage only.
    pub async fn replay_add(
        &self,
        coordinator: &MutationCoordinator,
        store: &mut TreeStore,
        entry: ContainerEntry,
    ) -> Result<ReplayOutcome, SyncError> {
        let Some(path) = self.normalize(&entry.path) else {
            return Ok(ReplayOutcome::Ignored(entry.path));
        };
        let content = match entry.kind {
            NodeKind::File => Some(entry.content.unwrap_or_default()),
            NodeKind::Folder => None,
        };
        let request = AddObject {
            path: path.clone(),
            kind: entry.kind,
            content,
        };
        coordinator.create(store, request, Mirror::StorageOnly).await?;
        Ok(ReplayOutcome::Created(path))
    }

    /// `docker:remove`: delete the object from storage only.
    pub async fn replay_remove(
        &self,
        coordinator: &MutationCoordinator,
        store: &mut TreeStore,
        removal: ContainerRemoval,
    ) -> Result<ReplayOutcome, SyncError> {
        let Some(path) = self.normalize(&removal.path) else {
            return Ok(ReplayOutcome::Ignored(removal.path));
        };
        let cleared_selection = coordinator
            .delete(store, &path, removal.kind, Mirror::StorageOnly)
            .await?;
        Ok(ReplayOutcome::Deleted {
            path,
            cleared_selection,
        })
    }

    /// `docker:update`: save the new content to storage, then apply the hot
    /// reload policy to the open buffer.
    pub async fn replay_update(
        &self,
        coordinator: &MutationCoordinator,
        store: &mut TreeStore,
        update: ContainerUpdate,
    ) -> Result<ReplayOutcome, SyncError> {
        let Some(path) = self.normalize(&update.path) else {
            return Ok(ReplayOutcome::Ignored(update.path));
        };
        coordinator.save(store, &path, &update.content).await?;

        let buffer = if store.buffer().owner.as_ref() != Some(&path) {
            BufferReload::NotOpen
        } else if self.hot_reload == HotReload::Never {
            BufferReload::Disabled
        } else if store.reload_if_clean(&path, &update.content) {
            BufferReload::Reloaded
        } else {
            BufferReload::KeptDirty
        };
        tracing::debug!(path = %path, ?buffer, "container update replayed");
        Ok(ReplayOutcome::Updated { path, buffer })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/home/user/s3-code/app/index.js", Some("app/index.js"))]
    #[case("/workspace/s3-code/README.md", Some("README.md"))]
    #[case("s3-code/app", Some("app"))]
    #[case("/srv/s3-code/vendor/s3-code/lib.rs", Some("lib.rs"))]
    #[case("/srv/s3-code/", None)]
    #[case("/srv/other/app/index.js", None)]
    fn strips_project_root(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            normalize_container_path(raw, "s3-code/"),
            expected.map(NodePath::from)
        );
    }

    #[test]
    fn empty_marker_keeps_path() {
        assert_eq!(
            normalize_container_path("/app/index.js", ""),
            Some(NodePath::from("app/index.js"))
        );
    }

    #[test]
    fn output_reaches_subscribers_verbatim() {
        let bridge = TerminalBridge::new("s3-code/", HotReload::IfClean);
        let mut rx = bridge.subscribe();
        bridge.relay_output("\u{1b}[32m$ \u{1b}[0m".to_owned());
        assert_eq!(rx.try_recv().expect("chunk"), "\u{1b}[32m$ \u{1b}[0m");
    }

    #[test]
    fn write_without_container_is_connectivity_error() {
        let bridge = TerminalBridge::new("s3-code/", HotReload::IfClean);
        let mut channels = Channels::default();
        let err = bridge.write(&mut channels, "ls\r".to_owned()).unwrap_err();
        assert!(!err.is_user_facing());
    }
}
