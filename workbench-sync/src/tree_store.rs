//! Tree Store: the file forest, selection, expansion state and the active buffer.
//!
//! The store is plain data with synchronous mutators. Anything that needs the
//! network (loading a file on selection, saving the previous one) is planned
//! here and carried out by the workspace, which owns the store exclusively.

use std::collections::HashSet;

use workbench_core::{delta, language_for_path, tree, Buffer, Delta, FileNode, NodeKind, NodePath, Origin};

use crate::error::SyncError;

/// What selecting a node requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectPlan {
    /// Folders only toggle expansion.
    ToggleFolder(NodePath),
    /// The file is already open.
    AlreadyOpen(NodePath),
    /// Save `previous` (if any), then load and open `target`.
    OpenFile {
        previous: Option<PendingSave>,
        target: NodePath,
    },
}

/// Buffer content to persist before switching away from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    pub path: NodePath,
    pub content: String,
}

/// A change that has been applied to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub origin: Origin,
    /// Owner of the buffer at the time of the change.
    pub path: Option<NodePath>,
    pub deltas: Vec<Delta>,
}

#[derive(Debug, Default)]
pub struct TreeStore {
    forest: Vec<FileNode>,
    selected: Option<NodePath>,
    expanded: HashSet<NodePath>,
    buffer: Buffer,
    selecting: bool,
}

impl TreeStore {
    pub fn new(forest: Vec<FileNode>) -> Self {
        Self {
            forest,
            ..Self::default()
        }
    }

    pub fn forest(&self) -> &[FileNode] {
        &self.forest
    }

    pub fn selected(&self) -> Option<&NodePath> {
        self.selected.as_ref()
    }

    pub fn selected_node(&self) -> Option<&FileNode> {
        self.selected
            .as_ref()
            .and_then(|path| tree::find(&self.forest, path))
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    pub fn is_expanded(&self, path: &NodePath) -> bool {
        self.expanded.contains(path)
    }

    /// Expanded folder paths, sorted.
    pub fn expanded(&self) -> Vec<NodePath> {
        let mut paths: Vec<_> = self.expanded.iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Swap in a fresh forest. A selection that no longer resolves is cleared;
    /// the buffer keeps its content but loses its owner.
    pub fn replace_tree(&mut self, forest: Vec<FileNode>) {
        self.forest = forest;
        let dangling = self
            .selected
            .as_ref()
            .is_some_and(|path| !tree::contains(&self.forest, path));
        if dangling {
            tracing::debug!(
                path = %self.selected.as_ref().map(NodePath::as_str).unwrap_or_default(),
                "selected node vanished from refreshed tree",
            );
            self.selected = None;
            self.buffer.owner = None;
        }
    }

    /// Flip a folder's expansion state. Returns the new state.
    pub fn toggle_expanded(&mut self, path: &NodePath) -> bool {
        if self.expanded.remove(path) {
            false
        } else {
            self.expanded.insert(path.clone());
            true
        }
    }

    /// Replace buffer content and language, leaving ownership as is.
    pub fn set_buffer(&mut self, content: String, language: impl Into<String>) {
        self.buffer.content = content;
        self.buffer.language = language.into();
        self.buffer.dirty = false;
    }

    /// Decide what selecting `path` involves.
    pub fn plan_select(&self, path: &NodePath) -> Result<SelectPlan, SyncError> {
        let node = tree::find(&self.forest, path)
            .ok_or_else(|| SyncError::NotFound { path: path.clone() })?;

        if node.kind == NodeKind::Folder {
            return Ok(SelectPlan::ToggleFolder(node.path.clone()));
        }
        if self.selected.as_ref() == Some(&node.path) {
            return Ok(SelectPlan::AlreadyOpen(node.path.clone()));
        }

        let previous = self.selected.as_ref().map(|prev| PendingSave {
            path: prev.clone(),
            content: self.buffer.content.clone(),
        });
        Ok(SelectPlan::OpenFile {
            previous,
            target: node.path.clone(),
        })
    }

    /// Enter the transient "selecting" state while a load is in flight.
    pub fn begin_select(&mut self) {
        self.selecting = true;
    }

    pub fn abort_select(&mut self) {
        self.selecting = false;
    }

    /// Open `path` with freshly loaded `content`.
    pub fn finish_select(&mut self, path: NodePath, content: String) {
        self.set_buffer(content, language_for_path(path.as_str()));
        self.buffer.owner = Some(path.clone());
        self.selected = Some(path);
        self.selecting = false;
    }

    /// Apply deltas to the buffer, all or nothing.
    pub fn apply_change(
        &mut self,
        origin: Origin,
        deltas: Vec<Delta>,
    ) -> Result<AppliedChange, SyncError> {
        self.buffer.content = delta::apply_all(&self.buffer.content, &deltas)?;
        if !deltas.is_empty() {
            self.buffer.dirty = true;
        }
        Ok(AppliedChange {
            origin,
            path: self.buffer.owner.clone(),
            deltas,
        })
    }

    /// Record a successful save of `content` to `path`. The buffer is only
    /// marked clean when it still holds exactly what was saved.
    pub fn mark_saved(&mut self, path: &NodePath, content: &str) {
        if self.buffer.owner.as_ref() == Some(path) && self.buffer.content == content {
            self.buffer.dirty = false;
        }
    }

    /// Replace the open buffer with `content` when it belongs to `path` and
    /// holds no unsaved changes. Returns whether the buffer was replaced.
    pub fn reload_if_clean(&mut self, path: &NodePath, content: &str) -> bool {
        if self.buffer.owner.as_ref() != Some(path) || self.buffer.dirty {
            return false;
        }
        self.buffer.content = content.to_owned();
        true
    }

    /// Forget selection and expansion state at or below a deleted `path`.
    /// Returns whether the selection was cleared.
    pub fn forget_within(&mut self, path: &NodePath) -> bool {
        self.expanded.retain(|expanded| !expanded.is_within(path));
        let cleared = self
            .selected
            .as_ref()
            .is_some_and(|selected| selected.is_within(path));
        if cleared {
            self.selected = None;
            self.buffer.owner = None;
        }
        cleared
    }

    /// Re-point selection and expansion state after `from` was renamed to `to`.
    pub fn rebase(&mut self, from: &NodePath, to: &NodePath) {
        let moved = |path: &NodePath| -> NodePath {
            NodePath::new(format!("{}{}", to.as_str(), &path.as_str()[from.as_str().len()..]))
        };

        self.expanded = self
            .expanded
            .drain()
            .map(|path| if path.is_within(from) { moved(&path) } else { path })
            .collect();
        if let Some(selected) = self.selected.as_ref().filter(|s| s.is_within(from)) {
            let next = moved(selected);
            self.buffer.owner = Some(next.clone());
            self.buffer.language = language_for_path(next.as_str()).to_owned();
            self.selected = Some(next);
        }
    }
}
