//! Mutation Coordinator: structural changes against storage, reconciled into
//! the Tree Store by refetching the forest.

use std::sync::Arc;

use workbench_core::{tree, NodeKind, NodePath};

use crate::error::SyncError;
use crate::service::{AddObject, ContainerService, StorageService};
use crate::tree_store::TreeStore;

/// Whether a mutation is also applied to the container's copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    /// User-initiated: keep the sandbox filesystem in step.
    Container,
    /// Replayed from a container event; the container already has it.
    StorageOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Unchanged,
    Renamed { from: NodePath, to: NodePath },
}

/// Normalize a rename target. `Ok(None)` means there is nothing to do.
pub fn rename_target(path: &NodePath, new_name: &str) -> Result<Option<String>, SyncError> {
    let name = new_name.trim();
    if name.is_empty() || name == path.name() {
        return Ok(None);
    }
    if name.contains('/') {
        return Err(SyncError::InvalidName {
            name: name.to_owned(),
            reason: "names cannot contain '/'",
        });
    }
    if name == "." || name == ".." {
        return Err(SyncError::InvalidName {
            name: name.to_owned(),
            reason: "reserved name",
        });
    }
    Ok(Some(name.to_owned()))
}

pub struct MutationCoordinator {
    storage: Arc<dyn StorageService>,
    container: Arc<dyn ContainerService>,
}

impl MutationCoordinator {
    pub fn new(storage: Arc<dyn StorageService>, container: Arc<dyn ContainerService>) -> Self {
        Self { storage, container }
    }

    /// Create a file or folder. Storage reports conflicts; once storage accepts
    /// the object the container is mirrored before the tree is refetched.
    pub async fn create(
        &self,
        store: &mut TreeStore,
        request: AddObject,
        mirror: Mirror,
    ) -> Result<(), SyncError> {
        self.storage.add_object(&request).await?;
        tracing::info!(path = %request.path, kind = %request.kind, "created");

        if mirror == Mirror::Container {
            self.container.add_file_folder(&request).await?;
        }
        self.refresh(store).await
    }

    /// Rename the last segment of `path`. Selection and expansion follow the node.
    pub async fn rename(
        &self,
        store: &mut TreeStore,
        path: &NodePath,
        new_name: &str,
    ) -> Result<RenameOutcome, SyncError> {
        let Some(name) = rename_target(path, new_name)? else {
            return Ok(RenameOutcome::Unchanged);
        };

        self.storage.edit_object(path, &name).await?;
        let to = path.with_name(&name);
        tracing::info!(from = %path, to = %to, "renamed");
        store.rebase(path, &to);
        self.refresh(store).await?;
        Ok(RenameOutcome::Renamed {
            from: path.clone(),
            to,
        })
    }

    /// Delete `path` (recursively for folders). Returns whether the selection
    /// was cleared.
    pub async fn delete(
        &self,
        store: &mut TreeStore,
        path: &NodePath,
        kind: NodeKind,
        mirror: Mirror,
    ) -> Result<bool, SyncError> {
        self.storage.delete_object(path, kind).await?;
        tracing::info!(path = %path, kind = %kind, "deleted");
        let cleared = store.forget_within(path);

        if mirror == Mirror::Container {
            self.container.delete_file_folder(path, kind).await?;
        }
        self.refresh(store).await?;
        Ok(cleared)
    }

    pub async fn load(&self, path: &NodePath) -> Result<String, SyncError> {
        self.storage.load_file(path).await
    }

    /// Persist `content` to `path`, clearing the dirty mark if it is the open file.
    pub async fn save(
        &self,
        store: &mut TreeStore,
        path: &NodePath,
        content: &str,
    ) -> Result<(), SyncError> {
        self.storage.save_file(path, content).await?;
        tracing::debug!(path = %path, bytes = content.len(), "saved");
        store.mark_saved(path, content);
        Ok(())
    }

    /// Push loaded content into the sandbox copy.
    pub async fn sync_container(&self, path: &NodePath, content: &str) -> Result<(), SyncError> {
        self.container.sync_file(path, content).await
    }

    /// Refetch the forest from storage and replace the tree wholesale.
    pub async fn refresh(&self, store: &mut TreeStore) -> Result<(), SyncError> {
        let forest = self.storage.tree().await?;
        tree::validate(&forest)?;
        tracing::debug!(files = tree::file_count(&forest), "tree refreshed");
        store.replace_tree(forest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("  ")]
    #[case("")]
    #[case("index.js")]
    #[case("  index.js ")]
    fn blank_or_same_name_is_unchanged(#[case] name: &str) {
        let path = NodePath::from("app/index.js");
        assert_eq!(rename_target(&path, name).expect("valid"), None);
    }

    #[test]
    fn new_name_is_trimmed() {
        let path = NodePath::from("app/index.js");
        assert_eq!(
            rename_target(&path, " main.js\n").expect("valid").as_deref(),
            Some("main.js")
        );
    }

    #[rstest]
    #[case("lib/main.js")]
    #[case("..")]
    fn path_like_names_are_rejected(#[case] name: &str) {
        let err = rename_target(&NodePath::from("a.txt"), name).unwrap_err();
        assert!(matches!(err, SyncError::InvalidName { .. }), "got: {err}");
    }
}
