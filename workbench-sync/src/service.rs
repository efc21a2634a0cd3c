//! The storage and container services, as seen from the sync engine.
//!
//! Both are opaque remote services; the daemon provides HTTP clients and the
//! tests provide in-memory fakes.

use async_trait::async_trait;
use serde::Serialize;

use workbench_core::{FileNode, NodeKind, NodePath};

use crate::error::SyncError;

/// Body of a create request, shared by storage and the container mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddObject {
    pub path: NodePath,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Object-storage-backed project store. Source of truth for structure and content.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Full forest snapshot.
    async fn tree(&self) -> Result<Vec<FileNode>, SyncError>;

    /// Fails with [`SyncError::Conflict`] when the path already exists.
    async fn add_object(&self, request: &AddObject) -> Result<(), SyncError>;

    /// Rename the final segment of `path` to `name`.
    async fn edit_object(&self, path: &NodePath, name: &str) -> Result<(), SyncError>;

    /// Recursive for folders.
    async fn delete_object(&self, path: &NodePath, kind: NodeKind) -> Result<(), SyncError>;

    async fn load_file(&self, path: &NodePath) -> Result<String, SyncError>;

    async fn save_file(&self, path: &NodePath, content: &str) -> Result<(), SyncError>;
}

/// Sandboxed execution container with its own copy of the project.
#[async_trait]
pub trait ContainerService: Send + Sync {
    async fn add_file_folder(&self, request: &AddObject) -> Result<(), SyncError>;

    async fn delete_file_folder(&self, path: &NodePath, kind: NodeKind) -> Result<(), SyncError>;

    /// Push freshly loaded content so the sandbox copy matches storage.
    async fn sync_file(&self, path: &NodePath, content: &str) -> Result<(), SyncError>;
}
