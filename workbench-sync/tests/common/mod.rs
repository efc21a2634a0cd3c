//! In-memory storage and container services with a shared call log.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use workbench_core::{FileNode, HotReload, NodeKind, NodePath};
use workbench_sync::{
    transient, AddObject, ChannelHandle, ChannelKind, ContainerOutbound, ContainerService,
    MutationCoordinator, OpenedChannel, StorageOutbound, StorageService, SyncError,
    TerminalBridge, Workspace, WorkspaceEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Tree,
    Add { path: String, kind: NodeKind, content: Option<String> },
    Rename { path: String, name: String },
    Delete { path: String, kind: NodeKind },
    Load(String),
    Save { path: String, content: String },
    ContainerAdd(String),
    ContainerDelete(String),
    ContainerSync { path: String, content: String },
}

#[derive(Debug, Default)]
pub struct CallLog(Mutex<Vec<Call>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    /// Calls other than tree listings.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::Tree)
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[derive(Debug, Clone)]
struct Entry {
    kind: NodeKind,
    content: String,
}

#[derive(Default)]
pub struct FakeStorage {
    entries: Mutex<BTreeMap<String, Entry>>,
    load_delays: Mutex<HashMap<String, Duration>>,
    fail_saves: Mutex<bool>,
    fail_trees: Mutex<bool>,
    log: Arc<CallLog>,
}

impl FakeStorage {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Seed a file, or a folder when `path` ends with '/'.
    pub fn seed(&self, path: &str, content: &str) {
        let kind = if path.ends_with('/') {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        self.insert(NodePath::new(path).as_str(), kind, content.to_owned());
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .map(|entry| entry.content.clone())
    }

    /// Drop an entry behind the workspace's back.
    pub fn remove(&self, path: &str) {
        self.entries.lock().unwrap().remove(path);
    }

    pub fn delay_load(&self, path: &str, delay: Duration) {
        self.load_delays.lock().unwrap().insert(path.to_owned(), delay);
    }

    pub fn fail_saves(&self) {
        *self.fail_saves.lock().unwrap() = true;
    }

    pub fn fail_trees(&self) {
        *self.fail_trees.lock().unwrap() = true;
    }

    fn insert(&self, path: &str, kind: NodeKind, content: String) {
        let mut entries = self.entries.lock().unwrap();
        let mut parent = NodePath::new(path).parent();
        while let Some(folder) = parent {
            entries.entry(folder.as_str().to_owned()).or_insert(Entry {
                kind: NodeKind::Folder,
                content: String::new(),
            });
            parent = folder.parent();
        }
        entries.insert(path.to_owned(), Entry { kind, content });
    }

    fn build(entries: &BTreeMap<String, Entry>, parent: Option<&NodePath>) -> Vec<FileNode> {
        entries
            .iter()
            .filter(|(path, _)| NodePath::new(path.as_str()).parent().as_ref() == parent)
            .map(|(path, entry)| match entry.kind {
                NodeKind::File => FileNode::file(path.as_str()),
                NodeKind::Folder => {
                    let path = NodePath::new(path.as_str());
                    let children = Self::build(entries, Some(&path));
                    FileNode::folder(path, children)
                }
            })
            .collect()
    }
}

#[async_trait]
impl StorageService for FakeStorage {
    async fn tree(&self) -> Result<Vec<FileNode>, SyncError> {
        self.log.push(Call::Tree);
        if *self.fail_trees.lock().unwrap() {
            return Err(transient("tree", "/tree", "storage unavailable"));
        }
        let entries = self.entries.lock().unwrap();
        Ok(Self::build(&entries, None))
    }

    async fn add_object(&self, request: &AddObject) -> Result<(), SyncError> {
        self.log.push(Call::Add {
            path: request.path.to_string(),
            kind: request.kind,
            content: request.content.clone(),
        });
        if self.entries.lock().unwrap().contains_key(request.path.as_str()) {
            return Err(SyncError::Conflict {
                path: request.path.clone(),
            });
        }
        self.insert(
            request.path.as_str(),
            request.kind,
            request.content.clone().unwrap_or_default(),
        );
        Ok(())
    }

    async fn edit_object(&self, path: &NodePath, name: &str) -> Result<(), SyncError> {
        self.log.push(Call::Rename {
            path: path.to_string(),
            name: name.to_owned(),
        });
        let to = path.with_name(name);
        let mut entries = self.entries.lock().unwrap();
        let moved: Vec<String> = entries
            .keys()
            .filter(|key| NodePath::new(key.as_str()).is_within(path))
            .cloned()
            .collect();
        if moved.is_empty() {
            return Err(SyncError::NotFound { path: path.clone() });
        }
        for key in moved {
            if let Some(entry) = entries.remove(&key) {
                let renamed = format!("{}{}", to.as_str(), &key[path.as_str().len()..]);
                entries.insert(renamed, entry);
            }
        }
        Ok(())
    }

    async fn delete_object(&self, path: &NodePath, kind: NodeKind) -> Result<(), SyncError> {
        self.log.push(Call::Delete {
            path: path.to_string(),
            kind,
        });
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !NodePath::new(key.as_str()).is_within(path));
        if entries.len() == before {
            return Err(SyncError::NotFound { path: path.clone() });
        }
        Ok(())
    }

    async fn load_file(&self, path: &NodePath) -> Result<String, SyncError> {
        self.log.push(Call::Load(path.to_string()));
        let delay = self.load_delays.lock().unwrap().get(path.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.content(path.as_str())
            .ok_or_else(|| SyncError::NotFound { path: path.clone() })
    }

    async fn save_file(&self, path: &NodePath, content: &str) -> Result<(), SyncError> {
        self.log.push(Call::Save {
            path: path.to_string(),
            content: content.to_owned(),
        });
        if *self.fail_saves.lock().unwrap() {
            return Err(transient("save", path.as_str(), "storage unavailable"));
        }
        self.insert(path.as_str(), NodeKind::File, content.to_owned());
        Ok(())
    }
}

pub struct FakeContainer {
    log: Arc<CallLog>,
}

#[async_trait]
impl ContainerService for FakeContainer {
    async fn add_file_folder(&self, request: &AddObject) -> Result<(), SyncError> {
        self.log.push(Call::ContainerAdd(request.path.to_string()));
        Ok(())
    }

    async fn delete_file_folder(&self, path: &NodePath, _kind: NodeKind) -> Result<(), SyncError> {
        self.log.push(Call::ContainerDelete(path.to_string()));
        Ok(())
    }

    async fn sync_file(&self, path: &NodePath, content: &str) -> Result<(), SyncError> {
        self.log.push(Call::ContainerSync {
            path: path.to_string(),
            content: content.to_owned(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub workspace: Workspace,
    pub storage: Arc<FakeStorage>,
    pub log: Arc<CallLog>,
}

impl Harness {
    /// Workspace over a storage seeded with `files`, already entered.
    pub async fn new(files: &[(&str, &str)], hot_reload: HotReload) -> Self {
        let log = Arc::new(CallLog::default());
        let storage = Arc::new(FakeStorage::new(log.clone()));
        for (path, content) in files {
            storage.seed(path, content);
        }
        let container = Arc::new(FakeContainer { log: log.clone() });

        let coordinator = MutationCoordinator::new(storage.clone(), container);
        let bridge = TerminalBridge::new("s3-code/", hot_reload);
        let mut workspace = Workspace::new(coordinator, bridge);
        workspace.enter().await.expect("enter workspace");
        log.clear();

        Self {
            workspace,
            storage,
            log,
        }
    }

    pub async fn connect_storage(&mut self) -> UnboundedReceiver<StorageOutbound> {
        let (handle, rx) = ChannelHandle::new(ChannelKind::Storage);
        self.workspace
            .handle(WorkspaceEvent::ChannelOpened(OpenedChannel::Storage(handle)))
            .await;
        rx
    }

    pub async fn connect_container(&mut self) -> UnboundedReceiver<ContainerOutbound> {
        let (handle, rx) = ChannelHandle::new(ChannelKind::Container);
        self.workspace
            .handle(WorkspaceEvent::ChannelOpened(OpenedChannel::Container(handle)))
            .await;
        rx
    }
}

pub fn drain<M>(rx: &mut UnboundedReceiver<M>) -> Vec<M> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}
