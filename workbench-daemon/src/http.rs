//! HTTP clients for the storage and container services.
//!
//! `ureq` is blocking, so every call runs on the blocking pool. Status 409 maps
//! to [`SyncError::Conflict`], 404 to [`SyncError::NotFound`] and everything
//! else to [`SyncError::TransientIo`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use workbench_core::{FileNode, NodeKind, NodePath, WorkspaceConfig};
use workbench_sync::{transient, AddObject, ContainerService, StorageService, SyncError};

const TREE: &str = "sidebar/get-folder-structure/tree";
const ADD_OBJECT: &str = "sidebar/add-s3-object";
const EDIT_OBJECT: &str = "sidebar/edit-s3-object";
const DELETE_OBJECT: &str = "sidebar/delete-s3-object";
const LOAD_FILE: &str = "editor/load-file";
const SAVE_FILE: &str = "editor/save-file";

const ADD_FILE_FOLDER: &str = "folder-structure/add-file-folder";
const DELETE_FILE_FOLDER: &str = "folder-structure/delete-file-folder";
const SYNC_FILE: &str = "folder-structure/s3-backend-mismatch";

#[derive(Debug, Deserialize)]
struct LoadedFile {
    content: String,
}

/// Map a non-success status to the error taxonomy. `path` is the object the
/// request was about, when there is one.
pub fn status_error(
    code: u16,
    operation: &'static str,
    path: Option<&NodePath>,
    body: &str,
) -> SyncError {
    match (code, path) {
        (409, Some(path)) => SyncError::Conflict { path: path.clone() },
        (404, Some(path)) => SyncError::NotFound { path: path.clone() },
        _ => {
            let target = path.map(NodePath::to_string).unwrap_or_default();
            let body = body.trim();
            if body.is_empty() {
                transient(operation, target, format!("HTTP {code}"))
            } else {
                transient(operation, target, format!("HTTP {code}: {body}"))
            }
        }
    }
}

#[derive(Clone)]
struct HttpClient {
    agent: ureq::Agent,
    base: String,
    token: Option<String>,
}

impl HttpClient {
    fn new(base: &str, token: Option<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base: base.trim_end_matches('/').to_owned(),
            token,
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base, route)
    }

    /// Issue one request and return the response body.
    async fn call(
        &self,
        operation: &'static str,
        method: &'static str,
        route: &'static str,
        path: Option<&NodePath>,
        body: Option<Value>,
    ) -> Result<String, SyncError> {
        let client = self.clone();
        let path = path.cloned();
        tokio::task::spawn_blocking(move || {
            client.call_blocking(operation, method, route, path.as_ref(), body)
        })
        .await
        .map_err(|err| transient(operation, route, err))?
    }

    fn call_blocking(
        &self,
        operation: &'static str,
        method: &'static str,
        route: &'static str,
        path: Option<&NodePath>,
        body: Option<Value>,
    ) -> Result<String, SyncError> {
        let url = self.url(route);
        let mut request = self.agent.request(method, &url);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        let target = || path.map(NodePath::to_string).unwrap_or_else(|| url.clone());

        match result {
            Ok(response) => response
                .into_string()
                .map_err(|err| transient(operation, target(), err)),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                tracing::debug!(%url, code, operation, "service returned error status");
                Err(status_error(code, operation, path, &body))
            }
            Err(ureq::Error::Transport(err)) => Err(transient(operation, target(), err)),
        }
    }
}

/// Storage service over HTTP.
#[derive(Clone)]
pub struct HttpStorage {
    client: HttpClient,
}

impl HttpStorage {
    pub fn new(base: &str, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: HttpClient::new(base, token, timeout),
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self::new(
            &config.storage_url,
            config.auth_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl StorageService for HttpStorage {
    async fn tree(&self) -> Result<Vec<FileNode>, SyncError> {
        let body = self.client.call("tree", "GET", TREE, None, None).await?;
        serde_json::from_str(&body).map_err(|err| transient("tree", TREE, err))
    }

    async fn add_object(&self, request: &AddObject) -> Result<(), SyncError> {
        let body = serde_json::to_value(request)
            .map_err(|err| transient("create", request.path.as_str(), err))?;
        self.client
            .call("create", "POST", ADD_OBJECT, Some(&request.path), Some(body))
            .await
            .map(drop)
    }

    async fn edit_object(&self, path: &NodePath, name: &str) -> Result<(), SyncError> {
        let body = json!({ "path": path, "name": name });
        self.client
            .call("rename", "PUT", EDIT_OBJECT, Some(path), Some(body))
            .await
            .map(drop)
    }

    async fn delete_object(&self, path: &NodePath, kind: NodeKind) -> Result<(), SyncError> {
        let body = json!({ "path": path, "type": kind });
        self.client
            .call("delete", "PUT", DELETE_OBJECT, Some(path), Some(body))
            .await
            .map(drop)
    }

    async fn load_file(&self, path: &NodePath) -> Result<String, SyncError> {
        let body = self
            .client
            .call("load", "POST", LOAD_FILE, Some(path), Some(json!({ "path": path })))
            .await?;
        let loaded: LoadedFile =
            serde_json::from_str(&body).map_err(|err| transient("load", path.as_str(), err))?;
        Ok(loaded.content)
    }

    async fn save_file(&self, path: &NodePath, content: &str) -> Result<(), SyncError> {
        let body = json!({ "path": path, "content": content });
        self.client
            .call("save", "POST", SAVE_FILE, Some(path), Some(body))
            .await
            .map(drop)
    }
}

/// Container service over HTTP.
#[derive(Clone)]
pub struct HttpContainer {
    client: HttpClient,
}

impl HttpContainer {
    pub fn new(base: &str, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: HttpClient::new(base, token, timeout),
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self::new(
            &config.container_url,
            config.auth_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl ContainerService for HttpContainer {
    async fn add_file_folder(&self, request: &AddObject) -> Result<(), SyncError> {
        let body = serde_json::to_value(request)
            .map_err(|err| transient("container create", request.path.as_str(), err))?;
        self.client
            .call(
                "container create",
                "POST",
                ADD_FILE_FOLDER,
                Some(&request.path),
                Some(body),
            )
            .await
            .map(drop)
    }

    async fn delete_file_folder(&self, path: &NodePath, kind: NodeKind) -> Result<(), SyncError> {
        let body = json!({ "path": path, "type": kind });
        self.client
            .call("container delete", "POST", DELETE_FILE_FOLDER, Some(path), Some(body))
            .await
            .map(drop)
    }

    async fn sync_file(&self, path: &NodePath, content: &str) -> Result<(), SyncError> {
        let body = json!({ "path": path, "content": content });
        self.client
            .call("container sync", "POST", SYNC_FILE, Some(path), Some(body))
            .await
            .map(drop)
    }
}
