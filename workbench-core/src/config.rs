//! Workspace configuration stored as YAML.
//!
//! # Storage layout
//!
//! ```text
//! ~/.workbench/
//!   config.yaml   (mode 0600)
//! ```
//!
//! Every function touching disk takes the home directory explicitly; callers
//! resolve it once and tests pass a `TempDir`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Container paths are reported under an internal project root ending in this
/// segment; everything up to and including it is stripped.
pub const DEFAULT_CONTAINER_ROOT_MARKER: &str = "s3-code/";

// ---------------------------------------------------------------------------
// Config document
// ---------------------------------------------------------------------------

/// What to do with the open buffer when the container reports an update for
/// the file it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HotReload {
    /// Leave the buffer alone; the next selection sees the new content.
    Never,
    /// Replace the buffer only when it holds no unsaved changes.
    #[default]
    IfClean,
}

/// Backoff settings for re-opening a dropped channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// `None` keeps retrying for the whole session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: None,
        }
    }
}

/// Endpoints and behaviour of one workspace session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Base URL of the object-storage-backed project service.
    pub storage_url: String,
    /// Base URL of the sandboxed container service.
    pub container_url: String,
    /// WebSocket URL of the collaborative delta channel.
    pub storage_channel_url: String,
    /// WebSocket URL of the container's terminal/filesystem channel.
    pub container_channel_url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_container_root_marker")]
    pub container_root_marker: String,
    #[serde(default)]
    pub hot_reload: HotReload,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            storage_url: "http://localhost:3000".to_owned(),
            container_url: "http://localhost:4000".to_owned(),
            storage_channel_url: "ws://localhost:3000/ws".to_owned(),
            container_channel_url: "ws://localhost:4000/ws".to_owned(),
            auth_token: None,
            container_root_marker: default_container_root_marker(),
            hot_reload: HotReload::default(),
            reconnect: ReconnectSettings::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_container_root_marker() -> String {
    DEFAULT_CONTAINER_ROOT_MARKER.to_owned()
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    15
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.workbench/`. Pure, no I/O.
pub fn workbench_root(home: &Path) -> PathBuf {
    home.join(".workbench")
}

/// `<home>/.workbench/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    workbench_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.workbench/config.yaml`.
///
/// Returns `CoreError::ConfigNotFound` if absent,
/// `CoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<WorkspaceConfig, CoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(CoreError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

/// Atomically save the config.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &WorkspaceConfig) -> Result<(), CoreError> {
    let dir = workbench_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Write the default config if none exists yet. Idempotent: an existing file
/// is loaded and returned unchanged.
pub fn init_at(home: &Path) -> Result<WorkspaceConfig, CoreError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    let config = WorkspaceConfig::default();
    save_at(home, &config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
