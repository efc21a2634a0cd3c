//! Workbench core library: domain types, delta application, configuration.
//!
//! - [`types`]: newtypes, file forest, deltas and the editor buffer
//! - [`delta`]: applying deltas to buffer content
//! - [`tree`]: lookups and invariant checks over a forest
//! - [`language`]: extension → language id table
//! - [`config`]: `~/.workbench/config.yaml` load / save / init
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod delta;
pub mod error;
pub mod language;
pub mod tree;
pub mod types;

pub use config::{HotReload, ReconnectSettings, WorkspaceConfig};
pub use error::CoreError;
pub use language::language_for_path;
pub use types::{Buffer, Delta, FileNode, NodeKind, NodePath, Origin, Range, PLAIN_TEXT};
