//! Domain types shared by the sync engine, the daemon and the CLI.
//!
//! Wire-facing structs (`FileNode`, `Delta`, `Range`) serialize exactly as the
//! storage service and the editor channels expect them, so they can be passed
//! through serde_json without an intermediate DTO layer.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Slash-delimited storage key of a file or folder, e.g. `app/src/index.js`.
///
/// The path is the primary key of a node in the forest. It never carries a
/// leading or trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(pub String);

impl NodePath {
    /// Build a path, trimming stray leading/trailing slashes.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim_matches('/').to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the path.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Path of the containing folder, `None` for a root-level node.
    pub fn parent(&self) -> Option<NodePath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| NodePath(parent.to_owned()))
    }

    /// Child path `<self>/<name>`.
    pub fn join(&self, name: &str) -> NodePath {
        if self.0.is_empty() {
            NodePath::new(name)
        } else {
            NodePath(format!("{}/{}", self.0, name.trim_matches('/')))
        }
    }

    /// Same parent, different final segment.
    pub fn with_name(&self, name: &str) -> NodePath {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => NodePath::new(name),
        }
    }

    /// True when `self` equals `ancestor` or lives somewhere below it.
    pub fn is_within(&self, ancestor: &NodePath) -> bool {
        self == ancestor
            || (self.0.len() > ancestor.0.len()
                && self.0.starts_with(&ancestor.0)
                && self.0.as_bytes()[ancestor.0.len()] == b'/')
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for NodePath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for NodePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Whether a node is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Folder => write!(f, "folder"),
        }
    }
}

/// Where an applied buffer change came from.
///
/// Remote changes are applied to the buffer but never re-broadcast as if they
/// were local edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

// ---------------------------------------------------------------------------
// File forest
// ---------------------------------------------------------------------------

/// A file or folder in the project forest. Folders own their children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: NodePath,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

impl FileNode {
    pub fn file(path: impl Into<NodePath>) -> Self {
        let path = path.into();
        Self {
            name: path.name().to_owned(),
            path,
            kind: NodeKind::File,
            children: Vec::new(),
        }
    }

    pub fn folder(path: impl Into<NodePath>, children: Vec<FileNode>) -> Self {
        let path = path.into();
        Self {
            name: path.name().to_owned(),
            path,
            kind: NodeKind::Folder,
            children,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

// ---------------------------------------------------------------------------
// Editor deltas
// ---------------------------------------------------------------------------

/// Line/column span of a change, 1-based, in the editor's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub start_line_number: u32,
    pub start_column: u32,
    pub end_line_number: u32,
    pub end_column: u32,
}

/// A single text replacement: remove `range_length` units at `range_offset`
/// and insert `text` in their place.
///
/// Offsets and lengths are UTF-16 code units. `range` is carried for
/// consumers that work in line/column space and is relayed untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    #[serde(default)]
    pub range: Range,
    pub range_length: usize,
    pub text: String,
    pub range_offset: usize,
}

impl Delta {
    /// Pure insertion at `offset`.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(offset, 0, text)
    }

    pub fn replace(offset: usize, length: usize, text: impl Into<String>) -> Self {
        Self {
            range: Range::default(),
            range_length: length,
            text: text.into(),
            range_offset: offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------------

/// Language tag used when no extension matches.
pub const PLAIN_TEXT: &str = "plaintext";

/// The single active editor buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffer {
    pub content: String,
    pub language: String,
    /// File this buffer belongs to; always the selected file or `None`.
    pub owner: Option<NodePath>,
    /// Changed since the last load or successful save.
    pub dirty: bool,
}

impl Default for Buffer {
    fn default() -> Self {
        Self {
            content: String::new(),
            language: PLAIN_TEXT.to_owned(),
            owner: None,
            dirty: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
