//! Error types for workbench-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::NodePath;

/// All errors that can arise from core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config YAML file did not exist at the expected path.
    #[error("config not found at {path}; run `workbench config init`")]
    ConfigNotFound { path: PathBuf },

    /// A delta addressed text outside the buffer or inside a character.
    #[error("delta out of bounds: offset {offset} + length {length} exceeds {available} units")]
    DeltaOutOfBounds {
        offset: usize,
        length: usize,
        available: usize,
    },

    /// A forest snapshot broke the path invariants.
    #[error("invalid file tree at {path}: {reason}")]
    InvalidForest { path: NodePath, reason: String },
}
