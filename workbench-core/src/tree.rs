//! Read-only helpers over a `FileNode` forest.

use std::collections::HashSet;

use crate::error::CoreError;
use crate::types::{FileNode, NodeKind, NodePath};

/// Find the node at `path`, searching depth-first.
pub fn find<'a>(forest: &'a [FileNode], path: &NodePath) -> Option<&'a FileNode> {
    for node in forest {
        if &node.path == path {
            return Some(node);
        }
        if node.kind == NodeKind::Folder && path.is_within(&node.path) {
            if let Some(found) = find(&node.children, path) {
                return Some(found);
            }
        }
    }
    None
}

pub fn contains(forest: &[FileNode], path: &NodePath) -> bool {
    find(forest, path).is_some()
}

/// Visit every node, parents before children.
pub fn walk<'a>(forest: &'a [FileNode], visit: &mut impl FnMut(&'a FileNode)) {
    for node in forest {
        visit(node);
        walk(&node.children, visit);
    }
}

/// Number of file nodes in the forest.
pub fn file_count(forest: &[FileNode]) -> usize {
    let mut count = 0;
    walk(forest, &mut |node| {
        if node.is_file() {
            count += 1;
        }
    });
    count
}

/// Check the forest invariants: unique paths, each path equal to the parent's
/// path joined with the node name, and no children under files.
pub fn validate(forest: &[FileNode]) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    validate_level(forest, None, &mut seen)
}

fn validate_level<'a>(
    nodes: &'a [FileNode],
    parent: Option<&NodePath>,
    seen: &mut HashSet<&'a NodePath>,
) -> Result<(), CoreError> {
    for node in nodes {
        let invalid = |reason: &str| CoreError::InvalidForest {
            path: node.path.clone(),
            reason: reason.to_owned(),
        };

        if !seen.insert(&node.path) {
            return Err(invalid("duplicate path"));
        }
        let expected = match parent {
            Some(parent) => parent.join(&node.name),
            None => NodePath::new(&node.name),
        };
        if expected != node.path {
            return Err(invalid(&format!("expected path {expected}")));
        }
        if node.kind == NodeKind::File && !node.children.is_empty() {
            return Err(invalid("file node has children"));
        }
        validate_level(&node.children, Some(&node.path), seen)?;
    }
    Ok(())
}
