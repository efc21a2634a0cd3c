//! `workbench tree` / `workbench buffer`: read-only views of the session.

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;

use workbench_core::{Buffer, FileNode, NodeKind, NodePath};
use workbench_daemon::DaemonRequest;

use super::{print_json, send};

/// The parts of a workspace snapshot the views render.
#[derive(Debug, Deserialize)]
pub struct SnapshotView {
    pub forest: Vec<FileNode>,
    pub selected: Option<NodePath>,
    #[serde(default)]
    pub expanded: Vec<NodePath>,
    pub buffer: Buffer,
}

fn snapshot() -> Result<(Value, SnapshotView)> {
    let raw = send(DaemonRequest::Snapshot)?;
    let view = serde_json::from_value(raw.clone()).context("unexpected snapshot shape")?;
    Ok((raw, view))
}

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Emit the raw snapshot as JSON.
    #[arg(long)]
    pub json: bool,

    /// Show collapsed folders' contents too.
    #[arg(long, short = 'a')]
    pub all: bool,
}

impl TreeArgs {
    pub fn run(self) -> Result<()> {
        let (raw, view) = snapshot()?;
        if self.json {
            return print_json(&raw);
        }
        if view.forest.is_empty() {
            println!("(empty project)");
            return Ok(());
        }
        let expanded: BTreeSet<NodePath> = view.expanded.into_iter().collect();
        let mut lines = Vec::new();
        render(
            &view.forest,
            &expanded,
            view.selected.as_ref(),
            self.all,
            0,
            &mut lines,
        );
        for line in lines {
            println!("{line}");
        }
        Ok(())
    }
}

/// One line per visible node, folders first as delivered by storage.
fn render(
    nodes: &[FileNode],
    expanded: &BTreeSet<NodePath>,
    selected: Option<&NodePath>,
    all: bool,
    depth: usize,
    out: &mut Vec<String>,
) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        match node.kind {
            NodeKind::Folder => {
                let open = all || expanded.contains(&node.path);
                let marker = if open { "▾" } else { "▸" };
                out.push(format!("{indent}{marker} {}/", node.name.blue().bold()));
                if open {
                    render(&node.children, expanded, selected, all, depth + 1, out);
                }
            }
            NodeKind::File => {
                let name = if selected == Some(&node.path) {
                    format!("{} ●", node.name.green().bold())
                } else {
                    node.name.clone()
                };
                out.push(format!("{indent}  {name}"));
            }
        }
    }
}

#[derive(Args, Debug)]
pub struct BufferArgs {
    /// Emit the buffer (content, language, owner, dirty) as JSON.
    #[arg(long)]
    pub json: bool,
}

impl BufferArgs {
    pub fn run(self) -> Result<()> {
        let (_, view) = snapshot()?;
        if self.json {
            let value = serde_json::to_value(&view.buffer).context("failed to encode buffer")?;
            return print_json(&value);
        }
        let Some(owner) = view.buffer.owner.as_ref() else {
            eprintln!("no file is open");
            return Ok(());
        };
        let state = if view.buffer.dirty {
            "modified".yellow().to_string()
        } else {
            "saved".green().to_string()
        };
        eprintln!("── {owner} [{}] {state}", view.buffer.language);
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(view.buffer.content.as_bytes())
            .context("failed to write buffer")?;
        if !view.buffer.content.ends_with('\n') {
            writeln!(stdout).context("failed to write buffer")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapsed_folders_hide_children() {
        colored::control::set_override(false);
        let forest = vec![
            FileNode::folder("app", vec![FileNode::file("app/index.js")]),
            FileNode::file("README.md"),
        ];
        let mut out = Vec::new();
        render(&forest, &BTreeSet::new(), None, false, 0, &mut out);
        assert_eq!(out, vec!["▸ app/", "  README.md"]);
    }

    #[test]
    fn expanded_folder_shows_selected_file() {
        colored::control::set_override(false);
        let forest = vec![FileNode::folder(
            "app",
            vec![FileNode::file("app/index.js"), FileNode::file("app/util.js")],
        )];
        let expanded: BTreeSet<NodePath> = [NodePath::from("app")].into_iter().collect();
        let selected = NodePath::from("app/index.js");
        let mut out = Vec::new();
        render(&forest, &expanded, Some(&selected), false, 0, &mut out);
        assert_eq!(out, vec!["▾ app/", "    index.js ●", "    util.js"]);
    }

    #[test]
    fn snapshot_view_ignores_extra_fields() {
        let raw = serde_json::json!({
            "outcome": "snapshot",
            "forest": [{"name": "a.txt", "path": "a.txt", "type": "file"}],
            "selected": "a.txt",
            "expanded": [],
            "buffer": {"content": "hi", "language": "plaintext", "owner": "a.txt", "dirty": false},
            "channels": {"storage": true, "container": false},
            "stats": {}
        });
        let view: SnapshotView = serde_json::from_value(raw).expect("decode");
        assert_eq!(view.forest.len(), 1);
        assert_eq!(view.buffer.owner, Some(NodePath::from("a.txt")));
    }
}
