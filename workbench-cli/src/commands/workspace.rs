//! Commands that change the workspace: selection, mutations, saves and edits.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use workbench_core::NodePath;
use workbench_daemon::DaemonRequest;

use super::send;

#[derive(Args, Debug)]
pub struct PathArg {
    /// Project-relative path, e.g. `app/index.js`.
    pub path: String,
}

impl PathArg {
    fn node_path(&self) -> NodePath {
        NodePath::from(self.path.as_str())
    }
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Project-relative path of the new entry.
    pub path: String,

    /// Create a folder instead of a file.
    #[arg(long)]
    pub folder: bool,

    /// Initial file content.
    #[arg(long, conflicts_with = "folder")]
    pub content: Option<String>,
}

impl NewArgs {
    pub fn run(self) -> Result<()> {
        let data = send(DaemonRequest::New {
            path: NodePath::from(self.path.as_str()),
            folder: self.folder,
            content: self.content,
        })?;
        report(&data);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Project-relative path of the entry to rename.
    pub path: String,

    /// New name (not a path); stays in the same folder.
    pub name: String,
}

impl RenameArgs {
    pub fn run(self) -> Result<()> {
        let data = send(DaemonRequest::Rename {
            path: NodePath::from(self.path.as_str()),
            name: self.name,
        })?;
        report(&data);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// UTF-16 offset where the replacement starts.
    #[arg(long)]
    pub offset: usize,

    /// Number of UTF-16 units to replace.
    #[arg(long, default_value_t = 0)]
    pub length: usize,

    /// Replacement text.
    #[arg(long, default_value = "")]
    pub text: String,
}

impl EditArgs {
    pub fn run(self) -> Result<()> {
        if self.length == 0 && self.text.is_empty() {
            bail!("nothing to edit: pass --length and/or --text");
        }
        let data = send(DaemonRequest::Edit {
            offset: self.offset,
            length: self.length,
            text: self.text,
        })?;
        report(&data);
        Ok(())
    }
}

pub fn open(args: PathArg) -> Result<()> {
    let data = send(DaemonRequest::Open {
        path: args.node_path(),
    })?;
    report(&data);
    Ok(())
}

pub fn expand(args: PathArg) -> Result<()> {
    let data = send(DaemonRequest::Expand {
        path: args.node_path(),
    })?;
    report(&data);
    Ok(())
}

pub fn remove(args: PathArg) -> Result<()> {
    let data = send(DaemonRequest::Remove {
        path: args.node_path(),
    })?;
    report(&data);
    Ok(())
}

pub fn save() -> Result<()> {
    let data = send(DaemonRequest::Save)?;
    report(&data);
    Ok(())
}

pub fn refresh() -> Result<()> {
    let data = send(DaemonRequest::Refresh)?;
    report(&data);
    Ok(())
}

fn report(data: &Value) {
    println!("{}", describe(data));
}

/// One human line for a command outcome.
pub fn describe(data: &Value) -> String {
    let text = |key: &str| data[key].as_str().unwrap_or("?").to_owned();
    let check = "✓".green().to_string();
    match data["outcome"].as_str().unwrap_or_default() {
        "opened" => format!("{check} Opened {} ({})", text("path"), text("language")),
        "unchanged" => "nothing to do".to_owned(),
        "expanded" => {
            let state = if data["expanded"].as_bool().unwrap_or(false) {
                "expanded"
            } else {
                "collapsed"
            };
            format!("{} {state}", text("path"))
        }
        "created" => format!("{check} Created {}", text("path")),
        "renamed" => format!("{check} Renamed {} → {}", text("from"), text("to")),
        "deleted" => {
            let closed = if data["cleared_selection"].as_bool().unwrap_or(false) {
                " (closed the open file)"
            } else {
                ""
            };
            format!("{check} Deleted {}{closed}", text("path"))
        }
        "saved" => format!("{check} Saved {}", text("path")),
        "edited" => {
            let mut sent = Vec::new();
            if data["storage"].as_bool().unwrap_or(false) {
                sent.push("storage");
            }
            if data["container"].as_bool().unwrap_or(false) {
                sent.push("container");
            }
            if sent.is_empty() {
                "applied locally (no channel connected)".to_owned()
            } else {
                format!("{check} Applied and sent to {}", sent.join(" + "))
            }
        }
        "written" => format!("{check} Sent to terminal"),
        "refreshed" => format!(
            "{check} Refreshed tree ({} files)",
            data["files"].as_u64().unwrap_or(0)
        ),
        other => format!("done ({other})"),
    }
}
