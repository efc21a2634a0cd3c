pub mod config;
pub mod daemon;
pub mod term;
pub mod view;
pub mod workspace;

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;

use workbench_daemon::{request, DaemonError, DaemonRequest};

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Send one request to the running session and return its `data`.
pub fn send(request_body: DaemonRequest) -> Result<Value> {
    let home = home()?;
    match request(&home, &request_body) {
        Ok(data) => Ok(data),
        Err(err @ DaemonError::DaemonNotRunning { .. }) => {
            Err(err).context("no workspace session; start one with `workbench daemon start`")
        }
        Err(err) => Err(err.into()),
    }
}

pub fn print_json(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}
