//! `workbench daemon`: workspace session lifecycle.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};

use workbench_daemon::paths::socket_path;
use workbench_daemon::{request_status, request_stop, start_blocking, DaemonError};

use super::{home, print_json};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the session in the foreground (channels + control socket).
    Start,
    /// Request graceful shutdown over the control socket.
    Stop,
    /// Query the running session.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("workspace session exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status(args) => {
            let status = match request_status(&home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            if args.json {
                print_json(&status)?;
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

fn print_status(status: &Value) {
    if !status["running"].as_bool().unwrap_or(false) {
        println!("{} daemon is not running", "■".bright_black().bold());
        return;
    }

    let since = status["started_at"]
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| format_age(at.with_timezone(&Utc)))
        .unwrap_or_else(|| "unknown".to_owned());
    println!("{} running for {since}", "■".green().bold());
    println!(
        "  storage channel:   {}",
        channel_label(status["channels"]["storage"].as_bool())
    );
    println!(
        "  container channel: {}",
        channel_label(status["channels"]["container"].as_bool())
    );
    match status["selected"].as_str() {
        Some(path) => {
            let dirty = if status["dirty"].as_bool().unwrap_or(false) {
                " (modified)".yellow().to_string()
            } else {
                String::new()
            };
            println!("  open file:         {path}{dirty}");
        }
        None => println!("  open file:         -"),
    }
    if let Some(socket) = status["socket"].as_str() {
        println!("  socket:            {socket}");
    }
}

fn channel_label(connected: Option<bool>) -> String {
    if connected.unwrap_or(false) {
        "connected".green().to_string()
    } else {
        "disconnected".red().to_string()
    }
}

fn format_age(since: DateTime<Utc>) -> String {
    let secs = (Utc::now() - since).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}
