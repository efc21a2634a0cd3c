//! `workbench config`: create and inspect the workspace configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use workbench_core::config::{self, config_path_at};
use workbench_core::{HotReload, WorkspaceConfig};

use super::home;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default config unless one already exists.
    Init,
    /// Print the active config.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Emit machine-readable JSON (the auth token is never printed).
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "setting")]
    key: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = home()?;
    match command {
        ConfigCommand::Init => {
            let existed = config_path_at(&home).exists();
            config::init_at(&home).context("failed to initialize config")?;
            let path = config_path_at(&home);
            if existed {
                println!("config already exists: {}", path.display());
            } else {
                println!("✓ Wrote default config to {}", path.display());
            }
        }
        ConfigCommand::Show(args) => {
            let mut config = config::load_at(&home)
                .context("failed to load config; run `workbench config init` first")?;
            if args.json {
                config.auth_token = config.auth_token.map(|_| "***".to_owned());
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config).context("failed to render config JSON")?
                );
            } else {
                let mut table = Table::new(rows(&config));
                table.with(Style::rounded());
                println!("{table}");
            }
        }
    }
    Ok(())
}

fn rows(config: &WorkspaceConfig) -> Vec<SettingRow> {
    let hot_reload = match config.hot_reload {
        HotReload::Never => "never",
        HotReload::IfClean => "if-clean",
    };
    let max_attempts = config
        .reconnect
        .max_attempts
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unlimited".to_owned());
    let token = if config.auth_token.is_some() { "set" } else { "unset" };
    vec![
        row("storage_url", &config.storage_url),
        row("container_url", &config.container_url),
        row("storage_channel_url", &config.storage_channel_url),
        row("container_channel_url", &config.container_channel_url),
        row("auth_token", token),
        row("container_root_marker", &config.container_root_marker),
        row("hot_reload", hot_reload),
        row(
            "reconnect",
            &format!(
                "{}ms → {}ms, {max_attempts} attempts",
                config.reconnect.initial_delay_ms, config.reconnect.max_delay_ms
            ),
        ),
        row("request_timeout", &format!("{}s", config.request_timeout_secs)),
    ]
}

fn row(key: &'static str, value: &str) -> SettingRow {
    SettingRow {
        key,
        value: value.to_owned(),
    }
}
