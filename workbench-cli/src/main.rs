//! Workbench: drive a dual-backend code workspace from the terminal.
//!
//! # Usage
//!
//! ```text
//! workbench config init|show [--json]
//! workbench daemon start|stop|status [--json]
//! workbench tree [--json]
//! workbench buffer [--json]
//! workbench open <path>
//! workbench expand <path>
//! workbench new <path> [--folder] [--content <text>]
//! workbench rename <path> <name>
//! workbench rm <path>
//! workbench save
//! workbench refresh
//! workbench edit --offset <n> [--length <n>] [--text <text>]
//! workbench term write <text> [--no-enter]
//! workbench term attach
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand,
    daemon::DaemonCommand,
    term::TermCommand,
    view::{BufferArgs, TreeArgs},
    workspace::{EditArgs, NewArgs, PathArg, RenameArgs},
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "workbench",
    version,
    about = "Keep an editor buffer, project storage and a container in sync",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or inspect ~/.workbench/config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run or control the workspace session.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Print the project tree.
    Tree(TreeArgs),

    /// Print the active buffer.
    Buffer(BufferArgs),

    /// Select a file (opening it) or toggle a folder.
    Open(PathArg),

    /// Toggle a folder's expansion without selecting it.
    Expand(PathArg),

    /// Create a file or folder in storage and the container.
    New(NewArgs),

    /// Rename a file or folder in place.
    Rename(RenameArgs),

    /// Delete a file or folder.
    Rm(PathArg),

    /// Save the active buffer.
    Save,

    /// Re-fetch the tree from storage.
    Refresh,

    /// Apply one text replacement to the active buffer.
    Edit(EditArgs),

    /// Talk to the container terminal.
    Term {
        #[command(subcommand)]
        command: TermCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Tree(args) => args.run(),
        Commands::Buffer(args) => args.run(),
        Commands::Open(args) => commands::workspace::open(args),
        Commands::Expand(args) => commands::workspace::expand(args),
        Commands::New(args) => args.run(),
        Commands::Rename(args) => args.run(),
        Commands::Rm(args) => commands::workspace::remove(args),
        Commands::Save => commands::workspace::save(),
        Commands::Refresh => commands::workspace::refresh(),
        Commands::Edit(args) => args.run(),
        Commands::Term { command } => commands::term::run(command),
    }
}
