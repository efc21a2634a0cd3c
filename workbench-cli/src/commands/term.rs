//! `workbench term`: container terminal input and output.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Subcommand;

use workbench_daemon::{attach, DaemonRequest};

use super::{home, send};

#[derive(Subcommand, Debug)]
pub enum TermCommand {
    /// Send keystrokes to the container terminal.
    Write {
        /// Text to send.
        text: String,

        /// Do not append a carriage return.
        #[arg(long)]
        no_enter: bool,
    },
    /// Stream terminal output until interrupted.
    Attach,
}

pub fn run(command: TermCommand) -> Result<()> {
    match command {
        TermCommand::Write { text, no_enter } => {
            let data = if no_enter { text } else { format!("{text}\r") };
            send(DaemonRequest::TermWrite { data })?;
        }
        TermCommand::Attach => {
            let home = home()?;
            let mut stdout = std::io::stdout().lock();
            attach(&home, |chunk| {
                stdout.write_all(chunk.as_bytes())?;
                stdout.flush()
            })
            .context("terminal stream ended with error")?;
        }
    }
    Ok(())
}
