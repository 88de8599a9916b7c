//! foldermirror — mirror a local folder to a GitHub branch.
//!
//! # Usage
//!
//! ```text
//! foldermirror init <path> --repo <owner/name> [--branch main] [--quiet-secs 30] [--token-env GITHUB_TOKEN]
//! foldermirror push [--dry-run]
//! foldermirror status [--json]
//! foldermirror daemon start|stop|status|flush
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, init::InitArgs, push::PushArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "foldermirror",
    version,
    about = "Mirror a local folder to a branch of a GitHub repository",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Point the mirror at a local folder and a remote repository.
    Init(InitArgs),

    /// Upload local changes made since the last sync, once, without watching.
    Push(PushArgs),

    /// Show the mirror configuration and what has been synced.
    Status(StatusArgs),

    /// Run or control the background watcher.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Push(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
