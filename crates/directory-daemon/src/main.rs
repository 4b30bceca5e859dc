//! Business Directory Daemon
//!
//! Indexes participant business cards into a searchable directory.
//!
//! # Usage
//!
//! ```bash
//! directory-daemon start
//! directory-daemon put iso6523-actorid-upis::9915:test --owner admin
//! directory-daemon search 'country:AT name:acme*'
//! directory-daemon ledger
//! ```
//!
//! # Configuration
//!
//! Later sources override earlier ones:
//! 1. Built-in defaults
//! 2. Config file (~/.config/business-directory/config.toml)
//! 3. `--config` file
//! 4. Environment variables (DIRECTORY_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use directory_daemon::{run_command, start_daemon, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => start_daemon(&cli.global).await,
        command => run_command(&cli.global, command).await,
    }
}
