//! CLI argument parsing for the directory daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Args, Parser, Subcommand};

/// Business Directory Daemon
///
/// Keeps a full-text directory of participant business cards in sync with
/// their metadata publishers.
#[derive(Parser, Debug)]
#[command(name = "directory-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to config file (in addition to ~/.config/business-directory/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override RocksDB path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    /// Override search index path
    #[arg(long, global = true)]
    pub index_path: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the indexer and its scheduled jobs until interrupted
    Start,

    /// Index or re-index a participant
    Put {
        /// Participant id, canonical or percent-encoded
        participant: String,

        #[arg(long, default_value = "cli")]
        owner: String,

        #[arg(long, default_value = "localhost")]
        host: String,
    },

    /// Tombstone a participant
    Delete {
        participant: String,

        #[arg(long, default_value = "cli")]
        owner: String,

        #[arg(long, default_value = "localhost")]
        host: String,
    },

    /// Check whether a participant has live documents
    Exists { participant: String },

    /// Search the directory
    Search {
        /// Query, e.g. `acme country:AT -geo:vienna`
        query: String,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Include tombstoned documents
        #[arg(long)]
        include_deleted: bool,
    },

    /// List retry ledger entries
    Ledger,

    /// List permanently failed work items
    DeadLetter,

    /// Queue a dead letter again
    Requeue {
        /// Dead letter (ledger entry) id
        id: String,

        #[arg(long, default_value = "cli")]
        owner: String,

        #[arg(long, default_value = "localhost")]
        host: String,
    },

    /// Queue a SYNC for every indexed participant
    Resync,

    /// Run one retry sweep now
    Sweep,

    /// Show queue, ledger and index statistics
    Stats,
}
