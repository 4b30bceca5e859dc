//! Business directory daemon library exports.
//!
//! - `cli`: command-line parsing with clap
//! - `commands`: daemon startup and the operator commands

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, GlobalArgs};
pub use commands::{load_settings, run_command, start_daemon, Runtime};
