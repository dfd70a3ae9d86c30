//! Command-line interface components
//!
//! This module contains CLI-specific code for the issue cache application:
//! argument parsing, command handlers and the progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    Cli, Commands, DownloadArgs, FileArgs, GlobalArgs, IssueArgs, MetadataArgs, PriorityArg,
    StatusArgs,
};
pub use commands::{handle_delete, handle_download, handle_file, handle_metadata, handle_status};
pub use progress::{ProgressDisplay, ProgressTotals};
