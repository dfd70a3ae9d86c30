//! Command-line argument parsing for the issue cache
//!
//! This module defines the CLI structure using clap derive macros: issue
//! downloads, metadata refreshes, deletion, status queries and single file
//! downloads.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::app::cache::DownloadPriority;
use crate::app::models::{IssuePublication, IssueStatus};

/// Issue cache - keep periodical issues available offline
#[derive(Parser, Debug)]
#[command(
    name = "issue_cache",
    version,
    about = "Download periodical issues and their resources into a local cache",
    long_about = "Downloads issues with their articles, pages and shared resources into local storage.
Every download and deletion is deduplicated per issue and reports its progress while it runs."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress progress and non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Storage root, overriding the configuration
    #[arg(long, global = true, value_name = "DIR")]
    pub storage_root: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download an issue with everything needed to read it
    Download(DownloadArgs),

    /// Make sure the metadata of an issue is stored
    Metadata(MetadataArgs),

    /// Delete an issue, its pages and its metadata
    Delete(IssueArgs),

    /// Show the cache state of an issue
    Status(StatusArgs),

    /// Download a single file unless it is already downloaded
    File(FileArgs),
}

/// Feed and date identifying an issue
#[derive(Args, Debug, Clone)]
pub struct IssueArgs {
    /// Feed name (e.g. "taz")
    #[arg(value_name = "FEED")]
    pub feed: String,

    /// Issue date (YYYY-MM-DD)
    #[arg(value_name = "DATE")]
    pub date: NaiveDate,
}

impl IssueArgs {
    pub fn publication(&self) -> IssuePublication {
        IssuePublication::new(self.feed.clone(), self.date)
    }
}

/// Arguments for the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub issue: IssueArgs,

    /// Download the PDF pages as well
    #[arg(short, long)]
    pub pages: bool,

    /// Report the download as automatic rather than user initiated
    #[arg(long)]
    pub automatic: bool,

    /// Ask the server for metadata even if it is stored
    #[arg(long)]
    pub refresh: bool,

    /// Transfer priority of the issue's files
    #[arg(long, value_enum, default_value = "normal")]
    pub priority: PriorityArg,
}

/// Arguments for the metadata command
#[derive(Args, Debug, Clone)]
pub struct MetadataArgs {
    #[command(flatten)]
    pub issue: IssueArgs,

    /// Lowest acceptable issue status (public, demo, regular)
    #[arg(long, value_name = "STATUS")]
    pub min_status: Option<IssueStatus>,

    /// Number of retries after connection failures (default: configured)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Start a new request even if the same one is running
    #[arg(short, long)]
    pub force: bool,

    /// Ask the server even if the metadata is stored
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for the status command
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub issue: IssueArgs,

    /// Ask for the issue including its PDF pages
    #[arg(short, long)]
    pub pages: bool,
}

/// Arguments for the file command
#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// File name, unique across all content
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Base URL the file is served from
    #[arg(value_name = "BASE_URL")]
    pub base_url: String,

    /// Folder below the storage location
    #[arg(long, default_value = "")]
    pub folder: String,

    /// Expected sha256 of the content (hex)
    #[arg(long, default_value = "")]
    pub sha256: String,

    /// Transfer priority
    #[arg(long, value_enum, default_value = "high")]
    pub priority: PriorityArg,
}

/// Transfer priority as given on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
}

impl From<PriorityArg> for DownloadPriority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Low => DownloadPriority::Low,
            PriorityArg::Normal => DownloadPriority::Normal,
            PriorityArg::High => DownloadPriority::High,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level requested on the command line, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}
