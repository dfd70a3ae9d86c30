//! File transfer system
//!
//! This module implements the production [`FileTransport`](crate::app::services::FileTransport).
//! Content downloads hand their file items to the [`FileDownloader`], which
//! feeds them through the shared [`TransferQueue`](crate::app::queue::TransferQueue)
//! to a pool of [`TransferAgent`]s.
//!
//! # Key Features
//!
//! - **Shared transfers**: a file requested by several operations is fetched once
//! - **Dynamic priority**: agents always take the most urgent file
//! - **Connection retries**: recoverable failures are retried with exponential
//!   backoff and reported to the waiting operations as bad connection updates
//! - **Atomic writes**: files stream to a temporary file that is renamed into place
//!
//! # Module Organization
//!
//! - [`config`] - downloader configuration with validation
//! - [`types`] - transfer counters
//! - [`backoff`] - retry delays
//! - [`core`] - a single agent and its download logic
//! - [`pool`] - the downloader owning the queue and the agents
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use issue_cache::app::store::MemoryMetadataStore;
//! use issue_cache::app::worker::{FileDownloader, TransportConfig};
//!
//! # fn example() -> issue_cache::errors::CacheResult<()> {
//! let store = Arc::new(MemoryMetadataStore::new());
//! let downloader = Arc::new(FileDownloader::new(TransportConfig::default(), store)?);
//! println!("{} files downloaded", downloader.stats().files_downloaded);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod core;
pub mod pool;
pub mod types;

#[cfg(test)]
mod tests;

pub use backoff::BackoffCalculator;
pub use config::TransportConfig;
pub use core::TransferAgent;
pub use pool::FileDownloader;
pub use types::{TransferStats, TransferSummary};
