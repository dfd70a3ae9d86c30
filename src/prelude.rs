//! Prelude module for the issue cache
//!
//! Re-exports the items needed for typical usage with a single
//! `use issue_cache::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use issue_cache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let service = ContentService::from_config(&config).await?;
//!     let _events = service.subscribe();
//!     // Continue with downloads...
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, CacheError, CacheResult, Result};

// Entry points
pub use crate::app::{ContentService, OperationRegistry, StatusEvent};
pub use crate::config::AppConfig;

// Operations and their states
pub use crate::app::cache::{
    CacheOperation, CacheState, CacheStateUpdate, DownloadPriority, RetryPolicy, UpdateType,
};

// Data types
pub use crate::app::models::{
    AppInfo, Collection, DownloadTarget, FileEntry, Issue, IssueKey, IssuePublication, IssueStatus,
};
