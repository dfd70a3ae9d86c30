//! Deduplicated, observable cache operations
//!
//! Every download or deletion of content or metadata runs as a cache
//! operation. Operations are identified by a tag; the
//! [`OperationRegistry`] makes sure at most one operation per tag is active,
//! lets callers join an equal operation that is already running and makes
//! different operations on the same tag run one after the other.
//!
//! # Module Organization
//!
//! - [`item`] - work items and their dynamic priority
//! - [`state`] - cache states and the snapshots operations publish
//! - [`registry`] - active operations by tag, and the status event stream
//! - [`operation`] - the engine: notify protocol, deduplication, waiting
//! - [`context`] - collaborators and settings shared by all operations
//! - [`content_download`], [`content_deletion`] - files of a collection
//! - [`metadata_download`], [`metadata_deletion`] - stored metadata
//! - [`wrapped_download`] - metadata, resources and content in one go
//! - [`issue_deletion`] - everything stored for a publication
//! - [`notifier`] - download telemetry for issues
//!
//! # Examples
//!
//! ```rust,no_run
//! use issue_cache::app::cache::{CacheContext, CacheOperation, DownloadPriority, WrappedDownload};
//! use issue_cache::app::models::{DownloadTarget, IssuePublication};
//! use chrono::NaiveDate;
//!
//! # async fn example(ctx: CacheContext) -> issue_cache::errors::CacheResult<()> {
//! let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
//! let target = DownloadTarget::IssuePublication {
//!     publication: IssuePublication::new("taz", date),
//!     with_pages: false,
//! };
//! let download = WrappedDownload::prepare(&ctx, target, DownloadPriority::High, false, true)?;
//! download.execute(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod content_deletion;
pub mod content_download;
pub mod context;
pub mod issue_deletion;
pub mod item;
pub mod metadata_deletion;
pub mod metadata_download;
pub mod notifier;
pub mod operation;
pub mod registry;
pub mod state;
pub mod wrapped_download;

#[cfg(test)]
pub(crate) mod tests;

// Re-export main public API
pub use content_deletion::ContentDeletion;
pub use content_download::ContentDownload;
pub use context::{CacheContext, CacheSettings, RetryPolicy};
pub use issue_deletion::IssueDeletion;
pub use item::{CacheItem, CacheItemKind, CacheOperationItem, DownloadPriority, FileEntryOperation};
pub use metadata_deletion::MetadataDeletion;
pub use metadata_download::{MetadataDownload, MetadataOptions};
pub use notifier::IssueDownloadNotifier;
pub use operation::{
    wait_until_complete, CacheOperation, OperationCore, OperationDescriptor, OperationHandle,
};
pub use registry::{ClaimStatus, OperationRegistry, StatusEvent};
pub use state::{CacheState, CacheStateUpdate, UpdateType};
pub use wrapped_download::{parent_tag, WrappedDownload};
