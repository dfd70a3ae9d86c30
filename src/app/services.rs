//! Collaborator interfaces of the cache operations
//!
//! Operations never talk to the database, the network or the filesystem
//! directly. They go through these traits, which the crate implements in
//! [`crate::app::store`], [`crate::app::client`], [`crate::app::worker`] and
//! [`crate::app::storage`], and which tests replace with in-memory doubles.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::app::cache::ContentDownload;
use crate::app::models::{
    AppInfo, Collection, FileEntry, FrontPage, Issue, IssueKey, IssuePublication, Moment, Page,
    ResourceInfo,
};
use crate::errors::{CacheResult, ConnectivityError, StoreResult};

/// Persistent metadata and download bookkeeping
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_issue(&self, key: &IssueKey) -> StoreResult<Option<Issue>>;

    /// All stored statuses of a publication
    async fn get_issues_by_publication(
        &self,
        publication: &IssuePublication,
    ) -> StoreResult<Vec<Issue>>;

    /// Insert or replace an issue and the file entries it references
    async fn save_issue(&self, issue: Issue) -> StoreResult<Issue>;

    /// Remove an issue with its sections, articles, pages and moment
    async fn delete_issue(&self, key: &IssueKey) -> StoreResult<()>;

    /// Issue containing the given article, section, page or moment
    async fn owning_issue(&self, collection: &Collection) -> StoreResult<Option<Issue>>;

    /// Moment of the issue with `key`, whether stored on its own or as part of the issue
    async fn get_moment(&self, key: &IssueKey) -> StoreResult<Option<Moment>>;

    async fn save_moment(&self, moment: Moment) -> StoreResult<Moment>;

    /// Front page of the issue with `key`, whether stored on its own or as
    /// the first page of the issue
    async fn get_front_page(&self, key: &IssueKey) -> StoreResult<Option<Page>>;

    async fn save_front_page(&self, page: Page, key: &IssueKey) -> StoreResult<Page>;

    async fn get_app_info(&self) -> StoreResult<Option<AppInfo>>;

    async fn save_app_info(&self, info: AppInfo) -> StoreResult<AppInfo>;

    async fn get_newest_resource_info(&self) -> StoreResult<Option<ResourceInfo>>;

    async fn save_resource_info(&self, info: ResourceInfo) -> StoreResult<ResourceInfo>;

    async fn get_file_entry(&self, name: &str) -> StoreResult<Option<FileEntry>>;

    async fn save_file_entry(&self, entry: FileEntry) -> StoreResult<FileEntry>;

    /// When the collection with `tag` was fully downloaded, if it is present
    async fn get_download_date(&self, tag: &str) -> StoreResult<Option<DateTime<Utc>>>;

    async fn set_download_date(&self, tag: &str, date: Option<DateTime<Utc>>) -> StoreResult<()>;

    async fn get_file_download_date(&self, name: &str) -> StoreResult<Option<DateTime<Utc>>>;

    async fn set_file_download_date(
        &self,
        name: &str,
        date: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Number of downloaded articles referencing the file
    ///
    /// Image and author image references are counted separately; the larger
    /// count is returned.
    async fn downloaded_article_references(&self, file_name: &str) -> StoreResult<usize>;
}

/// Byte transfer of file items
///
/// Implementations call `notify_start` on the operation, transfer each of its
/// file items and report every item through `notify_successful_item` or
/// `notify_failed_item`, plus `notify_bad_connection` while retrying.
#[async_trait]
pub trait FileTransport: Send + Sync {
    async fn enqueue_download(&self, operation: Arc<ContentDownload>) -> CacheResult<()>;
}

/// Mapping of file entries to local storage
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Absolute path of the file, given its assigned storage location
    fn absolute_path(&self, entry: &FileEntry) -> CacheResult<PathBuf>;

    /// Remove the file's bytes; removing a missing file succeeds
    async fn delete_file(&self, entry: &FileEntry) -> CacheResult<()>;
}

/// Remote metadata and telemetry endpoints
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// The most complete issue of a publication the client may access
    async fn get_issue_by_publication(
        &self,
        publication: &IssuePublication,
    ) -> Result<Issue, ConnectivityError>;

    /// Moment of the most complete issue of a publication the client may access
    async fn get_moment_by_publication(
        &self,
        publication: &IssuePublication,
    ) -> Result<Moment, ConnectivityError>;

    async fn get_front_page(
        &self,
        publication: &IssuePublication,
    ) -> Result<FrontPage, ConnectivityError>;

    async fn get_app_info(&self) -> Result<AppInfo, ConnectivityError>;

    async fn get_resource_info(&self) -> Result<ResourceInfo, ConnectivityError>;

    /// Report the start of an issue download, returning its download id
    async fn notify_download_start(
        &self,
        feed_name: &str,
        date: NaiveDate,
        is_automatic: bool,
    ) -> Result<String, ConnectivityError>;

    async fn notify_download_stop(
        &self,
        download_id: &str,
        seconds_taken: f64,
    ) -> Result<(), ConnectivityError>;
}
