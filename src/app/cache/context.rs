//! Collaborators and settings shared by all cache operations

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::registry::OperationRegistry;
use crate::app::models::{
    Collection, DownloadTarget, Issue, IssueKey, IssuePublication, IssueStatus, Moment, Page,
    StorageLocation,
};
use crate::app::services::{FileTransport, MetadataStore, RemoteApi, StorageService};
use crate::constants::transport;
use crate::errors::CacheResult;

/// How often a request failing with a recoverable connectivity error is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Never,
    Limited(u32),
    Indefinitely,
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `retries` retries
    pub fn allows(&self, retries: u32) -> bool {
        match self {
            RetryPolicy::Never => false,
            RetryPolicy::Limited(max) => retries < *max,
            RetryPolicy::Indefinitely => true,
        }
    }
}

/// Settings the operations read at preparation and run time
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Storage area newly downloaded files are assigned to
    pub storage_location: StorageLocation,
    /// Base URL of files shared between issues
    pub global_base_url: String,
    /// Lowest issue status a metadata download accepts
    pub min_issue_status: IssueStatus,
    /// Retry behavior of metadata requests issued by wrapped downloads
    pub metadata_retry: RetryPolicy,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            storage_location: StorageLocation::Internal,
            global_base_url: String::new(),
            min_issue_status: IssueStatus::Public,
            metadata_retry: RetryPolicy::Indefinitely,
            retry_base_delay: transport::RETRY_BASE_DELAY,
            retry_max_delay: transport::RETRY_MAX_DELAY,
        }
    }
}

impl CacheSettings {
    /// Settings with short retry delays and bounded retries for tests
    pub fn for_testing() -> Self {
        Self {
            global_base_url: "https://cdn.example.test/global".to_string(),
            metadata_retry: RetryPolicy::Limited(2),
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(5),
            ..Self::default()
        }
    }
}

/// Everything an operation needs besides its own arguments
#[derive(Clone)]
pub struct CacheContext {
    pub store: Arc<dyn MetadataStore>,
    pub transport: Arc<dyn FileTransport>,
    pub storage: Arc<dyn StorageService>,
    pub api: Arc<dyn RemoteApi>,
    pub registry: Arc<OperationRegistry>,
    pub settings: CacheSettings,
}

impl CacheContext {
    pub async fn is_downloaded(&self, collection: &Collection) -> CacheResult<bool> {
        Ok(self
            .store
            .get_download_date(&collection.download_tag())
            .await?
            .is_some())
    }

    /// Stamp or clear the collection's download date
    pub async fn set_downloaded(
        &self,
        collection: &Collection,
        date: Option<DateTime<Utc>>,
    ) -> CacheResult<()> {
        self.store
            .set_download_date(&collection.download_tag(), date)
            .await?;
        Ok(())
    }

    /// Most complete stored issue of a publication with at least `min_status`
    pub async fn stored_issue(
        &self,
        publication: &IssuePublication,
        min_status: IssueStatus,
    ) -> CacheResult<Option<Issue>> {
        let issues = self.store.get_issues_by_publication(publication).await?;
        Ok(issues
            .into_iter()
            .filter(|issue| issue.status >= min_status)
            .max_by_key(|issue| issue.status))
    }

    /// Moment of the most complete stored status of a publication
    pub async fn stored_moment(
        &self,
        publication: &IssuePublication,
    ) -> CacheResult<Option<Moment>> {
        for status in IssueStatus::DESCENDING {
            let key = IssueKey::new(publication.feed_name.clone(), publication.date, status);
            if let Some(moment) = self.store.get_moment(&key).await? {
                return Ok(Some(moment));
            }
        }
        Ok(None)
    }

    /// Front page of the most complete stored status of a publication, with that status
    pub async fn stored_front_page(
        &self,
        publication: &IssuePublication,
    ) -> CacheResult<Option<(IssueStatus, Page)>> {
        for status in IssueStatus::DESCENDING {
            let key = IssueKey::new(publication.feed_name.clone(), publication.date, status);
            if let Some(page) = self.store.get_front_page(&key).await? {
                return Ok(Some((status, page)));
            }
        }
        Ok(None)
    }

    /// Whether the target's content is fully present in the cache
    pub async fn is_present(&self, target: &DownloadTarget) -> CacheResult<bool> {
        match target {
            DownloadTarget::IssuePublication {
                publication,
                with_pages,
            } => match self
                .stored_issue(publication, self.settings.min_issue_status)
                .await?
            {
                Some(issue) => self.is_downloaded(&Collection::issue(issue, *with_pages)).await,
                None => Ok(false),
            },
            DownloadTarget::IssueKey { .. }
            | DownloadTarget::MomentKey(_)
            | DownloadTarget::Collection(_) => Ok(self
                .store
                .get_download_date(&target.download_tag())
                .await?
                .is_some()),
            DownloadTarget::MomentPublication(publication) => {
                match self.stored_moment(publication).await? {
                    Some(moment) if moment.issue_status >= self.settings.min_issue_status => {
                        self.is_downloaded(&Collection::Moment(moment)).await
                    }
                    _ => Ok(false),
                }
            }
            DownloadTarget::FrontPagePublication(publication) => {
                match self.stored_front_page(publication).await? {
                    Some((status, page)) if status >= self.settings.min_issue_status => {
                        self.is_downloaded(&Collection::Page(page)).await
                    }
                    _ => Ok(false),
                }
            }
            DownloadTarget::FrontPageKey(key) => match self.store.get_front_page(key).await? {
                Some(page) => self.is_downloaded(&Collection::Page(page)).await,
                None => Ok(false),
            },
            DownloadTarget::AppInfoKey | DownloadTarget::AppInfo(_) => {
                Ok(self.store.get_app_info().await?.is_some())
            }
            DownloadTarget::ResourceInfoKey { min_version } => {
                match self.store.get_newest_resource_info().await? {
                    Some(info) if info.resource_version >= *min_version => {
                        self.is_downloaded(&Collection::ResourceInfo(info)).await
                    }
                    _ => Ok(false),
                }
            }
            DownloadTarget::File(file) => Ok(self
                .store
                .get_file_download_date(&file.name)
                .await?
                .is_some()),
        }
    }
}
