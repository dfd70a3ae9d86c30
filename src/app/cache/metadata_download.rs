//! Resolution of a download target to stored metadata
//!
//! Issue-shaped targets, moments and front pages are fetched from the remote
//! API (or served from the store when caching is allowed and the stored status
//! is good enough) and persisted. Resource pack requests are satisfied with a
//! pack of at least the requested version. Other collections are already
//! complete and are handed back unchanged.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::context::{CacheContext, RetryPolicy};
use super::item::{CacheItem, DownloadPriority};
use super::operation::{CacheOperation, OperationCore, OperationDescriptor, OperationHandle};
use super::state::CacheState;
use crate::app::models::{
    AppInfo, Collection, DownloadTarget, Issue, IssueKey, IssuePublication, IssueStatus, Moment,
    Page, ResourceInfo,
};
use crate::app::worker::BackoffCalculator;
use crate::errors::{CacheError, CacheResult, ConnectivityError};

/// Options of a metadata download
#[derive(Debug, Clone, Copy)]
pub struct MetadataOptions {
    /// Serve stored metadata instead of asking the remote API when possible
    pub allow_cache: bool,
    pub retry: RetryPolicy,
    /// Lowest acceptable issue status
    pub min_status: IssueStatus,
}

impl MetadataOptions {
    pub fn from_settings(ctx: &CacheContext, allow_cache: bool) -> Self {
        Self {
            allow_cache,
            retry: ctx.settings.metadata_retry,
            min_status: ctx.settings.min_issue_status,
        }
    }
}

/// Downloads and persists the metadata of a target
pub struct MetadataDownload {
    core: OperationCore<DownloadTarget>,
    ctx: CacheContext,
    target: DownloadTarget,
    options: MetadataOptions,
}

impl MetadataDownload {
    /// Prepare the metadata download of `target`, registered under `tag`
    pub fn prepare(
        ctx: &CacheContext,
        target: DownloadTarget,
        tag: String,
        options: MetadataOptions,
        priority: DownloadPriority,
    ) -> Arc<Self> {
        let items = vec![CacheItem::metadata(tag.clone(), priority)];
        Arc::new_cyclic(|owner: &Weak<Self>| {
            let owner: Weak<dyn OperationHandle> = owner.clone();
            Self {
                core: OperationCore::new(
                    owner,
                    OperationDescriptor {
                        tag,
                        loading_state: CacheState::LoadingMetadata,
                        target_state: CacheState::MetadataPresent,
                        priority,
                    },
                    items,
                    ctx.registry.clone(),
                ),
                ctx: ctx.clone(),
                target,
                options,
            }
        })
    }

    pub fn target(&self) -> &DownloadTarget {
        &self.target
    }

    async fn resolve(&self) -> CacheResult<DownloadTarget> {
        match &self.target {
            DownloadTarget::IssuePublication {
                publication,
                with_pages,
            } => {
                let issue = self.issue_by_publication(publication).await?;
                Ok(Collection::issue(issue, *with_pages).into())
            }
            DownloadTarget::IssueKey { key, with_pages } => {
                let issue = self.issue_by_key(key).await?;
                Ok(Collection::issue(issue, *with_pages).into())
            }
            DownloadTarget::Collection(Collection::Issue { issue, with_pages }) => {
                let issue = self.issue_by_key(&issue.key()).await?;
                Ok(Collection::issue(issue, *with_pages).into())
            }
            DownloadTarget::Collection(_) | DownloadTarget::AppInfo(_) => Ok(self.target.clone()),
            DownloadTarget::MomentPublication(publication) => {
                Ok(Collection::Moment(self.moment_by_publication(publication).await?).into())
            }
            DownloadTarget::MomentKey(key) => {
                Ok(Collection::Moment(self.moment_by_key(key).await?).into())
            }
            DownloadTarget::FrontPagePublication(publication) => {
                Ok(Collection::Page(self.front_page_by_publication(publication).await?).into())
            }
            DownloadTarget::FrontPageKey(key) => {
                Ok(Collection::Page(self.front_page_by_key(key).await?).into())
            }
            DownloadTarget::ResourceInfoKey { min_version } => {
                let info = self.resource_info(*min_version).await?;
                Ok(Collection::ResourceInfo(info).into())
            }
            DownloadTarget::AppInfoKey => Ok(DownloadTarget::AppInfo(self.app_info().await?)),
            DownloadTarget::File(file) => Err(CacheError::IllegalArgument(format!(
                "Metadata download of single file {} is not supported",
                file.name
            ))),
        }
    }

    async fn issue_by_publication(&self, publication: &IssuePublication) -> CacheResult<Issue> {
        if self.options.allow_cache {
            if let Some(issue) = self
                .ctx
                .stored_issue(publication, self.options.min_status)
                .await?
            {
                debug!("Using stored metadata of {}", issue.key().tag());
                return Ok(issue);
            }
        }

        let issue = self
            .with_connection_retry(|| self.ctx.api.get_issue_by_publication(publication))
            .await?;
        if issue.publication() != *publication {
            return Err(CacheError::failed(format!(
                "Requested {} but received {}",
                publication.tag(),
                issue.key().tag()
            )));
        }
        self.require_min_status(publication, issue.status)?;
        Ok(self.ctx.store.save_issue(issue).await?)
    }

    async fn issue_by_key(&self, key: &IssueKey) -> CacheResult<Issue> {
        if self.options.allow_cache {
            if let Some(issue) = self.ctx.store.get_issue(key).await? {
                debug!("Using stored metadata of {}", key.tag());
                return Ok(issue);
            }
        }

        let publication = key.publication();
        let issue = self
            .with_connection_retry(|| self.ctx.api.get_issue_by_publication(&publication))
            .await?;
        if issue.key() != *key {
            return Err(CacheError::failed(format!(
                "Requested {} but received {}",
                key.tag(),
                issue.key().tag()
            )));
        }
        Ok(self.ctx.store.save_issue(issue).await?)
    }

    async fn moment_by_publication(&self, publication: &IssuePublication) -> CacheResult<Moment> {
        if self.options.allow_cache {
            if let Some(moment) = self.ctx.stored_moment(publication).await? {
                if moment.issue_status >= self.options.min_status {
                    debug!("Using stored {}", moment.tag());
                    return Ok(moment);
                }
            }
        }

        let moment = self
            .with_connection_retry(|| self.ctx.api.get_moment_by_publication(publication))
            .await?;
        self.require_min_status(publication, moment.issue_status)?;
        Ok(self.ctx.store.save_moment(moment).await?)
    }

    async fn moment_by_key(&self, key: &IssueKey) -> CacheResult<Moment> {
        if self.options.allow_cache {
            if let Some(moment) = self.ctx.store.get_moment(key).await? {
                debug!("Using stored {}", moment.tag());
                return Ok(moment);
            }
        }

        let publication = key.publication();
        let moment = self
            .with_connection_retry(|| self.ctx.api.get_moment_by_publication(&publication))
            .await?;
        if moment.issue_key() != *key {
            return Err(CacheError::failed(format!(
                "Requested the moment of {} but received {}",
                key.tag(),
                moment.issue_key().tag()
            )));
        }
        Ok(self.ctx.store.save_moment(moment).await?)
    }

    async fn front_page_by_publication(&self, publication: &IssuePublication) -> CacheResult<Page> {
        if self.options.allow_cache {
            if let Some((status, page)) = self.ctx.stored_front_page(publication).await? {
                if status >= self.options.min_status {
                    debug!("Using stored front page of {}", publication.tag());
                    return Ok(page);
                }
            }
        }

        let front_page = self
            .with_connection_retry(|| self.ctx.api.get_front_page(publication))
            .await?;
        self.require_min_status(publication, front_page.issue_status)?;
        let key = front_page.issue_key();
        Ok(self.ctx.store.save_front_page(front_page.page, &key).await?)
    }

    async fn front_page_by_key(&self, key: &IssueKey) -> CacheResult<Page> {
        if self.options.allow_cache {
            if let Some(page) = self.ctx.store.get_front_page(key).await? {
                debug!("Using stored front page of {}", key.tag());
                return Ok(page);
            }
        }

        let publication = key.publication();
        let front_page = self
            .with_connection_retry(|| self.ctx.api.get_front_page(&publication))
            .await?;
        if front_page.issue_key() != *key {
            return Err(CacheError::failed(format!(
                "Requested the front page of {} but received {}",
                key.tag(),
                front_page.issue_key().tag()
            )));
        }
        Ok(self.ctx.store.save_front_page(front_page.page, key).await?)
    }

    async fn app_info(&self) -> CacheResult<AppInfo> {
        if self.options.allow_cache {
            if let Some(info) = self.ctx.store.get_app_info().await? {
                return Ok(info);
            }
        }

        let info = self
            .with_connection_retry(|| self.ctx.api.get_app_info())
            .await?;
        Ok(self.ctx.store.save_app_info(info).await?)
    }

    fn require_min_status(
        &self,
        publication: &IssuePublication,
        status: IssueStatus,
    ) -> CacheResult<()> {
        if status < self.options.min_status {
            return Err(CacheError::failed(format!(
                "{} is only available as {}, at least {} is required",
                publication.tag(),
                status,
                self.options.min_status
            )));
        }
        Ok(())
    }

    async fn resource_info(&self, min_version: u32) -> CacheResult<ResourceInfo> {
        if self.options.allow_cache {
            if let Some(info) = self.ctx.store.get_newest_resource_info().await? {
                if info.resource_version >= min_version {
                    return Ok(info);
                }
            }
        }

        let info = self
            .with_connection_retry(|| self.ctx.api.get_resource_info())
            .await?;
        if info.resource_version < min_version {
            return Err(CacheError::failed(format!(
                "Server offers resource version {}, at least {} is required",
                info.resource_version, min_version
            )));
        }
        Ok(self.ctx.store.save_resource_info(info).await?)
    }

    /// Run `request`, retrying recoverable connectivity failures per the retry policy
    async fn with_connection_retry<T, F, Fut>(&self, mut request: F) -> CacheResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ConnectivityError>> + Send,
        T: Send,
    {
        let mut retries = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() && self.options.retry.allows(retries) => {
                    retries += 1;
                    let delay = BackoffCalculator::retry_delay(
                        retries,
                        self.ctx.settings.retry_base_delay,
                        self.ctx.settings.retry_max_delay,
                    );
                    warn!(
                        "Metadata request for {} failed ({}), retry {} in {:?}",
                        self.core.tag(),
                        e,
                        retries,
                        delay
                    );
                    self.core.notify_bad_connection().await;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl CacheOperation for MetadataDownload {
    type Output = DownloadTarget;

    fn core(&self) -> &OperationCore<DownloadTarget> {
        &self.core
    }

    async fn do_work(self: Arc<Self>) -> CacheResult<DownloadTarget> {
        self.core.notify_start().await;

        match self.resolve().await {
            Ok(target) => {
                self.core.notify_successful_item().await;
                self.core.notify_success(target.clone()).await;
                Ok(target)
            }
            Err(e) => {
                self.core.notify_failed_item(e.clone()).await;
                let error = match e {
                    CacheError::IllegalArgument(_) => e,
                    other => CacheError::failed_with(
                        format!("Metadata download of {} failed", self.core.tag()),
                        other,
                    ),
                };
                self.core.notify_failure(error.clone()).await;
                Err(error)
            }
        }
    }
}
