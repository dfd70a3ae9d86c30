//! Complete download of a target: metadata, resources and content
//!
//! A wrapped download first makes the target's metadata present, then works
//! out which collections the target consists of, adds the resource pack when
//! the stored one is too old for it, and downloads every collection that is
//! not present yet concurrently. The wrapper registers under
//! `parent/<tag>` so the nested metadata download can use the target's own
//! tag.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info};

use super::content_download::ContentDownload;
use super::context::CacheContext;
use super::item::{CacheItem, DownloadPriority};
use super::metadata_download::{MetadataDownload, MetadataOptions};
use super::notifier::IssueDownloadNotifier;
use super::operation::{CacheOperation, OperationCore, OperationDescriptor, OperationHandle};
use super::state::CacheState;
use crate::app::models::{Collection, DownloadTarget};
use crate::constants::tags;
use crate::errors::{CacheError, CacheResult};

/// Tag a wrapped download of `tag` registers under
pub fn parent_tag(tag: &str) -> String {
    format!("{}{}", tags::PARENT_PREFIX, tag)
}

/// Downloads a target together with everything it depends on
pub struct WrappedDownload {
    core: OperationCore<()>,
    ctx: CacheContext,
    target: DownloadTarget,
    is_automatic: bool,
    allow_cache: bool,
}

impl WrappedDownload {
    /// Prepare the complete download of `target`
    ///
    /// # Arguments
    ///
    /// * `is_automatic` - reported with the download telemetry of issues
    /// * `allow_cache` - succeed at once if the target is present, and serve
    ///   metadata from the store where possible
    ///
    /// # Errors
    ///
    /// Returns `CacheError::IllegalArgument` for issue key targets, since
    /// issues are downloaded by publication, and for app info targets, which
    /// own no files
    pub fn prepare(
        ctx: &CacheContext,
        target: DownloadTarget,
        priority: DownloadPriority,
        is_automatic: bool,
        allow_cache: bool,
    ) -> CacheResult<Arc<Self>> {
        match &target {
            DownloadTarget::IssueKey { key, .. } => {
                return Err(CacheError::IllegalArgument(format!(
                    "Issues are downloaded by publication, not by key {}",
                    key.tag()
                )))
            }
            DownloadTarget::AppInfoKey | DownloadTarget::AppInfo(_) => {
                return Err(CacheError::IllegalArgument(
                    "App info has no content to download".to_string(),
                ))
            }
            _ => {}
        }

        let tag = parent_tag(&target.download_tag());
        Ok(Arc::new_cyclic(|owner: &Weak<Self>| {
            let owner: Weak<dyn OperationHandle> = owner.clone();
            Self {
                core: OperationCore::new(
                    owner,
                    OperationDescriptor {
                        tag,
                        loading_state: CacheState::LoadingContent,
                        target_state: CacheState::Present,
                        priority,
                    },
                    Vec::new(),
                    ctx.registry.clone(),
                ),
                ctx: ctx.clone(),
                target,
                is_automatic,
                allow_cache,
            }
        }))
    }

    pub fn target(&self) -> &DownloadTarget {
        &self.target
    }

    /// Fail the operation with `error` wrapped under this operation's tag
    async fn fail(&self, error: CacheError) -> CacheResult<()> {
        let error = CacheError::failed_with(
            format!("Download of {} failed", self.target.download_tag()),
            error,
        );
        self.core.notify_failure(error.clone()).await;
        Err(error)
    }

    async fn download_metadata(&self) -> CacheResult<Collection> {
        let metadata = MetadataDownload::prepare(
            &self.ctx,
            self.target.clone(),
            self.target.download_tag(),
            MetadataOptions::from_settings(&self.ctx, self.allow_cache),
            self.core.priority(),
        );
        self.core
            .add_item(CacheItem::sub_operation(metadata.clone()))
            .await?;

        match metadata.execute(false).await {
            Ok(DownloadTarget::Collection(collection)) => {
                self.core.notify_successful_item().await;
                Ok(collection)
            }
            Ok(other) => {
                let error = CacheError::IllegalState(format!(
                    "Metadata download resolved {} to a non-collection target",
                    other.download_tag()
                ));
                self.core.notify_failed_item(error.clone()).await;
                Err(error)
            }
            Err(e) => {
                self.core.notify_failed_item(e.clone()).await;
                Err(e)
            }
        }
    }

    /// Resource pack the parent needs, fetching a newer one if the stored one is too old
    async fn required_resources(&self, parent: &Collection) -> CacheResult<Option<Collection>> {
        let min_version = match parent {
            Collection::Issue { issue, .. } => issue.min_resource_version,
            Collection::Article(_) | Collection::Section(_) => self
                .ctx
                .store
                .owning_issue(parent)
                .await?
                .map_or(0, |issue| issue.min_resource_version),
            _ => return Ok(None),
        };

        if let Some(info) = self.ctx.store.get_newest_resource_info().await? {
            if info.resource_version >= min_version {
                return Ok(Some(Collection::ResourceInfo(info)));
            }
        }

        debug!("Resource version {} required, fetching", min_version);
        let target = DownloadTarget::ResourceInfoKey { min_version };
        let tag = target.download_tag();
        let fetched = MetadataDownload::prepare(
            &self.ctx,
            target,
            tag,
            MetadataOptions::from_settings(&self.ctx, false),
            self.core.priority(),
        )
        .execute(false)
        .await?;

        match fetched {
            DownloadTarget::Collection(collection @ Collection::ResourceInfo(_)) => {
                Ok(Some(collection))
            }
            other => Err(CacheError::IllegalState(format!(
                "Resource request resolved to {}",
                other.download_tag()
            ))),
        }
    }

    /// Collections the parent consists of, resource pack first
    async fn dependents(&self, parent: &Collection) -> CacheResult<Vec<Collection>> {
        let mut dependents = Vec::new();
        if let Some(resources) = self.required_resources(parent).await? {
            dependents.push(resources);
        }

        match parent {
            Collection::Issue { issue, with_pages } => {
                dependents.extend(issue.imprint.iter().cloned().map(Collection::Article));
                for section in &issue.section_list {
                    dependents.push(Collection::Section(section.clone()));
                    dependents.extend(section.article_list.iter().cloned().map(Collection::Article));
                }
                dependents.push(Collection::Moment(issue.moment.clone()));
                if *with_pages {
                    dependents.extend(issue.page_list.iter().cloned().map(Collection::Page));
                }
            }
            single => dependents.push(single.clone()),
        }

        let mut seen = HashSet::new();
        let mut pending = Vec::with_capacity(dependents.len());
        for collection in dependents {
            if !seen.insert(collection.download_tag()) {
                continue;
            }
            if self.ctx.is_downloaded(&collection).await? {
                debug!("{} already downloaded", collection.download_tag());
            } else {
                pending.push(collection);
            }
        }
        Ok(pending)
    }

    async fn download_content(&self, collections: Vec<Collection>) -> CacheResult<usize> {
        let priority = self.core.priority();
        let mut downloads = Vec::with_capacity(collections.len());
        for collection in collections {
            downloads.push(ContentDownload::prepare(&self.ctx, collection, priority).await?);
        }
        self.core
            .add_items(
                downloads
                    .iter()
                    .map(|download| CacheItem::sub_operation(download.clone()))
                    .collect(),
            )
            .await?;

        let outcomes = join_all(downloads.into_iter().map(|download| async move {
            match download.execute(false).await {
                Ok(()) => {
                    self.core.notify_successful_item().await;
                    true
                }
                Err(e) => {
                    self.core.notify_failed_item(e).await;
                    false
                }
            }
        }))
        .await;

        Ok(outcomes.into_iter().filter(|succeeded| !succeeded).count())
    }
}

#[async_trait]
impl CacheOperation for WrappedDownload {
    type Output = ();

    fn core(&self) -> &OperationCore<()> {
        &self.core
    }

    async fn do_work(self: Arc<Self>) -> CacheResult<()> {
        self.core.notify_start().await;

        if self.allow_cache && self.ctx.is_present(&self.target).await? {
            debug!("{} is already present", self.target.download_tag());
            self.core.notify_success(()).await;
            return Ok(());
        }

        let parent = match self.download_metadata().await {
            Ok(parent) => parent,
            Err(e) => return self.fail(e).await,
        };

        let dependents = match self.dependents(&parent).await {
            Ok(dependents) => dependents,
            Err(e) => return self.fail(e).await,
        };

        let mut notifier = match &parent {
            Collection::Issue { issue, .. } => Some(IssueDownloadNotifier::new(
                self.ctx.api.clone(),
                issue.key(),
                self.is_automatic,
            )),
            _ => None,
        };
        if let Some(notifier) = notifier.as_mut() {
            notifier.start().await;
        }

        let downloaded = self.download_content(dependents).await;

        if let Some(notifier) = notifier.as_mut() {
            notifier.stop().await;
        }

        match downloaded {
            Ok(0) => {}
            Ok(failed) => {
                return self
                    .fail(CacheError::failed(format!(
                        "{} sub operations of {} failed",
                        failed,
                        self.core.tag()
                    )))
                    .await
            }
            Err(e) => return self.fail(e).await,
        }

        if let Err(e) = self.ctx.set_downloaded(&parent, Some(Utc::now())).await {
            return self.fail(e).await;
        }
        info!("{} is present", parent.download_tag());
        self.core.notify_success(()).await;
        Ok(())
    }
}
