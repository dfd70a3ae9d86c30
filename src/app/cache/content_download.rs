//! Download of all files of a collection
//!
//! The operation hands itself to the [`FileTransport`](crate::app::services::FileTransport),
//! which reports every file through the notify protocol. Once every file
//! reached a final state the operation stamps the collection as downloaded
//! and only then publishes its success, so any caller seeing the result also
//! sees the collection as present.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::context::CacheContext;
use super::item::{CacheItem, DownloadPriority, FileEntryOperation};
use super::operation::{CacheOperation, OperationCore, OperationDescriptor, OperationHandle};
use super::state::CacheState;
use crate::app::models::{Collection, FileEntry, StorageType};
use crate::errors::{CacheError, CacheResult, StorageError};

/// Downloads the files of a collection, or a single file
pub struct ContentDownload {
    core: OperationCore<()>,
    ctx: CacheContext,
    collection: Option<Collection>,
}

impl ContentDownload {
    /// Prepare the download of every file of `collection`
    ///
    /// Each file is re-persisted with the configured storage location, and
    /// gets its absolute destination and its origin URL resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails or a file's base URL or
    /// destination cannot be resolved
    pub async fn prepare(
        ctx: &CacheContext,
        collection: Collection,
        priority: DownloadPriority,
    ) -> CacheResult<Arc<Self>> {
        let tag = collection.download_tag();
        let mut resolver = BaseUrlResolver::new(ctx, &collection);
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for file in collection.all_files() {
            if !seen.insert(file.name.clone()) {
                continue;
            }
            let base_url = resolver.base_url(&file).await?;
            items.push(Self::file_item(ctx, file, &base_url, priority).await?);
        }

        debug!("Prepared download of {} with {} files", tag, items.len());
        Ok(Self::new(ctx, tag, Some(collection), items, priority))
    }

    /// Prepare the download of one file from `base_url`
    pub async fn prepare_single_file(
        ctx: &CacheContext,
        file: FileEntry,
        base_url: &str,
        priority: DownloadPriority,
    ) -> CacheResult<Arc<Self>> {
        let tag = file.name.clone();
        let item = Self::file_item(ctx, file, base_url, priority).await?;
        Ok(Self::new(ctx, tag, None, vec![item], priority))
    }

    fn new(
        ctx: &CacheContext,
        tag: String,
        collection: Option<Collection>,
        items: Vec<CacheItem>,
        priority: DownloadPriority,
    ) -> Arc<Self> {
        Arc::new_cyclic(|owner: &Weak<Self>| {
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
                    items,
                    ctx.registry.clone(),
                ),
                ctx: ctx.clone(),
                collection,
            }
        })
    }

    async fn file_item(
        ctx: &CacheContext,
        mut file: FileEntry,
        base_url: &str,
        priority: DownloadPriority,
    ) -> CacheResult<CacheItem> {
        file.storage_location = Some(ctx.settings.storage_location);
        let file = ctx.store.save_file_entry(file).await?;
        let destination = ctx.storage.absolute_path(&file)?;
        let origin = format!("{}/{}", base_url.trim_end_matches('/'), file.name);
        Ok(CacheItem::file(
            FileEntryOperation::new(file, Some(destination), Some(origin)),
            priority,
        ))
    }

    /// The collection being downloaded; `None` for a single file
    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }
}

#[async_trait]
impl CacheOperation for ContentDownload {
    type Output = ();

    fn core(&self) -> &OperationCore<()> {
        &self.core
    }

    async fn do_work(self: Arc<Self>) -> CacheResult<()> {
        self.ctx.transport.enqueue_download(self.clone()).await?;

        let state = self.core.wait_for_items().await;
        if state.has_completed() {
            return self.core.wait_on_completion().await;
        }

        let failed = self.core.failed_count().await;
        if failed > 0 {
            let error = CacheError::failed(format!(
                "{} of {} files of {} could not be downloaded",
                failed,
                state.total_items,
                self.core.tag()
            ));
            self.core.notify_failure(error.clone()).await;
            return Err(error);
        }

        if let Some(collection) = &self.collection {
            self.ctx.set_downloaded(collection, Some(Utc::now())).await?;
        }
        info!(
            "Downloaded {} ({} files)",
            self.core.tag(),
            state.total_items
        );
        self.core.notify_success(()).await;
        Ok(())
    }
}

/// Resolves base URLs by storage type, looking up the owning issue at most once
struct BaseUrlResolver<'a> {
    ctx: &'a CacheContext,
    collection: &'a Collection,
    issue_base_url: Option<String>,
    resource_base_url: Option<String>,
}

impl<'a> BaseUrlResolver<'a> {
    fn new(ctx: &'a CacheContext, collection: &'a Collection) -> Self {
        Self {
            ctx,
            collection,
            issue_base_url: None,
            resource_base_url: None,
        }
    }

    async fn base_url(&mut self, file: &FileEntry) -> CacheResult<String> {
        match file.storage_type {
            StorageType::Global => Ok(self.ctx.settings.global_base_url.clone()),
            StorageType::Issue => {
                if self.issue_base_url.is_none() {
                    self.issue_base_url = Some(self.issue_base_url_of(file).await?);
                }
                Ok(self.issue_base_url.clone().unwrap_or_default())
            }
            StorageType::Resource => {
                if self.resource_base_url.is_none() {
                    self.resource_base_url = Some(self.resource_base_url_of(file).await?);
                }
                Ok(self.resource_base_url.clone().unwrap_or_default())
            }
        }
    }

    async fn issue_base_url_of(&self, file: &FileEntry) -> CacheResult<String> {
        let own_base_url = match self.collection {
            Collection::Issue { issue, .. } => Some(&issue.base_url),
            Collection::Moment(moment) => Some(&moment.base_url),
            Collection::Page(page) => Some(&page.base_url),
            _ => None,
        };
        if let Some(base_url) = own_base_url.filter(|url| !url.is_empty()) {
            return Ok(base_url.clone());
        }
        match self.ctx.store.owning_issue(self.collection).await? {
            Some(issue) => Ok(issue.base_url),
            None => Err(unresolvable(file, "owning issue is not stored")),
        }
    }

    async fn resource_base_url_of(&self, file: &FileEntry) -> CacheResult<String> {
        if let Collection::ResourceInfo(info) = self.collection {
            return Ok(info.resource_base_url.clone());
        }
        match self.ctx.store.get_newest_resource_info().await? {
            Some(info) => Ok(info.resource_base_url),
            None => Err(unresolvable(file, "no resource info is stored")),
        }
    }
}

fn unresolvable(file: &FileEntry, reason: &str) -> CacheError {
    StorageError::Unresolvable {
        name: file.name.clone(),
        reason: format!("base URL unknown, {}", reason),
    }
    .into()
}
