//! Entry point for callers of the cache
//!
//! [`ContentService`] wraps the cache operations behind the calls an
//! application makes: download something with everything it needs, make sure
//! metadata is present, delete an issue, and observe what is going on.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::app::cache::{
    parent_tag, CacheContext, CacheOperation, CacheSettings, CacheState, ContentDownload,
    DownloadPriority, IssueDeletion, MetadataDownload, MetadataOptions, OperationRegistry,
    RetryPolicy, StatusEvent, WrappedDownload,
};
use crate::app::client::HttpApiClient;
use crate::app::models::{Collection, DownloadTarget, FileEntry, IssuePublication, IssueStatus};
use crate::app::storage::FsStorageService;
use crate::app::store::MemoryMetadataStore;
use crate::app::worker::FileDownloader;
use crate::config::AppConfig;
use crate::constants::storage;
use crate::errors::{AppError, CacheError, CacheResult};

/// Facade over the cache operations
#[derive(Clone)]
pub struct ContentService {
    ctx: CacheContext,
    pdf_additionally: bool,
}

impl ContentService {
    pub fn new(ctx: CacheContext, pdf_additionally: bool) -> Self {
        Self {
            ctx,
            pdf_additionally,
        }
    }

    /// Wire the production collaborators described by `config`
    ///
    /// Metadata is kept in a JSON snapshot below the storage root.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or a component's
    /// configuration is invalid
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let root = config.storage_root();
        let store = MemoryMetadataStore::open(root.join(storage::METADATA_FILE))
            .await
            .map_err(CacheError::from)?;
        let store = Arc::new(store);
        let transport = Arc::new(FileDownloader::new(config.transport_config(), store.clone())?);
        let api = Arc::new(HttpApiClient::new(&config.api_config())?);
        info!("Using storage root {}", root.display());

        let ctx = CacheContext {
            store,
            transport,
            storage: Arc::new(FsStorageService::new(root)),
            api,
            registry: Arc::new(OperationRegistry::new(config.cache.status_channel_capacity)),
            settings: config.cache_settings(),
        };
        Ok(Self::new(ctx, config.cache.pdf_additionally))
    }

    pub fn context(&self) -> &CacheContext {
        &self.ctx
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.ctx.settings
    }

    /// Download `target` with its metadata and resources
    ///
    /// The wrapped download registers under `parent/{tag}`, so a content
    /// download of the same collection can run underneath it.
    pub async fn download_to_cache(
        &self,
        target: DownloadTarget,
        priority: DownloadPriority,
        is_automatic: bool,
        allow_cache: bool,
    ) -> CacheResult<()> {
        debug!("Requested download of {}", parent_tag(&target.download_tag()));
        WrappedDownload::prepare(&self.ctx, target, priority, is_automatic, allow_cache)?
            .execute(false)
            .await
    }

    /// Download an issue of a publication, with its pages if configured
    pub async fn download_issue_publication_to_cache(
        &self,
        publication: IssuePublication,
        priority: DownloadPriority,
        is_automatic: bool,
    ) -> CacheResult<()> {
        let target = DownloadTarget::IssuePublication {
            publication,
            with_pages: self.pdf_additionally,
        };
        self.download_to_cache(target, priority, is_automatic, true)
            .await
    }

    /// Make sure the metadata of `target` is stored
    ///
    /// # Returns
    ///
    /// The target resolved to its loaded collection, or to the loaded app info
    pub async fn download_metadata(
        &self,
        target: DownloadTarget,
        retry: RetryPolicy,
        force_execution: bool,
        min_status: IssueStatus,
        allow_cache: bool,
    ) -> CacheResult<DownloadTarget> {
        let options = MetadataOptions {
            allow_cache,
            retry,
            min_status,
        };
        let tag = target.download_tag();
        MetadataDownload::prepare(&self.ctx, target, tag, options, DownloadPriority::Normal)
            .execute(force_execution)
            .await
    }

    /// Download one file from `base_url` unless it is already downloaded
    pub async fn download_single_file_if_not_downloaded(
        &self,
        file: FileEntry,
        base_url: &str,
        priority: DownloadPriority,
    ) -> CacheResult<()> {
        if self
            .ctx
            .store
            .get_file_download_date(&file.name)
            .await?
            .is_some()
        {
            debug!("{} is already downloaded", file.name);
            return Ok(());
        }
        ContentDownload::prepare_single_file(&self.ctx, file, base_url, priority)
            .await?
            .execute(false)
            .await
    }

    /// Delete everything stored for a publication, pages included
    pub async fn delete_issue(&self, publication: IssuePublication) -> CacheResult<()> {
        IssueDeletion::prepare(&self.ctx, publication)
            .execute(false)
            .await
    }

    pub async fn is_present(&self, target: &DownloadTarget) -> CacheResult<bool> {
        self.ctx.is_present(target).await
    }

    /// Current state of `target`
    ///
    /// An operation running on the target's tag reports its own state;
    /// otherwise the state is derived from what is stored.
    pub async fn cache_state(&self, target: &DownloadTarget) -> CacheResult<CacheState> {
        let tag = target.download_tag();
        for active_tag in [parent_tag(&tag), tag] {
            if let Some(operation) = self.ctx.registry.active(&active_tag) {
                return Ok(operation.state().cache_state);
            }
        }

        if self.ctx.is_present(target).await? {
            return Ok(CacheState::Present);
        }
        let metadata_present = match target {
            DownloadTarget::IssuePublication { publication, .. } => self
                .ctx
                .stored_issue(publication, self.ctx.settings.min_issue_status)
                .await?
                .is_some(),
            DownloadTarget::IssueKey { key, .. } => self.ctx.store.get_issue(key).await?.is_some(),
            DownloadTarget::Collection(Collection::Issue { issue, .. }) => {
                self.ctx.store.get_issue(&issue.key()).await?.is_some()
            }
            DownloadTarget::ResourceInfoKey { min_version } => self
                .ctx
                .store
                .get_newest_resource_info()
                .await?
                .is_some_and(|info| info.resource_version >= *min_version),
            DownloadTarget::MomentPublication(publication) => self
                .ctx
                .stored_moment(publication)
                .await?
                .is_some_and(|moment| moment.issue_status >= self.ctx.settings.min_issue_status),
            DownloadTarget::MomentKey(key) => self.ctx.store.get_moment(key).await?.is_some(),
            DownloadTarget::FrontPagePublication(publication) => self
                .ctx
                .stored_front_page(publication)
                .await?
                .is_some_and(|(status, _)| status >= self.ctx.settings.min_issue_status),
            DownloadTarget::FrontPageKey(key) => {
                self.ctx.store.get_front_page(key).await?.is_some()
            }
            DownloadTarget::AppInfoKey => self.ctx.store.get_app_info().await?.is_some(),
            DownloadTarget::Collection(_) | DownloadTarget::AppInfo(_) => true,
            DownloadTarget::File(file) => self.ctx.store.get_file_entry(&file.name).await?.is_some(),
        };
        Ok(if metadata_present {
            CacheState::MetadataPresent
        } else {
            CacheState::Absent
        })
    }

    /// Snapshots of every operation, as they are published
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.ctx.registry.subscribe()
    }
}
