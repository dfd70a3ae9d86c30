//! Deletion of every stored status of a publication
//!
//! Content goes first, collection by collection. Metadata follows only for
//! issues without bookmarked articles, and only if every content deletion
//! removed all of its files: metadata is what locates leftover files, so it
//! stays while any are left.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{info, warn};

use super::content_deletion::ContentDeletion;
use super::context::CacheContext;
use super::item::{CacheItem, DownloadPriority};
use super::metadata_deletion::MetadataDeletion;
use super::operation::{CacheOperation, OperationCore, OperationDescriptor, OperationHandle};
use super::state::CacheState;
use crate::app::models::{Collection, DownloadTarget, Issue, IssuePublication};
use crate::errors::{CacheError, CacheResult};

/// Deletes content and metadata of all stored issues of a publication
pub struct IssueDeletion {
    core: OperationCore<()>,
    ctx: CacheContext,
    publication: IssuePublication,
}

impl IssueDeletion {
    pub fn prepare(ctx: &CacheContext, publication: IssuePublication) -> Arc<Self> {
        let tag = DownloadTarget::IssuePublication {
            publication: publication.clone(),
            with_pages: true,
        }
        .download_tag();
        Arc::new_cyclic(|owner: &Weak<Self>| {
            let owner: Weak<dyn OperationHandle> = owner.clone();
            Self {
                core: OperationCore::new(
                    owner,
                    OperationDescriptor {
                        tag,
                        loading_state: CacheState::DeletingContent,
                        target_state: CacheState::Absent,
                        priority: DownloadPriority::Normal,
                    },
                    Vec::new(),
                    ctx.registry.clone(),
                ),
                ctx: ctx.clone(),
                publication,
            }
        })
    }

    pub fn publication(&self) -> &IssuePublication {
        &self.publication
    }

    /// Imprint, sections, non-bookmarked articles and pages of an issue
    fn content_of(issue: &Issue) -> Vec<Collection> {
        let mut collections: Vec<Collection> =
            issue.imprint.iter().cloned().map(Collection::Article).collect();
        collections.extend(issue.section_list.iter().cloned().map(Collection::Section));
        collections.extend(
            issue
                .articles()
                .filter(|article| !article.bookmarked)
                .cloned()
                .map(Collection::Article),
        );
        collections.extend(issue.page_list.iter().cloned().map(Collection::Page));
        collections
    }

    /// Clears the download dates of every stored issue and lists what to delete
    ///
    /// Content deletions are only prepared when their turn comes, so files
    /// shared by articles of these issues are no longer counted as used once
    /// the earlier articles are gone.
    async fn plan(&self) -> CacheResult<(Vec<Collection>, Vec<Arc<MetadataDeletion>>)> {
        let mut content = Vec::new();
        let mut metadata = Vec::new();

        for issue in self.ctx.store.get_issues_by_publication(&self.publication).await? {
            for with_pages in [false, true] {
                let collection = Collection::issue(issue.clone(), with_pages);
                self.ctx.set_downloaded(&collection, None).await?;
            }

            content.extend(Self::content_of(&issue));

            if issue.has_bookmarked_articles() {
                info!(
                    "Keeping metadata of {}, it has bookmarked articles",
                    issue.key().tag()
                );
            } else {
                metadata.push(MetadataDeletion::prepare(
                    &self.ctx,
                    DownloadTarget::IssueKey {
                        key: issue.key(),
                        with_pages: true,
                    },
                ));
            }
        }
        Ok((content, metadata))
    }

    async fn delete_content(&self, collection: Collection) -> CacheResult<()> {
        let deletion = ContentDeletion::prepare(&self.ctx, collection).await?;
        deletion.clone().execute(false).await?;
        let failed_files = deletion.core().failed_count().await;
        if failed_files > 0 {
            return Err(CacheError::failed(format!(
                "{} files of {} could not be deleted",
                failed_files,
                deletion.core().tag()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheOperation for IssueDeletion {
    type Output = ();

    fn core(&self) -> &OperationCore<()> {
        &self.core
    }

    async fn do_work(self: Arc<Self>) -> CacheResult<()> {
        self.core.notify_start().await;

        let (content, metadata) = self.plan().await?;
        // Content deletions do not exist yet, so they are tracked by tag
        let mut items: Vec<CacheItem> = content
            .iter()
            .map(|collection| {
                CacheItem::metadata(collection.download_tag(), DownloadPriority::Normal)
            })
            .collect();
        items.extend(
            metadata
                .iter()
                .map(|deletion| CacheItem::sub_operation(deletion.clone())),
        );
        self.core.add_items(items).await?;

        let mut content_complete = true;
        for collection in content {
            match self.delete_content(collection).await {
                Ok(()) => self.core.notify_successful_item().await,
                Err(e) => {
                    content_complete = false;
                    self.core.notify_failed_item(e).await;
                }
            }
        }

        for deletion in metadata {
            if !content_complete {
                warn!(
                    "Skipping metadata deletion of {} after content errors",
                    deletion.core().tag()
                );
                self.core
                    .notify_failed_item(CacheError::failed(
                        "Operation aborted due to previous errors",
                    ))
                    .await;
                continue;
            }
            match deletion.execute(false).await {
                Ok(()) => self.core.notify_successful_item().await,
                Err(e) => self.core.notify_failed_item(e).await,
            }
        }

        self.core.check_if_items_complete_and_notify_result(()).await;
        self.core.wait_on_completion().await
    }
}
