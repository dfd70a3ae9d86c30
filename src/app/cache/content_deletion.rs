//! Deletion of the files of a collection
//!
//! Files that downloaded articles outside the collection still use, such as
//! shared author images, are left in place. Deletion is best effort: a file
//! that cannot be removed is counted as a failed item but does not stop the
//! remaining ones, and the operation still succeeds.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::context::CacheContext;
use super::item::{CacheItem, DownloadPriority, FileEntryOperation};
use super::operation::{CacheOperation, OperationCore, OperationDescriptor, OperationHandle};
use super::state::CacheState;
use crate::app::models::Collection;
use crate::errors::CacheResult;

/// Deletes the files of a collection
pub struct ContentDeletion {
    core: OperationCore<()>,
    ctx: CacheContext,
    collection: Collection,
}

impl ContentDeletion {
    /// Prepare the deletion of the files of `collection` no other downloaded article uses
    ///
    /// An article's own files count one reference from the article itself,
    /// so for articles a file is kept when two or more downloaded articles
    /// reference it; for every other collection one reference suffices.
    pub async fn prepare(ctx: &CacheContext, collection: Collection) -> CacheResult<Arc<Self>> {
        let keep_threshold = match collection {
            Collection::Article(_) => 2,
            _ => 1,
        };

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for file in collection.all_files() {
            if !seen.insert(file.name.clone()) {
                continue;
            }
            let references = ctx.store.downloaded_article_references(&file.name).await?;
            if references >= keep_threshold {
                debug!(
                    "Keeping {}, still used by {} downloaded articles",
                    file.name, references
                );
                continue;
            }
            let file = ctx.store.get_file_entry(&file.name).await?.unwrap_or(file);
            if file.storage_location.is_none() {
                debug!("{} was never stored, nothing to delete", file.name);
                continue;
            }
            let destination = ctx.storage.absolute_path(&file).ok();
            items.push(CacheItem::file(
                FileEntryOperation::new(file, destination, None),
                DownloadPriority::Normal,
            ));
        }

        let tag = collection.download_tag();
        Ok(Arc::new_cyclic(|owner: &Weak<Self>| {
            let owner: Weak<dyn OperationHandle> = owner.clone();
            Self {
                core: OperationCore::new(
                    owner,
                    OperationDescriptor {
                        tag,
                        loading_state: CacheState::DeletingContent,
                        target_state: CacheState::MetadataPresent,
                        priority: DownloadPriority::Normal,
                    },
                    items,
                    ctx.registry.clone(),
                ),
                ctx: ctx.clone(),
                collection,
            }
        }))
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }
}

#[async_trait]
impl CacheOperation for ContentDeletion {
    type Output = ();

    fn core(&self) -> &OperationCore<()> {
        &self.core
    }

    async fn do_work(self: Arc<Self>) -> CacheResult<()> {
        self.core.notify_start().await;
        self.ctx.set_downloaded(&self.collection, None).await?;

        for item in self.core.items().await {
            let Some(file) = item.item().as_file() else {
                continue;
            };
            let deleted = async {
                self.ctx.storage.delete_file(&file.file_entry).await?;
                self.ctx
                    .store
                    .set_file_download_date(&file.file_entry.name, None)
                    .await?;
                CacheResult::Ok(())
            }
            .await;

            match deleted {
                Ok(()) => self.core.notify_successful_item().await,
                Err(e) => {
                    warn!("Could not delete {}: {}", file.file_entry.name, e);
                    self.core.notify_failed_item(e).await;
                }
            }
        }

        self.core.notify_success(()).await;
        Ok(())
    }
}
