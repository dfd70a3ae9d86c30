//! Removal of an issue's metadata from the store

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::info;

use super::context::CacheContext;
use super::item::{CacheItem, DownloadPriority};
use super::operation::{CacheOperation, OperationCore, OperationDescriptor, OperationHandle};
use super::state::CacheState;
use crate::app::models::{Collection, DownloadTarget};
use crate::errors::{CacheError, CacheResult};

/// Deletes the stored metadata of an issue
pub struct MetadataDeletion {
    core: OperationCore<()>,
    ctx: CacheContext,
    target: DownloadTarget,
}

impl MetadataDeletion {
    pub fn prepare(ctx: &CacheContext, target: DownloadTarget) -> Arc<Self> {
        let tag = target.download_tag();
        let items = vec![CacheItem::metadata(tag.clone(), DownloadPriority::Normal)];
        Arc::new_cyclic(|owner: &Weak<Self>| {
            let owner: Weak<dyn OperationHandle> = owner.clone();
            Self {
                core: OperationCore::new(
                    owner,
                    OperationDescriptor {
                        tag,
                        loading_state: CacheState::DeletingMetadata,
                        target_state: CacheState::Absent,
                        priority: DownloadPriority::Normal,
                    },
                    items,
                    ctx.registry.clone(),
                ),
                ctx: ctx.clone(),
                target,
            }
        })
    }

    async fn delete(&self) -> CacheResult<()> {
        match &self.target {
            DownloadTarget::IssuePublication { publication, .. } => {
                for issue in self.ctx.store.get_issues_by_publication(publication).await? {
                    self.ctx.store.delete_issue(&issue.key()).await?;
                }
                Ok(())
            }
            DownloadTarget::IssueKey { key, .. } => Ok(self.ctx.store.delete_issue(key).await?),
            DownloadTarget::Collection(Collection::Issue { issue, .. }) => {
                Ok(self.ctx.store.delete_issue(&issue.key()).await?)
            }
            other => Err(CacheError::IllegalArgument(format!(
                "Metadata deletion is only supported for issues, not {}",
                other.download_tag()
            ))),
        }
    }
}

#[async_trait]
impl CacheOperation for MetadataDeletion {
    type Output = ();

    fn core(&self) -> &OperationCore<()> {
        &self.core
    }

    async fn do_work(self: Arc<Self>) -> CacheResult<()> {
        self.core.notify_start().await;

        match self.delete().await {
            Ok(()) => {
                info!("Deleted metadata of {}", self.core.tag());
                self.core.notify_successful_item().await;
                self.core.notify_success(()).await;
                Ok(())
            }
            Err(e) => {
                self.core.notify_failed_item(e.clone()).await;
                let error = CacheError::failed_with(
                    format!("Metadata deletion of {} failed", self.core.tag()),
                    e,
                );
                self.core.notify_failure(error.clone()).await;
                Err(error)
            }
        }
    }
}
