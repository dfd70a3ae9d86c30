//! The cache operation engine
//!
//! Every concrete operation (content download, content deletion, metadata
//! download, ...) embeds an [`OperationCore`] and implements
//! [`CacheOperation::do_work`]. The core owns the item list, the counters and
//! the snapshot channel, and implements the notify protocol concrete
//! operations and transports use to report progress.
//!
//! [`CacheOperation::execute`] deduplicates against the registry before
//! running `do_work`:
//!
//! - same concrete type already active on the tag: join it, raising its
//!   priority if ours is higher, and return its result. With
//!   `force_execution` wait for it to finish and run again instead;
//! - different type active on the tag: wait for it, ignore its outcome and
//!   try again;
//! - tag free: run `do_work`.
//!
//! The work runs on its own tokio task, so dropping the future returned by
//! `execute` does not abort an operation other callers may be waiting on.
//!
//! # Examples
//!
//! ```rust,no_run
//! use issue_cache::app::cache::{CacheContext, CacheOperation, ContentDownload, DownloadPriority};
//! use issue_cache::app::models::Collection;
//!
//! # async fn example(ctx: CacheContext, collection: Collection) -> issue_cache::errors::CacheResult<()> {
//! let download = ContentDownload::prepare(&ctx, collection, DownloadPriority::High).await?;
//! let mut updates = download.core().subscribe();
//! tokio::spawn(async move {
//!     while updates.changed().await.is_ok() {
//!         let update = updates.borrow().clone();
//!         println!("{}/{}", update.processed_items, update.total_items);
//!     }
//! });
//! download.execute(false).await?;
//! # Ok(())
//! # }
//! ```

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::item::{CacheItem, CacheOperationItem, DownloadPriority};
use super::registry::{ClaimStatus, OperationRegistry};
use super::state::{CacheState, CacheStateUpdate, UpdateType};
use crate::errors::{CacheError, CacheResult};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Type-erased view of a cache operation
///
/// Implemented for every [`CacheOperation`]. The registry, cache items and
/// snapshots refer to operations through this trait.
pub trait OperationHandle: Send + Sync + 'static {
    /// Process-unique identity
    fn id(&self) -> u64;
    fn tag(&self) -> &str;
    /// Concrete type, used to tell "same operation" from "different operation"
    fn operation_type(&self) -> TypeId;
    fn operation_name(&self) -> &'static str;
    fn priority(&self) -> DownloadPriority;
    fn set_priority(&self, priority: DownloadPriority);
    /// Latest snapshot
    fn state(&self) -> CacheStateUpdate;
    fn subscribe(&self) -> watch::Receiver<CacheStateUpdate>;
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A deduplicated, observable unit of cache work
#[async_trait]
pub trait CacheOperation: Send + Sync + Sized + 'static {
    /// Value handed to every caller once the operation succeeded
    type Output: Clone + Send + Sync + 'static;

    fn core(&self) -> &OperationCore<Self::Output>;

    /// The operation-specific work
    ///
    /// Implementations report through the core's notify methods. If this
    /// returns before a terminal notification was published, the engine
    /// publishes one derived from the returned value.
    async fn do_work(self: Arc<Self>) -> CacheResult<Self::Output>;

    /// Run the operation, deduplicated against other operations on the same tag
    ///
    /// A caller joining an equal operation gets that operation's outcome,
    /// whatever retry policy the caller itself was prepared with.
    ///
    /// # Arguments
    ///
    /// * `force_execution` - run our own `do_work` even if an equal operation
    ///   is already active, after waiting for it
    ///
    /// # Errors
    ///
    /// Returns the error the operation (or the one joined) failed with, or
    /// `CacheError::TaskAborted` if the task driving it panicked
    async fn execute(self: Arc<Self>, force_execution: bool) -> CacheResult<Self::Output> {
        let tag = self.core().tag().to_string();
        match tokio::spawn(run_to_completion(self, force_execution)).await {
            Ok(result) => result,
            Err(e) => Err(CacheError::TaskAborted {
                tag,
                reason: e.to_string(),
            }),
        }
    }
}

impl<T: CacheOperation> OperationHandle for T {
    fn id(&self) -> u64 {
        self.core().id()
    }

    fn tag(&self) -> &str {
        self.core().tag()
    }

    fn operation_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn operation_name(&self) -> &'static str {
        let full = std::any::type_name::<T>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn priority(&self) -> DownloadPriority {
        self.core().priority()
    }

    fn set_priority(&self, priority: DownloadPriority) {
        self.core().set_priority(priority)
    }

    fn state(&self) -> CacheStateUpdate {
        self.core().state()
    }

    fn subscribe(&self) -> watch::Receiver<CacheStateUpdate> {
        self.core().subscribe()
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Static description of an operation
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub tag: String,
    /// State while the work is running
    pub loading_state: CacheState,
    /// State reached on success
    pub target_state: CacheState,
    pub priority: DownloadPriority,
}

struct Progress<R> {
    items: Vec<CacheOperationItem>,
    successful: usize,
    failed: usize,
    result: Option<R>,
}

impl<R> Progress<R> {
    fn processed(&self) -> usize {
        self.successful + self.failed
    }
}

/// Shared state and notify protocol of every cache operation
pub struct OperationCore<R> {
    id: u64,
    tag: String,
    owner: Weak<dyn OperationHandle>,
    loading_state: CacheState,
    target_state: CacheState,
    priority: AtomicU8,
    registry: Arc<OperationRegistry>,
    progress: Mutex<Progress<R>>,
    state_tx: watch::Sender<CacheStateUpdate>,
}

impl<R: Clone + Send + Sync + 'static> OperationCore<R> {
    /// Create the core of the operation `owner` points to
    ///
    /// `owner` is the weak self-reference handed out by `Arc::new_cyclic`;
    /// `items` are bound to it so their priority follows the operation's.
    pub fn new(
        owner: Weak<dyn OperationHandle>,
        descriptor: OperationDescriptor,
        items: Vec<CacheItem>,
        registry: Arc<OperationRegistry>,
    ) -> Self {
        let items: Vec<_> = items
            .into_iter()
            .map(|item| CacheOperationItem::new(item, owner.clone()))
            .collect();
        let initial = CacheStateUpdate {
            update_type: UpdateType::Initial,
            cache_state: CacheState::Absent,
            processed_items: 0,
            total_items: items.len(),
            operation: Some(owner.clone()),
            error: None,
        };
        let (state_tx, _) = watch::channel(initial);

        Self {
            id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
            tag: descriptor.tag,
            owner,
            loading_state: descriptor.loading_state,
            target_state: descriptor.target_state,
            priority: AtomicU8::new(descriptor.priority.as_u8()),
            registry,
            progress: Mutex::new(Progress {
                items,
                successful: 0,
                failed: 0,
                result: None,
            }),
            state_tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn priority(&self) -> DownloadPriority {
        DownloadPriority::from_u8(self.priority.load(Ordering::Acquire))
    }

    pub fn set_priority(&self, priority: DownloadPriority) {
        self.priority.store(priority.as_u8(), Ordering::Release);
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Latest snapshot
    pub fn state(&self) -> CacheStateUpdate {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to snapshots; the receiver starts at the latest one
    pub fn subscribe(&self) -> watch::Receiver<CacheStateUpdate> {
        self.state_tx.subscribe()
    }

    pub fn has_completed(&self) -> bool {
        self.state_tx.borrow().has_completed()
    }

    /// Snapshot of the item list
    pub async fn items(&self) -> Vec<CacheOperationItem> {
        self.progress.lock().await.items.clone()
    }

    pub async fn total_items(&self) -> usize {
        self.progress.lock().await.items.len()
    }

    pub async fn successful_count(&self) -> usize {
        self.progress.lock().await.successful
    }

    pub async fn failed_count(&self) -> usize {
        self.progress.lock().await.failed
    }

    /// Append an item, binding its priority to this operation
    ///
    /// # Errors
    ///
    /// Returns `CacheError::IllegalState` once the operation has completed
    pub async fn add_item(&self, item: CacheItem) -> CacheResult<()> {
        self.add_items(vec![item]).await
    }

    /// Append several items at once
    pub async fn add_items(&self, items: Vec<CacheItem>) -> CacheResult<()> {
        let mut progress = self.progress.lock().await;
        if self.has_completed() {
            return Err(CacheError::IllegalState(format!(
                "Cannot add items to completed operation {}",
                self.tag
            )));
        }
        progress.items.extend(
            items
                .into_iter()
                .map(|item| CacheOperationItem::new(item, self.owner.clone())),
        );
        Ok(())
    }

    /// Switch to the loading state
    pub async fn notify_start(&self) {
        let progress = self.progress.lock().await;
        if self.ignore_when_completed("start") {
            return;
        }
        let update_type = self.state_tx.borrow().update_type;
        self.emit(&progress, update_type, self.loading_state, None);
    }

    /// Report that a transfer is waiting for connectivity
    pub async fn notify_bad_connection(&self) {
        let progress = self.progress.lock().await;
        if self.ignore_when_completed("bad connection") {
            return;
        }
        let cache_state = self.state_tx.borrow().cache_state;
        self.emit(&progress, UpdateType::BadConnection, cache_state, None);
    }

    /// Count one item as successfully processed
    pub async fn notify_successful_item(&self) {
        let mut progress = self.progress.lock().await;
        if self.ignore_when_completed("successful item") || self.ignore_when_all_processed(&progress) {
            return;
        }
        progress.successful += 1;
        let cache_state = self.state_tx.borrow().cache_state;
        self.emit(&progress, UpdateType::ItemSuccessful, cache_state, None);
    }

    /// Count one item as failed
    pub async fn notify_failed_item(&self, error: CacheError) {
        let mut progress = self.progress.lock().await;
        if self.ignore_when_completed("failed item") || self.ignore_when_all_processed(&progress) {
            return;
        }
        debug!("Item of {} failed: {}", self.tag, error);
        progress.failed += 1;
        let cache_state = self.state_tx.borrow().cache_state;
        self.emit(&progress, UpdateType::ItemFailed, cache_state, Some(error));
    }

    /// Store the result and publish the terminal success snapshot
    pub async fn notify_success(&self, result: R) {
        let mut progress = self.progress.lock().await;
        self.succeed(&mut progress, result);
    }

    /// Publish the terminal failure snapshot
    pub async fn notify_failure(&self, error: CacheError) {
        let progress = self.progress.lock().await;
        self.fail(&progress, error);
    }

    /// Publish a terminal snapshot if every item reached a final state
    ///
    /// Succeeds with `result` when no item failed, fails otherwise. Does
    /// nothing while items are still pending.
    pub async fn check_if_items_complete_and_notify_result(&self, result: R) {
        let mut progress = self.progress.lock().await;
        if progress.processed() < progress.items.len() {
            return;
        }
        if progress.failed == 0 {
            self.succeed(&mut progress, result);
        } else {
            let error = CacheError::failed(format!(
                "{} of {} items of {} were not successfully processed",
                progress.failed,
                progress.items.len(),
                self.tag
            ));
            self.fail(&progress, error);
        }
    }

    /// Wait until every item reached a final state, or the operation completed
    pub async fn wait_for_items(&self) -> CacheStateUpdate {
        let mut rx = self.subscribe();
        let waited = rx
            .wait_for(|s| s.has_completed() || s.items_complete())
            .await
            .map(|s| s.clone());
        // The sender lives in `self`, so the channel cannot close while we wait
        waited.unwrap_or_else(|_| self.state())
    }

    /// Wait for the terminal snapshot and return the stored outcome
    ///
    /// # Errors
    ///
    /// Returns the stored error if the operation failed
    pub async fn wait_on_completion(&self) -> CacheResult<R> {
        let mut rx = self.subscribe();
        let terminal = rx
            .wait_for(CacheStateUpdate::has_completed)
            .await
            .map(|s| s.clone())
            .map_err(|_| {
                CacheError::IllegalState(format!("Snapshot channel of {} closed", self.tag))
            })?;

        if terminal.has_failed() {
            return Err(terminal
                .error
                .unwrap_or_else(|| CacheError::failed(format!("Operation {} failed", self.tag))));
        }

        let result = self.progress.lock().await.result.clone();
        debug_assert!(result.is_some(), "succeeded operation without result");
        result.ok_or_else(|| {
            CacheError::IllegalState(format!("Operation {} succeeded without a result", self.tag))
        })
    }

    fn succeed(&self, progress: &mut Progress<R>, result: R) {
        if self.ignore_when_completed("success") {
            return;
        }
        progress.result = Some(result);
        info!("{} succeeded ({} items)", self.tag, progress.items.len());
        self.emit(progress, UpdateType::Succeeded, self.target_state, None);
    }

    fn fail(&self, progress: &Progress<R>, error: CacheError) {
        if self.ignore_when_completed("failure") {
            return;
        }
        warn!("{} failed: {}", self.tag, error);
        self.emit(progress, UpdateType::Failed, CacheState::Absent, Some(error));
    }

    fn ignore_when_completed(&self, notification: &str) -> bool {
        let completed = self.has_completed();
        if completed {
            warn!(
                "Ignoring {} notification for completed operation {}",
                notification, self.tag
            );
        }
        completed
    }

    fn ignore_when_all_processed(&self, progress: &Progress<R>) -> bool {
        let exhausted = progress.processed() >= progress.items.len();
        if exhausted {
            warn!(
                "Ignoring item notification for {}: all {} items already processed",
                self.tag,
                progress.items.len()
            );
        }
        exhausted
    }

    /// Publish a new snapshot; must be called with the progress lock held
    fn emit(
        &self,
        progress: &Progress<R>,
        update_type: UpdateType,
        cache_state: CacheState,
        error: Option<CacheError>,
    ) {
        let update = CacheStateUpdate {
            update_type,
            cache_state,
            processed_items: progress.processed(),
            total_items: progress.items.len(),
            operation: Some(self.owner.clone()),
            error,
        };

        // Release before publishing so a waiter woken by the terminal
        // snapshot finds the tag free
        if update.has_completed() {
            self.registry.release(&self.tag, self.id);
        }
        self.registry.publish(&self.tag, &update);
        self.state_tx.send_replace(update);
    }
}

/// Wait until the operation behind `handle` published its terminal snapshot
pub async fn wait_until_complete(handle: &dyn OperationHandle) {
    let mut rx = handle.subscribe();
    let _ = rx.wait_for(CacheStateUpdate::has_completed).await.map(|_| ());
}

async fn run_to_completion<O: CacheOperation>(
    operation: Arc<O>,
    force_execution: bool,
) -> CacheResult<O::Output> {
    let core = operation.core();
    if core.has_completed() {
        return core.wait_on_completion().await;
    }

    let handle: Arc<dyn OperationHandle> = operation.clone();
    loop {
        match core.registry().claim(&handle) {
            // This instance finished between the check above and the claim
            ClaimStatus::Claimed if core.has_completed() => {
                core.registry().release(core.tag(), core.id());
                return core.wait_on_completion().await;
            }
            ClaimStatus::Claimed => break,
            // A second call on a running instance joins it, forced or not
            ClaimStatus::SameOperationActive(blocking) if blocking.id() == core.id() => {
                debug!("{} is already running, joining it", core.tag());
                return core.wait_on_completion().await;
            }
            ClaimStatus::SameOperationActive(blocking) if force_execution => {
                info!(
                    "{} is already active, waiting to force a new run",
                    core.tag()
                );
                wait_until_complete(blocking.as_ref()).await;
            }
            ClaimStatus::SameOperationActive(blocking) => {
                if blocking.priority() < core.priority() {
                    debug!(
                        "Raising priority of active {} to {:?}",
                        core.tag(),
                        core.priority()
                    );
                    blocking.set_priority(core.priority());
                }
                let blocking = blocking.as_any().downcast::<O>().map_err(|_| {
                    CacheError::IllegalState(format!(
                        "Operation registered for {} has an unexpected type",
                        core.tag()
                    ))
                })?;
                debug!("Joining active operation {}", core.tag());
                return blocking.core().wait_on_completion().await;
            }
            ClaimStatus::DifferentOperationActive(blocking) => {
                info!(
                    "{} is held by {}, waiting for it before running {}",
                    core.tag(),
                    blocking.operation_name(),
                    handle.operation_name()
                );
                wait_until_complete(blocking.as_ref()).await;
            }
        }
        if core.has_completed() {
            return core.wait_on_completion().await;
        }
    }

    debug!("Starting {} for {}", handle.operation_name(), core.tag());
    let result = operation.clone().do_work().await;
    if !core.has_completed() {
        match &result {
            Ok(value) => core.notify_success(value.clone()).await,
            Err(error) => core.notify_failure(error.clone()).await,
        }
    }
    result
}
