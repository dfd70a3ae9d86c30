//! Registry of active cache operations
//!
//! At most one operation is active per tag. An operation claims its tag before
//! doing any work and releases it when it publishes its terminal snapshot. A
//! claim that finds the tag taken reports who holds it, so the caller can
//! decide between joining the active operation and waiting for it.
//!
//! The registry also carries the status stream: every snapshot any operation
//! publishes is broadcast as a [`StatusEvent`] to interested observers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::operation::OperationHandle;
use super::state::CacheStateUpdate;
use crate::constants::cache::STATUS_CHANNEL_CAPACITY;

/// Outcome of claiming a tag
#[derive(Clone)]
pub enum ClaimStatus {
    /// The tag was free and now belongs to the claiming operation
    Claimed,
    /// An operation of the same concrete type holds the tag
    SameOperationActive(Arc<dyn OperationHandle>),
    /// An operation of a different concrete type holds the tag
    DifferentOperationActive(Arc<dyn OperationHandle>),
}

impl std::fmt::Debug for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimStatus::Claimed => f.write_str("Claimed"),
            ClaimStatus::SameOperationActive(op) => {
                write!(f, "SameOperationActive({})", op.tag())
            }
            ClaimStatus::DifferentOperationActive(op) => {
                write!(f, "DifferentOperationActive({} {})", op.operation_name(), op.tag())
            }
        }
    }
}

/// A snapshot published by the operation registered under `tag`
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub tag: String,
    pub update: CacheStateUpdate,
}

/// Tag-keyed registry of active operations
pub struct OperationRegistry {
    active: Mutex<HashMap<String, Arc<dyn OperationHandle>>>,
    status_tx: broadcast::Sender<StatusEvent>,
}

impl OperationRegistry {
    /// Create a registry whose status stream buffers `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (status_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            active: Mutex::new(HashMap::new()),
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn OperationHandle>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim the operation's tag
    pub fn claim(&self, operation: &Arc<dyn OperationHandle>) -> ClaimStatus {
        let mut active = self.lock();
        match active.get(operation.tag()) {
            Some(holder) if holder.operation_type() == operation.operation_type() => {
                ClaimStatus::SameOperationActive(holder.clone())
            }
            Some(holder) => ClaimStatus::DifferentOperationActive(holder.clone()),
            None => {
                active.insert(operation.tag().to_string(), operation.clone());
                debug!(
                    "Registered {} for {} ({} active)",
                    operation.operation_name(),
                    operation.tag(),
                    active.len()
                );
                ClaimStatus::Claimed
            }
        }
    }

    /// Release `tag` if it is held by the operation with `operation_id`
    ///
    /// # Returns
    ///
    /// `true` if an entry was removed
    pub fn release(&self, tag: &str, operation_id: u64) -> bool {
        let mut active = self.lock();
        match active.get(tag) {
            Some(holder) if holder.id() == operation_id => {
                active.remove(tag);
                debug!("Released {} ({} active)", tag, active.len());
                true
            }
            _ => false,
        }
    }

    /// The operation currently holding `tag`
    pub fn active(&self, tag: &str) -> Option<Arc<dyn OperationHandle>> {
        self.lock().get(tag).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Broadcast a snapshot; dropped silently when nobody listens
    pub fn publish(&self, tag: &str, update: &CacheStateUpdate) {
        trace!(
            "{}: {:?} {} {}/{}",
            tag,
            update.update_type,
            update.cache_state,
            update.processed_items,
            update.total_items
        );
        let _ = self.status_tx.send(StatusEvent {
            tag: tag.to_string(),
            update: update.clone(),
        });
    }

    /// Subscribe to snapshots of all operations
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new(STATUS_CHANNEL_CAPACITY)
    }
}
