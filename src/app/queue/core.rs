//! Core transfer queue implementation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

use super::types::{QueueStats, QueuedItem, Transfer};
use crate::app::cache::CacheOperationItem;

#[derive(Debug)]
struct QueueState<O> {
    pending: Vec<QueuedItem>,
    /// Operations interested in each queued key, in offer order
    interested: HashMap<String, Vec<Arc<O>>>,
    next_sequence: u64,
    stats: QueueStats,
}

impl<O> QueueState<O> {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            interested: HashMap::new(),
            next_sequence: 0,
            stats: QueueStats::new(),
        }
    }

    /// Index of the item with the highest current priority, oldest first among equals
    fn most_urgent(&self) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.priority()
                    .cmp(&b.priority())
                    .then_with(|| b.sequence.cmp(&a.sequence))
            })
            .map(|(index, _)| index)
    }
}

/// Priority queue of file items shared by all transfer agents
///
/// Priorities are read when an item is taken, not when it is offered, so
/// raising an operation's priority reorders its queued items. An item offered
/// by several operations takes the most urgent of their priorities.
#[derive(Debug)]
pub struct TransferQueue<O> {
    state: Mutex<QueueState<O>>,
    available: Notify,
}

impl<O: Send + Sync + 'static> TransferQueue<O> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            available: Notify::new(),
        }
    }

    /// Enqueue `item` for `operation`
    ///
    /// If an item with the same key is already waiting, it is not queued a
    /// second time; `operation` is recorded as interested in it instead.
    ///
    /// # Returns
    ///
    /// `true` if the item was enqueued, `false` if it was merged
    pub async fn offer(&self, item: CacheOperationItem, operation: Arc<O>) -> bool {
        let mut state = self.state.lock().await;
        let key = item.key().to_string();
        state.interested.entry(key.clone()).or_default().push(operation);

        if let Some(queued) = state.pending.iter_mut().find(|queued| queued.item.key() == key) {
            queued.merged.push(item);
            state.stats.deduplicated_count += 1;
            debug!("Deduplicated transfer of {}", key);
            return false;
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.pending.push(QueuedItem {
            item,
            merged: Vec::new(),
            sequence,
            enqueued_at: Instant::now(),
        });
        state.stats.total_enqueued += 1;
        state.stats.pending_count = state.pending.len() as u64;
        drop(state);

        trace!("Enqueued transfer of {}", key);
        self.available.notify_one();
        true
    }

    /// Take the most urgent item, if any is waiting
    pub async fn try_next(&self) -> Option<Transfer<O>> {
        let mut state = self.state.lock().await;
        let index = state.most_urgent()?;
        let queued = state.pending.remove(index);
        let operations = state
            .interested
            .remove(queued.item.key())
            .unwrap_or_default();
        state.stats.dispatched_count += 1;
        state.stats.pending_count = state.pending.len() as u64;

        Some(Transfer {
            item: queued.item,
            operations,
            waited: queued.enqueued_at.elapsed(),
        })
    }

    /// Wait for the next item
    pub async fn next(&self) -> Transfer<O> {
        loop {
            if let Some(transfer) = self.try_next().await {
                return transfer;
            }
            self.available.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> QueueStats {
        self.state.lock().await.stats.clone()
    }
}

impl<O: Send + Sync + 'static> Default for TransferQueue<O> {
    fn default() -> Self {
        Self::new()
    }
}
