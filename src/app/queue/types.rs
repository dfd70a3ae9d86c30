//! Data structures of the transfer queue

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::app::cache::{CacheOperationItem, DownloadPriority, FileEntryOperation};

/// A file item waiting in the queue
#[derive(Debug, Clone)]
pub(crate) struct QueuedItem {
    pub item: CacheOperationItem,
    /// Later offers of the same key, kept for their priorities
    pub merged: Vec<CacheOperationItem>,
    /// Insertion order, breaks ties between equal priorities
    pub sequence: u64,
    pub enqueued_at: Instant,
}

impl QueuedItem {
    /// Most urgent priority among every offer of this key
    pub fn priority(&self) -> DownloadPriority {
        self.merged
            .iter()
            .map(CacheOperationItem::priority)
            .fold(self.item.priority(), DownloadPriority::max)
    }
}

/// A file item handed to a transfer agent
///
/// `operations` lists every operation that offered an item with the same
/// key while it was queued, the one that enqueued it first.
#[derive(Debug)]
pub struct Transfer<O> {
    pub item: CacheOperationItem,
    pub operations: Vec<Arc<O>>,
    /// Time spent in the queue
    pub waited: std::time::Duration,
}

impl<O> Transfer<O> {
    pub fn key(&self) -> &str {
        self.item.key()
    }

    pub fn priority(&self) -> DownloadPriority {
        self.item.priority()
    }

    /// The file to transfer; every queued item is a file item
    pub fn file(&self) -> Option<&FileEntryOperation> {
        self.item.item().as_file()
    }
}

/// Counters of the transfer queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items currently waiting
    pub pending_count: u64,
    /// Items ever enqueued
    pub total_enqueued: u64,
    /// Offers merged into an already queued item
    pub deduplicated_count: u64,
    /// Items handed to agents
    pub dispatched_count: u64,
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }
}
