//! Cache items and their priorities
//!
//! A [`CacheItem`] is one unit of work inside an operation: a file to move, a
//! nested operation or a metadata record. Its priority is not a value fixed at
//! construction. Once an item is added to an operation it reads the priority
//! through a weak reference to that operation, so raising an operation's
//! priority re-orders all of its queued items at once.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use super::operation::OperationHandle;
use crate::app::models::FileEntry;

/// Transfer priority, ordered from least to most urgent
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl DownloadPriority {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => DownloadPriority::Low,
            1 => DownloadPriority::Normal,
            _ => DownloadPriority::High,
        }
    }
}

impl FromStr for DownloadPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(DownloadPriority::Low),
            "normal" => Ok(DownloadPriority::Normal),
            "high" => Ok(DownloadPriority::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Where an item's priority is read from
#[derive(Clone)]
pub enum PrioritySource {
    /// Priority given at construction, before the item joins an operation
    Fixed(DownloadPriority),
    /// Priority of the owning operation; `fallback` once it has been dropped
    Operation {
        owner: Weak<dyn OperationHandle>,
        fallback: DownloadPriority,
    },
}

impl PrioritySource {
    pub fn get(&self) -> DownloadPriority {
        match self {
            PrioritySource::Fixed(priority) => *priority,
            PrioritySource::Operation { owner, fallback } => owner
                .upgrade()
                .map_or(*fallback, |operation| operation.priority()),
        }
    }
}

impl fmt::Debug for PrioritySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrioritySource::Fixed(priority) => write!(f, "Fixed({:?})", priority),
            PrioritySource::Operation { .. } => write!(f, "Operation({:?})", self.get()),
        }
    }
}

/// A file together with where it comes from and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntryOperation {
    pub file_entry: FileEntry,
    /// Absolute path on local storage
    pub destination: Option<PathBuf>,
    /// Remote URL
    pub origin: Option<String>,
}

impl FileEntryOperation {
    pub fn new(file_entry: FileEntry, destination: Option<PathBuf>, origin: Option<String>) -> Self {
        Self {
            file_entry,
            destination,
            origin,
        }
    }
}

/// What a cache item stands for
#[derive(Clone)]
pub enum CacheItemKind {
    File(FileEntryOperation),
    SubOperation(Arc<dyn OperationHandle>),
    Metadata { tag: String },
}

impl fmt::Debug for CacheItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheItemKind::File(file) => f.debug_tuple("File").field(&file.file_entry.name).finish(),
            CacheItemKind::SubOperation(operation) => f
                .debug_tuple("SubOperation")
                .field(&operation.tag())
                .finish(),
            CacheItemKind::Metadata { tag } => f.debug_struct("Metadata").field("tag", tag).finish(),
        }
    }
}

/// One unit of work inside a cache operation
#[derive(Debug, Clone)]
pub struct CacheItem {
    key: String,
    priority: PrioritySource,
    kind: CacheItemKind,
}

impl CacheItem {
    /// A file transfer or deletion, keyed by file name
    pub fn file(operation: FileEntryOperation, priority: DownloadPriority) -> Self {
        Self {
            key: operation.file_entry.name.clone(),
            priority: PrioritySource::Fixed(priority),
            kind: CacheItemKind::File(operation),
        }
    }

    /// A nested operation, keyed by its tag
    pub fn sub_operation(operation: Arc<dyn OperationHandle>) -> Self {
        Self {
            key: operation.tag().to_string(),
            priority: PrioritySource::Fixed(operation.priority()),
            kind: CacheItemKind::SubOperation(operation),
        }
    }

    /// A metadata record, keyed by its tag
    pub fn metadata(tag: impl Into<String>, priority: DownloadPriority) -> Self {
        let tag = tag.into();
        Self {
            key: tag.clone(),
            priority: PrioritySource::Fixed(priority),
            kind: CacheItemKind::Metadata { tag },
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &CacheItemKind {
        &self.kind
    }

    pub fn priority(&self) -> DownloadPriority {
        self.priority.get()
    }

    pub fn as_file(&self) -> Option<&FileEntryOperation> {
        match &self.kind {
            CacheItemKind::File(file) => Some(file),
            _ => None,
        }
    }

    /// Read the priority through `owner` from now on
    pub(crate) fn bind_to(&mut self, owner: Weak<dyn OperationHandle>) {
        let fallback = self.priority.get();
        self.priority = PrioritySource::Operation { owner, fallback };
    }

    /// Order by priority, most urgent first
    pub fn compare_priority(&self, other: &CacheItem) -> Ordering {
        other.priority().cmp(&self.priority())
    }
}

/// A cache item paired with the operation it belongs to
#[derive(Debug, Clone)]
pub struct CacheOperationItem {
    item: CacheItem,
    operation: Weak<dyn OperationHandle>,
}

impl CacheOperationItem {
    /// Pair `item` with `operation`, binding the item's priority to it
    pub fn new(mut item: CacheItem, operation: Weak<dyn OperationHandle>) -> Self {
        item.bind_to(operation.clone());
        Self { item, operation }
    }

    pub fn item(&self) -> &CacheItem {
        &self.item
    }

    pub fn key(&self) -> &str {
        self.item.key()
    }

    pub fn priority(&self) -> DownloadPriority {
        self.item.priority()
    }

    /// The owning operation, if it is still alive
    pub fn operation(&self) -> Option<Arc<dyn OperationHandle>> {
        self.operation.upgrade()
    }

    pub fn compare_priority(&self, other: &CacheOperationItem) -> Ordering {
        self.item.compare_priority(&other.item)
    }
}
