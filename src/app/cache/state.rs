//! Cache states and the snapshots operations publish

use std::fmt;
use std::sync::{Arc, Weak};

use super::operation::OperationHandle;
use crate::errors::CacheError;

/// Presence of a collection's metadata and content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheState {
    Absent,
    LoadingMetadata,
    MetadataPresent,
    LoadingContent,
    Present,
    DeletingContent,
    DeletingMetadata,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheState::Absent => "absent",
            CacheState::LoadingMetadata => "loading metadata",
            CacheState::MetadataPresent => "metadata present",
            CacheState::LoadingContent => "loading content",
            CacheState::Present => "present",
            CacheState::DeletingContent => "deleting content",
            CacheState::DeletingMetadata => "deleting metadata",
        };
        f.write_str(name)
    }
}

/// What caused a snapshot to be published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Initial,
    BadConnection,
    ItemSuccessful,
    ItemFailed,
    Succeeded,
    Failed,
}

/// Immutable snapshot of an operation's progress
///
/// Once a snapshot with type [`UpdateType::Succeeded`] or
/// [`UpdateType::Failed`] has been published for an operation, no further
/// snapshot replaces it.
#[derive(Debug, Clone)]
pub struct CacheStateUpdate {
    pub update_type: UpdateType,
    pub cache_state: CacheState,
    pub processed_items: usize,
    pub total_items: usize,
    /// Publishing operation; dangling once the operation is dropped
    pub operation: Option<Weak<dyn OperationHandle>>,
    pub error: Option<CacheError>,
}

impl CacheStateUpdate {
    pub fn has_completed(&self) -> bool {
        matches!(self.update_type, UpdateType::Succeeded | UpdateType::Failed)
    }

    pub fn has_failed(&self) -> bool {
        self.update_type == UpdateType::Failed
    }

    /// Whether every item reached a final state
    pub fn items_complete(&self) -> bool {
        self.processed_items >= self.total_items
    }

    pub fn operation(&self) -> Option<Arc<dyn OperationHandle>> {
        self.operation.as_ref().and_then(Weak::upgrade)
    }

    /// Fraction of processed items in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total_items == 0 {
            if self.has_completed() {
                1.0
            } else {
                0.0
            }
        } else {
            self.processed_items as f64 / self.total_items as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(update_type: UpdateType, processed: usize, total: usize) -> CacheStateUpdate {
        CacheStateUpdate {
            update_type,
            cache_state: CacheState::LoadingContent,
            processed_items: processed,
            total_items: total,
            operation: None,
            error: None,
        }
    }

    #[test]
    fn test_terminal_types() {
        assert!(update(UpdateType::Succeeded, 1, 1).has_completed());
        assert!(update(UpdateType::Failed, 0, 1).has_failed());
        assert!(!update(UpdateType::BadConnection, 0, 1).has_completed());
        assert!(!update(UpdateType::ItemFailed, 1, 1).has_completed());
    }

    #[test]
    fn test_fraction() {
        // Empty operations count as done only once they completed
        assert_eq!(update(UpdateType::Initial, 0, 0).fraction(), 0.0);
        assert_eq!(update(UpdateType::Succeeded, 0, 0).fraction(), 1.0);
        assert_eq!(update(UpdateType::ItemSuccessful, 1, 4).fraction(), 0.25);
        assert!(update(UpdateType::Initial, 0, 0).items_complete());
        assert!(update(UpdateType::Initial, 0, 4).operation().is_none());
    }
}
