//! Counters shared by the transfer agents

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters, updated by every agent
#[derive(Debug, Default)]
pub struct TransferStats {
    files_downloaded: AtomicU64,
    files_skipped: AtomicU64,
    files_failed: AtomicU64,
    bytes_downloaded: AtomicU64,
    retries: AtomicU64,
    hash_mismatches: AtomicU64,
}

impl TransferStats {
    pub(crate) fn record_download(&self, bytes: u64) {
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hash_mismatch(&self) {
        self.hash_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            hash_mismatches: self.hash_mismatches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransferStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub files_downloaded: u64,
    /// Files found on disk from an earlier download
    pub files_skipped: u64,
    pub files_failed: u64,
    pub bytes_downloaded: u64,
    pub retries: u64,
    pub hash_mismatches: u64,
}
