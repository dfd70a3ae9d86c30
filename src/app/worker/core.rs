//! Transfer agent
//!
//! An agent repeatedly takes the most urgent file from the shared queue,
//! downloads it to a temporary file next to its destination and moves it into
//! place. The outcome is reported to every operation that asked for the file.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use super::backoff::BackoffCalculator;
use super::config::TransportConfig;
use super::types::TransferStats;
use crate::app::cache::{CacheOperation, ContentDownload, FileEntryOperation};
use crate::app::hash::StreamingHasher;
use crate::app::queue::{Transfer, TransferQueue};
use crate::app::services::MetadataStore;
use crate::app::storage::FsStorageService;
use crate::errors::{CacheError, CacheResult, ConnectivityError, StorageError};

/// A single download loop over the shared queue
pub struct TransferAgent {
    id: usize,
    queue: Arc<TransferQueue<ContentDownload>>,
    client: reqwest::Client,
    store: Arc<dyn MetadataStore>,
    config: TransportConfig,
    stats: Arc<TransferStats>,
}

impl TransferAgent {
    pub fn new(
        id: usize,
        queue: Arc<TransferQueue<ContentDownload>>,
        client: reqwest::Client,
        store: Arc<dyn MetadataStore>,
        config: TransportConfig,
        stats: Arc<TransferStats>,
    ) -> Self {
        Self {
            id,
            queue,
            client,
            store,
            config,
            stats,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Process transfers until the task is aborted
    pub async fn run(self) {
        debug!("Agent {} started", self.id);
        loop {
            let transfer = self.queue.next().await;
            self.process(transfer).await;
        }
    }

    /// Transfer one file and report the outcome to all interested operations
    pub async fn process(&self, transfer: Transfer<ContentDownload>) {
        debug!(
            "Agent {} took {} ({:?}, waited {:?})",
            self.id,
            transfer.key(),
            transfer.priority(),
            transfer.waited
        );

        let result = match transfer.file() {
            Some(file) => self.transfer_file(file, &transfer.operations).await,
            None => Err(CacheError::IllegalArgument(format!(
                "{} is not a file item",
                transfer.key()
            ))),
        };

        match result {
            Ok(()) => {
                for operation in &transfer.operations {
                    operation.core().notify_successful_item().await;
                }
            }
            Err(e) => {
                warn!("Agent {} failed to download {}: {}", self.id, transfer.key(), e);
                self.stats.record_failure();
                for operation in &transfer.operations {
                    operation.core().notify_failed_item(e.clone()).await;
                }
            }
        }
    }

    async fn transfer_file(
        &self,
        file: &FileEntryOperation,
        operations: &[Arc<ContentDownload>],
    ) -> CacheResult<()> {
        let name = &file.file_entry.name;
        let destination = file.destination.as_deref().ok_or_else(|| {
            CacheError::IllegalArgument(format!("{} has no destination", name))
        })?;
        let origin = file
            .origin
            .as_deref()
            .ok_or_else(|| CacheError::IllegalArgument(format!("{} has no origin", name)))?;
        let url = Url::parse(origin)
            .map_err(|e| CacheError::IllegalArgument(format!("invalid origin {}: {}", origin, e)))?;

        if self.is_already_downloaded(name, destination).await? {
            debug!("Agent {} skipped {}, already on disk", self.id, name);
            self.stats.record_skip();
            return Ok(());
        }

        let mut retries = 0;
        loop {
            match self.attempt_download(&url, file, destination).await {
                Ok(bytes) => {
                    self.stats.record_download(bytes);
                    break;
                }
                Err(CacheError::Connectivity(e))
                    if e.is_recoverable() && self.config.allows_retry(retries) =>
                {
                    retries += 1;
                    self.stats.record_retry();
                    for operation in operations {
                        operation.core().notify_bad_connection().await;
                    }
                    let delay = BackoffCalculator::retry_delay(
                        retries,
                        self.config.retry_base_delay,
                        self.config.retry_max_delay,
                    );
                    debug!(
                        "Agent {} retrying {} in {:?} (attempt {}): {}",
                        self.id, name, delay, retries, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        self.store
            .set_file_download_date(name, Some(Utc::now()))
            .await?;
        Ok(())
    }

    async fn is_already_downloaded(&self, name: &str, destination: &Path) -> CacheResult<bool> {
        let stamped = self.store.get_file_download_date(name).await?.is_some();
        Ok(stamped && tokio::fs::try_exists(destination).await.unwrap_or(false))
    }

    /// Download `url` to `destination` through a temporary file
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn attempt_download(
        &self,
        url: &Url,
        file: &FileEntryOperation,
        destination: &Path,
    ) -> CacheResult<u64> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(ConnectivityError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectivityError::from_status(status.as_u16(), url.as_str()).into());
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, &e))?;
        }

        let temp_path = FsStorageService::temp_path(destination);
        let mut output = File::create(&temp_path)
            .await
            .map_err(|e| StorageError::io(&temp_path, &e))?;
        let mut hasher = StreamingHasher::new();

        let written = async {
            while let Some(chunk) = response.chunk().await.map_err(ConnectivityError::from)? {
                hasher.update(&chunk);
                output
                    .write_all(&chunk)
                    .await
                    .map_err(|e| StorageError::io(&temp_path, &e))?;
            }
            output
                .flush()
                .await
                .map_err(|e| StorageError::io(&temp_path, &e))?;
            Ok::<(), CacheError>(())
        }
        .await;

        if let Err(e) = written {
            drop(output);
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        drop(output);

        let bytes = hasher.bytes();
        let expected = &file.file_entry.sha256;
        if !expected.is_empty() {
            let digest = hasher.finish();
            if !digest.matches_hex(expected) {
                self.stats.record_hash_mismatch();
                warn!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    file.file_entry.name, expected, digest
                );
            }
        }

        tokio::fs::rename(&temp_path, destination)
            .await
            .map_err(|_| StorageError::AtomicOperationFailed {
                temp_path: temp_path.clone(),
                final_path: destination.to_path_buf(),
            })?;

        info!("Downloaded {} ({} bytes)", file.file_entry.name, bytes);
        Ok(bytes)
    }
}
