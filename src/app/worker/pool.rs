//! File downloader: the production [`FileTransport`]
//!
//! Owns the shared transfer queue and a pool of agents. The agents are
//! spawned lazily with the first download, so constructing a downloader
//! outside a runtime or for metadata-only work costs nothing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::TransportConfig;
use super::core::TransferAgent;
use super::types::{TransferStats, TransferSummary};
use crate::app::cache::{CacheOperation, ContentDownload};
use crate::app::queue::TransferQueue;
use crate::app::services::{FileTransport, MetadataStore};
use crate::errors::{CacheError, CacheResult, ConnectivityError};

/// Downloads the file items of content downloads over HTTP
pub struct FileDownloader {
    config: TransportConfig,
    queue: Arc<TransferQueue<ContentDownload>>,
    client: reqwest::Client,
    store: Arc<dyn MetadataStore>,
    stats: Arc<TransferStats>,
    agents: Mutex<Vec<JoinHandle<()>>>,
}

impl FileDownloader {
    /// Create a downloader; agents start with the first enqueued download
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: TransportConfig, store: Arc<dyn MetadataStore>) -> CacheResult<Self> {
        config
            .validate()
            .map_err(|e| CacheError::IllegalArgument(e.to_string()))?;

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(ConnectivityError::from)?;

        Ok(Self {
            config,
            queue: Arc::new(TransferQueue::new()),
            client,
            store,
            stats: Arc::new(TransferStats::default()),
            agents: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<TransferQueue<ContentDownload>> {
        &self.queue
    }

    pub fn stats(&self) -> TransferSummary {
        self.stats.summary()
    }

    pub async fn running_agents(&self) -> usize {
        self.agents
            .lock()
            .await
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    async fn ensure_agents(&self) {
        let mut agents = self.agents.lock().await;
        agents.retain(|handle| !handle.is_finished());
        let missing = self.config.max_simultaneous_downloads.saturating_sub(agents.len());
        if missing == 0 {
            return;
        }

        for _ in 0..missing {
            let agent = TransferAgent::new(
                agents.len(),
                self.queue.clone(),
                self.client.clone(),
                self.store.clone(),
                self.config.clone(),
                self.stats.clone(),
            );
            agents.push(tokio::spawn(agent.run()));
        }
        info!("Started {} transfer agents", agents.len());
    }

    /// Stop all agents; files still queued stay queued
    pub async fn shutdown(&self) {
        let mut agents = self.agents.lock().await;
        for handle in agents.drain(..) {
            handle.abort();
        }
        debug!("Transfer agents stopped");
    }
}

#[async_trait]
impl FileTransport for FileDownloader {
    async fn enqueue_download(&self, operation: Arc<ContentDownload>) -> CacheResult<()> {
        let core = operation.core();
        core.notify_start().await;
        self.ensure_agents().await;

        let mut enqueued = 0;
        for item in core.items().await {
            if item.item().as_file().is_none() {
                warn!("Ignoring non-file item {} of {}", item.key(), core.tag());
                core.notify_failed_item(CacheError::IllegalArgument(format!(
                    "{} is not a file item",
                    item.key()
                )))
                .await;
                continue;
            }
            if self.queue.offer(item, operation.clone()).await {
                enqueued += 1;
            }
        }

        debug!(
            "Enqueued {} files of {} ({} already queued)",
            enqueued,
            core.tag(),
            core.total_items().await - enqueued
        );
        Ok(())
    }
}

impl Drop for FileDownloader {
    fn drop(&mut self) {
        for handle in self.agents.get_mut().iter() {
            handle.abort();
        }
    }
}
