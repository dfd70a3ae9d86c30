//! Download telemetry for issue downloads
//!
//! Reports start and duration of an issue download to the server. Telemetry
//! never influences the download: every failure is logged and dropped.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::app::models::IssueKey;
use crate::app::services::RemoteApi;

/// Reports the start and stop of one issue download
pub struct IssueDownloadNotifier {
    api: Arc<dyn RemoteApi>,
    issue: IssueKey,
    is_automatic: bool,
    started_at: Option<Instant>,
    download_id: Option<String>,
}

impl IssueDownloadNotifier {
    pub fn new(api: Arc<dyn RemoteApi>, issue: IssueKey, is_automatic: bool) -> Self {
        Self {
            api,
            issue,
            is_automatic,
            started_at: None,
            download_id: None,
        }
    }

    /// Record the start time and announce the download
    pub async fn start(&mut self) {
        self.started_at = Some(Instant::now());
        match self
            .api
            .notify_download_start(&self.issue.feed_name, self.issue.date, self.is_automatic)
            .await
        {
            Ok(download_id) => {
                debug!("Download of {} registered as {}", self.issue.tag(), download_id);
                self.download_id = Some(download_id);
            }
            Err(e) => warn!(
                "Could not report download start of {}: {}",
                self.issue.tag(),
                e
            ),
        }
    }

    /// Report the time taken since [`start`](Self::start)
    pub async fn stop(&mut self) {
        let (Some(download_id), Some(started_at)) = (self.download_id.take(), self.started_at)
        else {
            debug!("Download of {} was not registered, nothing to stop", self.issue.tag());
            return;
        };

        let seconds_taken = started_at.elapsed().as_secs_f64();
        if let Err(e) = self
            .api
            .notify_download_stop(&download_id, seconds_taken)
            .await
        {
            warn!(
                "Could not report download stop of {}: {}",
                self.issue.tag(),
                e
            );
        }
    }
}
