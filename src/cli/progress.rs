//! Progress display fed by the operation status stream
//!
//! Every operation publishes snapshots of its progress to the registry.
//! [`ProgressDisplay`] follows that stream and renders the combined item
//! counts of all running operations as a single indicatif bar.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::cache::{StatusEvent, UpdateType};
use crate::constants::tags;

/// Item counts per operation tag
#[derive(Debug, Default)]
pub struct ProgressTotals {
    operations: HashMap<String, (usize, usize)>,
    bad_connections: usize,
    failed_items: usize,
}

impl ProgressTotals {
    /// Record a snapshot, returning whether the counts changed
    ///
    /// Wrapper operations are skipped; their sub-operations report the
    /// actual items.
    pub fn apply(&mut self, event: &StatusEvent) -> bool {
        if event.tag.starts_with(tags::PARENT_PREFIX) {
            return false;
        }
        match event.update.update_type {
            UpdateType::BadConnection => self.bad_connections += 1,
            UpdateType::ItemFailed => self.failed_items += 1,
            _ => {}
        }
        let counts = (event.update.processed_items, event.update.total_items);
        self.operations.insert(event.tag.clone(), counts) != Some(counts)
    }

    pub fn processed(&self) -> usize {
        self.operations.values().map(|(processed, _)| processed).sum()
    }

    pub fn total(&self) -> usize {
        self.operations.values().map(|(_, total)| total).sum()
    }

    pub fn bad_connections(&self) -> usize {
        self.bad_connections
    }

    pub fn failed_items(&self) -> usize {
        self.failed_items
    }
}

/// Live progress bar for one command
pub struct ProgressDisplay {
    bar: ProgressBar,
    task: Option<JoinHandle<()>>,
}

impl ProgressDisplay {
    /// Create a display; quiet displays draw nothing
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} items {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar, task: None }
    }

    /// Render snapshots from `events` until the display is finished
    pub fn follow(&mut self, mut events: broadcast::Receiver<StatusEvent>) {
        let bar = self.bar.clone();
        self.task = Some(tokio::spawn(async move {
            let mut totals = ProgressTotals::default();
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Progress display skipped {} status events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if totals.apply(&event) {
                    bar.set_length(totals.total() as u64);
                    bar.set_position(totals.processed() as u64);
                }
                let mut message = event.tag.clone();
                if totals.failed_items() > 0 {
                    message.push_str(&format!(" ({} failed)", totals.failed_items()));
                }
                if totals.bad_connections() > 0 {
                    message.push_str(&format!(" ({} retries)", totals.bad_connections()));
                }
                bar.set_message(message);
            }
        }));
    }

    /// Stop following and leave `message` on the finished bar
    pub fn finish(mut self, message: impl Into<String>) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.bar.is_hidden() {
            return;
        }
        self.bar.finish_with_message(message.into());
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::{CacheState, CacheStateUpdate};

    fn event(tag: &str, update_type: UpdateType, processed: usize, total: usize) -> StatusEvent {
        StatusEvent {
            tag: tag.to_string(),
            update: CacheStateUpdate {
                update_type,
                cache_state: CacheState::LoadingContent,
                processed_items: processed,
                total_items: total,
                operation: None,
                error: None,
            },
        }
    }

    #[test]
    fn test_totals_combine_operations() {
        let mut totals = ProgressTotals::default();
        assert!(totals.apply(&event("resources", UpdateType::Initial, 0, 3)));
        assert!(totals.apply(&event("taz/2024-01-31/regular", UpdateType::Initial, 0, 10)));
        assert!(totals.apply(&event("resources", UpdateType::ItemSuccessful, 1, 3)));
        assert!(totals.apply(&event("taz/2024-01-31/regular", UpdateType::ItemFailed, 1, 10)));

        assert_eq!(totals.processed(), 2);
        assert_eq!(totals.total(), 13);
        assert_eq!(totals.failed_items(), 1);
    }

    #[test]
    fn test_totals_skip_wrappers() {
        let mut totals = ProgressTotals::default();
        assert!(!totals.apply(&event("parent/taz/2024-01-31", UpdateType::Initial, 0, 3)));
        assert_eq!(totals.total(), 0);

        // A retry notification changes no counts
        totals.apply(&event("resources", UpdateType::Initial, 0, 2));
        assert!(!totals.apply(&event("resources", UpdateType::BadConnection, 0, 2)));
        assert_eq!(totals.bad_connections(), 1);
    }
}
