//! Transfer queue shared by the file download agents
//!
//! Content downloads hand their file items to a single [`TransferQueue`].
//! Agents take the most urgent item, transfer it and report the result to
//! every operation that asked for that file.
//!
//! # Behaviour
//!
//! - **Deduplication**: a file already waiting is not queued again; the
//!   second operation is attached to the waiting item instead
//! - **Dynamic priority**: items are ordered by their operation's current
//!   priority when they are taken, oldest first among equals
//! - **Blocking receive**: [`TransferQueue::next`] waits until an item is offered
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use issue_cache::app::cache::ContentDownload;
//! use issue_cache::app::queue::TransferQueue;
//!
//! # async fn example(queue: Arc<TransferQueue<ContentDownload>>) {
//! let transfer = queue.next().await;
//! println!(
//!     "{} requested by {} operations",
//!     transfer.key(),
//!     transfer.operations.len()
//! );
//! # }
//! ```

pub mod core;
pub mod types;

#[cfg(test)]
mod tests;

pub use core::TransferQueue;
pub use types::{QueueStats, Transfer};
