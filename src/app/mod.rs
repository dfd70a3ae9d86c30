//! Core application logic of the issue cache
//!
//! This module contains the data model, the cache operations and the
//! components they run against: the metadata store, local storage, the file
//! downloader and the remote API client.
//!
//! # Examples
//!
//! ```rust,no_run
//! use issue_cache::app::{ContentService, DownloadPriority, IssuePublication};
//! use issue_cache::config::AppConfig;
//! use chrono::NaiveDate;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None).await?;
//! let service = ContentService::from_config(&config).await?;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
//! service
//!     .download_issue_publication_to_cache(
//!         IssuePublication::new("taz", date),
//!         DownloadPriority::High,
//!         false,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod hash;
pub mod models;
pub mod queue;
pub mod service;
pub mod services;
pub mod storage;
pub mod store;
pub mod worker;

// Re-export main public API
pub use cache::{
    CacheContext, CacheOperation, CacheSettings, CacheState, CacheStateUpdate, DownloadPriority,
    OperationRegistry, RetryPolicy, StatusEvent, UpdateType,
};
pub use client::{ApiConfig, HttpApiClient};
pub use hash::Sha256Hash;
pub use models::{
    Collection, DownloadTarget, FileEntry, Issue, IssueKey, IssuePublication, IssueStatus,
    ResourceInfo, StorageLocation, StorageType,
};
pub use queue::TransferQueue;
pub use service::ContentService;
pub use services::{FileTransport, MetadataStore, RemoteApi, StorageService};
pub use storage::FsStorageService;
pub use store::MemoryMetadataStore;
pub use worker::{FileDownloader, TransportConfig};
