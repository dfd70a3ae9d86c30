//! Application constants for the issue cache
//!
//! This module centralizes the constants used throughout the crate,
//! organized by functional domain.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Bearer token sent with every API request
    pub const API_TOKEN: &str = "ISSUE_CACHE_API_TOKEN";

    /// Overrides the API base URL from the configuration
    pub const API_URL: &str = "ISSUE_CACHE_API_URL";
}

/// Configuration file locations
pub mod config {
    /// Directory below the user's config and data directories
    pub const APP_DIR: &str = "issue-cache";

    /// File name inside the user config directory
    pub const CONFIG_FILE: &str = "config.toml";

    /// Project-local configuration file
    pub const LOCAL_CONFIG_FILE: &str = "issue-cache.toml";
}

/// Remote API paths, relative to the configured base URL
pub mod api {
    pub const ISSUES: &str = "issues";
    pub const MOMENTS: &str = "moments";
    pub const FRONT_PAGES: &str = "frontpages";
    pub const APP_INFO: &str = "app-info";
    pub const RESOURCES: &str = "resources";
    pub const DOWNLOADS: &str = "downloads";
}

/// Tag conventions shared by operations and callers
pub mod tags {
    /// Prefix of the tag a wrapped download registers under
    pub const PARENT_PREFIX: &str = "parent/";

    /// Suffix of download tags for issues that include their PDF pages
    pub const PDF_SUFFIX: &str = "/pdf";

    /// Download tag of the shared resource pack
    pub const RESOURCES: &str = "resources";

    pub const MOMENT_PREFIX: &str = "moment/";
    pub const FRONT_PAGE_PREFIX: &str = "frontpage/";

    /// Download tag of the app info
    pub const APP_INFO: &str = "app-info";
}

/// Storage layout constants
pub mod storage {
    /// Folder of the shared resource pack below the storage root
    pub const RESOURCE_FOLDER: &str = "resources";

    /// Folder of files shared across issues below the storage root
    pub const GLOBAL_FOLDER: &str = "global";

    /// Folder used for the internal storage location
    pub const INTERNAL_FOLDER: &str = "internal";

    /// Folder used for the external storage location
    pub const EXTERNAL_FOLDER: &str = "external";

    /// Suffix appended to files while they are being written
    pub const TEMP_FILE_SUFFIX: &str = ".part";

    /// File name of the metadata snapshot
    pub const METADATA_FILE: &str = "metadata.json";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("issue-cache/", env!("CARGO_PKG_VERSION"));

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Transfer agent constants
pub mod transport {
    use super::Duration;

    /// Number of files downloaded at the same time
    pub const MAX_SIMULTANEOUS_DOWNLOADS: usize = 4;

    /// Base delay before retrying a failed connection
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

    /// Upper bound of the retry delay
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Maximum backoff exponent
    pub const MAX_BACKOFF_MULTIPLIER: u32 = 6;

    /// Jitter applied to backoff delays
    pub const BACKOFF_JITTER_PERCENTAGE: f64 = 0.2;
}

/// Cache operation constants
pub mod cache {
    /// Capacity of the cross-operation status channel
    pub const STATUS_CHANNEL_CAPACITY: usize = 256;
}
