//! Configuration management for the issue cache
//!
//! This module provides unified configuration management with multi-source
//! loading and zero-config defaults. The TOML sections are converted into the
//! runtime configurations of the individual components.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::{CacheSettings, RetryPolicy};
use crate::app::client::ApiConfig;
use crate::app::models::{IssueStatus, StorageLocation};
use crate::app::worker::TransportConfig;
use crate::constants::{cache, config as paths, http, transport};
use crate::errors::ConfigError;

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Local storage settings
    pub storage: StorageConfigToml,
    /// Remote API settings
    pub api: ApiConfigToml,
    /// File transfer settings
    pub transport: TransportConfigToml,
    /// Cache operation settings
    pub cache: CacheConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfigToml {
    /// Storage root (leave empty to use the user data directory)
    pub root: Option<PathBuf>,
    /// Storage area new downloads are assigned to
    pub location: StorageLocation,
}

/// TOML-friendly API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfigToml {
    pub base_url: String,
    /// Base URL of files shared between issues
    pub global_base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfigToml {
    fn default() -> Self {
        let api = ApiConfig::default();
        Self {
            global_base_url: format!("{}global", api.base_url),
            base_url: api.base_url,
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
        }
    }
}

/// TOML-friendly transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfigToml {
    pub max_simultaneous_downloads: usize,
    /// Retries per file after a connection failure (unset = retry forever)
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_secs: u64,
}

impl Default for TransportConfigToml {
    fn default() -> Self {
        Self {
            max_simultaneous_downloads: transport::MAX_SIMULTANEOUS_DOWNLOADS,
            max_retries: None,
            retry_base_delay_ms: transport::RETRY_BASE_DELAY.as_millis() as u64,
            retry_max_delay_secs: transport::RETRY_MAX_DELAY.as_secs(),
        }
    }
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Lowest issue status a metadata download accepts
    pub min_issue_status: IssueStatus,
    /// Download PDF pages together with every issue
    pub pdf_additionally: bool,
    /// Retries of metadata requests (unset = retry forever)
    pub metadata_retries: Option<u32>,
    /// Capacity of the status event channel
    pub status_channel_capacity: usize,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            min_issue_status: IssueStatus::Public,
            pdf_additionally: false,
            metadata_retries: None,
            status_channel_capacity: cache::STATUS_CHANNEL_CAPACITY,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            colored_output: true,
        }
    }
}

impl AppConfig {
    /// Load configuration with multi-source precedence:
    /// 1. Explicit config file
    /// 2. `./issue-cache.toml`
    /// 3. User config directory
    /// 4. Default values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if an explicit file does not exist,
    /// and a format or validation error if the file found is invalid
    pub async fn load(config_file_override: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match config_file_override {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(paths::LOCAL_CONFIG_FILE)];
        if let Some(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        search_paths.into_iter().find(|path| {
            let exists = path.exists();
            if exists {
                debug!("Found config file: {}", path.display());
            }
            exists
        })
    }

    /// Config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::APP_DIR).join(paths::CONFIG_FILE))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;

        let config: AppConfig =
            toml::from_str(&content).map_err(|source| ConfigError::InvalidFormat {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Check every section, collecting all problems
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Err(e) = self.transport_config().validate() {
            errors.push(e.to_string());
        }
        if let Err(e) = self.api_config().validate() {
            errors.push(e.to_string());
        }
        if self.api.global_base_url.trim().is_empty() {
            errors.push("api.global_base_url must not be empty".to_string());
        }
        if self.cache.status_channel_capacity == 0 {
            errors.push("cache.status_channel_capacity must be positive".to_string());
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            errors.push(format!("logging.level '{}' is not a valid filter", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }

    /// Storage root, falling back to the user data directory
    pub fn storage_root(&self) -> PathBuf {
        self.storage.root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join(paths::APP_DIR))
                .unwrap_or_else(|| PathBuf::from(".").join(paths::APP_DIR))
        })
    }

    /// Settings read by the cache operations
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            storage_location: self.storage.location,
            global_base_url: self.api.global_base_url.clone(),
            min_issue_status: self.cache.min_issue_status,
            metadata_retry: self
                .cache
                .metadata_retries
                .map_or(RetryPolicy::Indefinitely, RetryPolicy::Limited),
            retry_base_delay: Duration::from_millis(self.transport.retry_base_delay_ms),
            retry_max_delay: Duration::from_secs(self.transport.retry_max_delay_secs),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            max_simultaneous_downloads: self.transport.max_simultaneous_downloads,
            max_retries: self.transport.max_retries,
            retry_base_delay: Duration::from_millis(self.transport.retry_base_delay_ms),
            retry_max_delay: Duration::from_secs(self.transport.retry_max_delay_secs),
            request_timeout: Duration::from_secs(self.api.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.api.connect_timeout_secs),
            ..TransportConfig::default()
        }
    }

    /// API client configuration, with environment overrides applied
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api.base_url.clone(),
            request_timeout: Duration::from_secs(self.api.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.api.connect_timeout_secs),
            ..ApiConfig::default()
        }
        .with_env_overrides()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let settings = config.cache_settings();
        assert_eq!(settings.metadata_retry, RetryPolicy::Indefinitely);
        assert_eq!(settings.storage_location, StorageLocation::Internal);
        assert_eq!(
            config.transport_config().max_simultaneous_downloads,
            transport::MAX_SIMULTANEOUS_DOWNLOADS
        );
    }

    #[tokio::test]
    async fn test_config_loading_nonexistent_file() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/issue-cache.toml"))).await;
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_config_loading_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("issue-cache.toml");
        tokio::fs::write(
            &path,
            r#"
[storage]
root = "/var/lib/issues"
location = "external"

[transport]
max_simultaneous_downloads = 8
max_retries = 5

[cache]
min_issue_status = "regular"
pdf_additionally = true
metadata_retries = 3
"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.storage_root(), PathBuf::from("/var/lib/issues"));
        assert!(config.cache.pdf_additionally);

        // Sections not given keep their defaults
        assert_eq!(config.logging.level, "info");

        let settings = config.cache_settings();
        assert_eq!(settings.storage_location, StorageLocation::External);
        assert_eq!(settings.min_issue_status, IssueStatus::Regular);
        assert_eq!(settings.metadata_retry, RetryPolicy::Limited(3));

        let transport = config.transport_config();
        assert_eq!(transport.max_simultaneous_downloads, 8);
        assert_eq!(transport.max_retries, Some(5));
    }

    #[tokio::test]
    async fn test_invalid_files_are_rejected() {
        let temp_dir = TempDir::new().unwrap();

        let malformed = temp_dir.path().join("malformed.toml");
        tokio::fs::write(&malformed, "[transport\nmax = ").await.unwrap();
        assert!(matches!(
            AppConfig::load(Some(&malformed)).await,
            Err(ConfigError::InvalidFormat { .. })
        ));

        let invalid = temp_dir.path().join("invalid.toml");
        tokio::fs::write(
            &invalid,
            "[transport]\nmax_simultaneous_downloads = 0\n[cache]\nstatus_channel_capacity = 0\n",
        )
        .await
        .unwrap();
        match AppConfig::load(Some(&invalid)).await {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
