//! Transfer agent configuration
//!
//! Configuration for the file downloader, with validation and presets for
//! production and test use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{http, transport};
use crate::errors::ConfigError;

/// Configuration of the file downloader and its agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Number of agents transferring files at the same time
    pub max_simultaneous_downloads: usize,
    /// Retries per file after a recoverable connection failure; `None` retries forever
    pub max_retries: Option<u32>,
    /// Base delay between retries (exponential backoff)
    pub retry_base_delay: Duration,
    /// Maximum retry delay (backoff cap)
    pub retry_max_delay: Duration,
    /// Timeout of a single file request
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_simultaneous_downloads: transport::MAX_SIMULTANEOUS_DOWNLOADS,
            max_retries: None,
            retry_base_delay: transport::RETRY_BASE_DELAY,
            retry_max_delay: transport::RETRY_MAX_DELAY,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            user_agent: http::USER_AGENT.to_string(),
        }
    }
}

impl TransportConfig {
    /// Short delays, bounded retries and two agents
    pub fn for_testing() -> Self {
        Self {
            max_simultaneous_downloads: 2,
            max_retries: Some(2),
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `retries` retries
    pub fn allows_retry(&self, retries: u32) -> bool {
        self.max_retries.map_or(true, |max| retries < max)
    }

    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_simultaneous_downloads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transport.max_simultaneous_downloads".to_string(),
                value: "0".to_string(),
                reason: "At least one download must be allowed".to_string(),
            });
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(ConfigError::InvalidValue {
                field: "transport.retry_base_delay".to_string(),
                value: format!("{:?}", self.retry_base_delay),
                reason: format!("Must not exceed retry_max_delay ({:?})", self.retry_max_delay),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "transport.request_timeout".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be positive".to_string(),
            });
        }

        Ok(())
    }
}
