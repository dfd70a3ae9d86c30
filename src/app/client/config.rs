//! API client configuration and building logic

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{env, http};
use crate::errors::ConfigError;

/// Configuration of the remote API client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL all endpoint paths are resolved against
    pub base_url: String,
    /// Bearer token; read from the environment when not configured
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.org/v1/".to_string(),
            token: None,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            user_agent: http::USER_AGENT.to_string(),
        }
    }
}

impl ApiConfig {
    /// Fill the token and base URL from the environment where set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(env::API_URL) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        if self.token.is_none() {
            self.token = std::env::var(env::API_TOKEN)
                .ok()
                .filter(|token| !token.trim().is_empty());
        }
        self
    }

    /// Parsed base URL, always ending in a slash so paths join below it
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut base = self.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).map_err(|e| ConfigError::InvalidValue {
            field: "api.base_url".to_string(),
            value: self.base_url.clone(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url".to_string(),
                value: self.base_url.clone(),
                reason: "Only http and https are supported".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "api.request_timeout".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Build the HTTP client, with the bearer token as a default header
    pub fn build_http_client(&self) -> Result<Client, ConfigError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ConfigError::InvalidValue {
                    field: "api.token".to_string(),
                    value: "<redacted>".to_string(),
                    reason: "Token contains characters not allowed in a header".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Client::builder()
            .default_headers(headers)
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "api".to_string(),
                value: self.base_url.clone(),
                reason: e.to_string(),
            })
    }
}
