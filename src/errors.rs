//! Error types for the issue cache
//!
//! This module defines the error types for all components of the crate. Cache
//! operation errors are cloneable so a terminal failure can be handed to every
//! caller awaiting the same operation.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Network failures reported by the remote API or the file transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    /// Transient failure, the request may succeed when retried
    #[error("Connection problem: {message}")]
    Recoverable { message: String },

    /// Server answered with a 5xx status
    #[error("Server unavailable: {message}")]
    ServerUnavailable { message: String },

    /// Request was rejected or the answer could not be understood
    #[error("Unexpected server response: {message}")]
    Implementation {
        message: String,
        status: Option<u16>,
    },
}

impl ConnectivityError {
    /// Create a recoverable error from any message
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable {
            message: message.into(),
        }
    }

    /// Check if the failure is worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConnectivityError::Recoverable { .. })
    }

    /// Map an HTTP status code to the matching error kind
    pub fn from_status(status: u16, url: &str) -> Self {
        match status {
            500..=599 => ConnectivityError::ServerUnavailable {
                message: format!("HTTP {} for {}", status, url),
            },
            _ => ConnectivityError::Implementation {
                message: format!("HTTP {} for {}", status, url),
                status: Some(status),
            },
        }
    }
}

impl From<reqwest::Error> for ConnectivityError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_request() || error.is_body() {
            ConnectivityError::Recoverable {
                message: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            ConnectivityError::from_status(status.as_u16(), error.url().map_or("", |u| u.as_str()))
        } else {
            ConnectivityError::Implementation {
                message: error.to_string(),
                status: None,
            }
        }
    }
}

/// Errors resolving or touching files in local storage
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// File I/O failed
    #[error("Storage I/O failed for {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Storage location could not be resolved
    #[error("Storage location for {name} could not be resolved: {reason}")]
    Unresolvable { name: String, reason: String },

    /// Atomic rename of a finished download failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },
}

impl StorageError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: error.to_string(),
        }
    }
}

/// Metadata store errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Entity lookup failed
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Snapshot could not be written or read
    #[error("Metadata persistence failed: {message}")]
    Persistence { message: String },
}

/// Cache operation errors
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// An operation finished in the failed state
    #[error("{message}")]
    OperationFailed {
        message: String,
        #[source]
        cause: Option<Arc<CacheError>>,
    },

    /// Operation used in a way its lifecycle does not allow
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Operation was handed a target it cannot process
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// Network failure
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    /// Local storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Metadata store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The task driving an operation panicked or was aborted
    #[error("Operation task for {tag} was aborted: {reason}")]
    TaskAborted { tag: String, reason: String },
}

impl CacheError {
    /// Create an operation failure without an underlying cause
    pub fn failed(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            message: message.into(),
            cause: None,
        }
    }

    /// Create an operation failure wrapping another error
    pub fn failed_with(message: impl Into<String>, cause: CacheError) -> Self {
        Self::OperationFailed {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Check if the failure, or the failure it wraps, is a recoverable connectivity problem
    pub fn is_recoverable_connectivity(&self) -> bool {
        match self {
            CacheError::Connectivity(e) => e.is_recoverable(),
            CacheError::OperationFailed {
                cause: Some(cause), ..
            } => cause.is_recoverable_connectivity(),
            _ => false,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file exists but could not be read
    #[error("Failed to read configuration file {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    /// Invalid configuration format
    #[error("Invalid configuration format in {path}: {source}")]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Cache operation error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Cache(CacheError::Connectivity(e)) => e.is_recoverable(),
            AppError::Cache(CacheError::OperationFailed {
                cause: Some(cause), ..
            }) => cause.is_recoverable_connectivity(),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Cache(CacheError::Connectivity(_)) => "network",
            AppError::Cache(CacheError::Storage(_)) => "storage",
            AppError::Cache(CacheError::Store(_)) => "metadata",
            AppError::Cache(_) => "cache",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;
