//! Error types for the Temps SDK
//!
//! Only configuration-time operations return [`SdkError`]. Runtime capture and
//! delivery never surface errors to the host application: transport failures
//! become [`TransportError`] values inside a response plus a dropped-event record.

use thiserror::Error;

/// Boxed error returned by plugin setup
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Configuration and initialization errors
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Invalid DSN '{dsn}': {reason}")]
    InvalidDsn { dsn: String, reason: String },

    #[error("Plugin '{plugin}' failed to set up: {source}")]
    PluginSetup {
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("A Tokio runtime is required to start the transport worker")]
    RuntimeUnavailable,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Offline store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of a single delivery attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server responded with status {0}")]
    Status(u16),

    #[error("Beacon rejected payload of {size} bytes")]
    BeaconRejected { size: usize },

    #[error("Request task failed: {0}")]
    Panicked(String),
}

impl TransportError {
    /// Whether the same request may succeed later without modification
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout => true,
            TransportError::Status(code) => *code == 429 || *code >= 500,
            TransportError::BeaconRejected { .. } | TransportError::Panicked(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = err.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Offline store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Result type alias for SDK configuration operations
pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Network("connection reset".to_string()).is_retryable());
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Status(503).is_retryable());
        assert!(TransportError::Status(429).is_retryable());
        assert!(!TransportError::Status(400).is_retryable());
        assert!(!TransportError::BeaconRejected { size: 70_000 }.is_retryable());
        assert!(!TransportError::Panicked("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_plugin_setup_error_display() {
        let err = SdkError::PluginSetup {
            plugin: "redact".to_string(),
            source: "missing pattern".into(),
        };
        assert_eq!(
            err.to_string(),
            "Plugin 'redact' failed to set up: missing pattern"
        );
    }
}
