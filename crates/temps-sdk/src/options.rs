//! Client configuration

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::dsn::Dsn;
use crate::error::{Result, SdkError};
use crate::offline::{OfflineStore, SqliteOfflineStore};
use crate::plugin::Plugin;
use crate::transport::{CategoryClassifier, DropRecorder, Transport, DEFAULT_QUEUE_CAPACITY};

/// Whether the transport may touch the network
///
/// Always explicit; nothing is inferred from build profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => f.write_str("production"),
            Environment::Development => f.write_str("development"),
        }
    }
}

/// What the host environment can do, resolved once into a request strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// A fire-and-forget beacon primitive is available
    pub beacon: bool,
    /// Callers need the server response (status codes)
    pub response_required: bool,
}

/// Options passed to [`crate::Client::new`]
pub struct ClientOptions {
    pub dsn: Dsn,
    pub environment: Environment,
    /// Pre-built transport; when absent one is built from the fields below
    pub transport: Option<Transport>,
    /// Registered in order when the client is created
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub queue_capacity: usize,
    pub capabilities: Capabilities,
    pub request_timeout: Duration,
    pub offline_store: Option<Arc<dyn OfflineStore>>,
    pub category_classifier: Option<CategoryClassifier>,
    pub drop_recorder: Option<DropRecorder>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("dsn", &self.dsn.to_string())
            .field("environment", &self.environment)
            .field("transport", &self.transport)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("queue_capacity", &self.queue_capacity)
            .field("capabilities", &self.capabilities)
            .field("request_timeout", &self.request_timeout)
            .field("offline_store", &self.offline_store.is_some())
            .finish()
    }
}

impl ClientOptions {
    pub fn new(dsn: Dsn) -> Self {
        Self {
            dsn,
            environment: Environment::default(),
            transport: None,
            plugins: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            capabilities: Capabilities::default(),
            request_timeout: Duration::from_secs(30),
            offline_store: None,
            category_classifier: None,
            drop_recorder: None,
        }
    }

    /// Parse the DSN and build default options
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        Ok(Self::new(Dsn::parse(dsn)?))
    }

    /// Build options from `TEMPS_*` environment variables
    ///
    /// - `TEMPS_DSN` (required)
    /// - `TEMPS_ENVIRONMENT`: `production` enables delivery, anything else is development
    /// - `TEMPS_QUEUE_CAPACITY`: dispatch queue size
    /// - `TEMPS_BEACON`: `true` to prefer beacon-style delivery
    /// - `TEMPS_OFFLINE_DB`: SQLite path for the durable offline store
    pub fn from_env() -> Result<Self> {
        let dsn = std::env::var("TEMPS_DSN")
            .map_err(|_| SdkError::Configuration("TEMPS_DSN is not set".to_string()))?;
        let mut options = Self::from_dsn(&dsn)?;

        if let Ok(environment) = std::env::var("TEMPS_ENVIRONMENT") {
            options.environment = environment.parse().unwrap_or_default();
        }
        options.queue_capacity = std::env::var("TEMPS_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);
        options.capabilities.beacon = std::env::var("TEMPS_BEACON")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);
        if let Ok(path) = std::env::var("TEMPS_OFFLINE_DB") {
            options.offline_store = Some(Arc::new(SqliteOfflineStore::open(path)?));
        }

        Ok(options)
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_offline_store(mut self, store: Arc<dyn OfflineStore>) -> Self {
        self.offline_store = Some(store);
        self
    }

    pub fn with_category_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.category_classifier = Some(Arc::new(classifier));
        self
    }

    pub fn with_drop_recorder(mut self, recorder: DropRecorder) -> Self {
        self.drop_recorder = Some(recorder);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(
            "staging".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!(Environment::default(), Environment::Development);
    }

    #[test]
    fn test_client_options_defaults() {
        let options = ClientOptions::from_dsn("https://key@temps.example.com/3").unwrap();
        assert_eq!(options.environment, Environment::Development);
        assert_eq!(options.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(options.plugins.is_empty());
        assert!(options.transport.is_none());
        assert_eq!(options.capabilities, Capabilities::default());
    }

    #[test]
    fn test_client_options_rejects_bad_dsn() {
        assert!(ClientOptions::from_dsn("not a dsn").is_err());
    }
}
