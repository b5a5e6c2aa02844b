//! Optional process-wide "current client"
//!
//! Convenience for code that cannot easily receive a client handle. Clients
//! remain fully usable without it, and tests should construct clients directly.

use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::client::Client;
use crate::error::Result;
use crate::event::{EventContext, Exception};
use crate::options::ClientOptions;

static CURRENT_CLIENT: Lazy<RwLock<Option<Arc<Client>>>> = Lazy::new(|| RwLock::new(None));

/// Build a client and make it the current one
pub fn init(options: ClientOptions) -> Result<Arc<Client>> {
    let client = Client::new(options)?;
    set_current_client(Some(client.clone()));
    Ok(client)
}

/// Replace the current client, returning the previous one
pub fn set_current_client(client: Option<Arc<Client>>) -> Option<Arc<Client>> {
    debug!(installed = client.is_some(), "Setting current client");
    let mut slot = CURRENT_CLIENT
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, client)
}

pub fn current_client() -> Option<Arc<Client>> {
    CURRENT_CLIENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Capture through the current client; `false` when none is installed
pub fn capture_exception(exception: Exception, context: Option<EventContext>) -> bool {
    current_client().is_some_and(|client| client.capture_exception(exception, context))
}

/// Capture through the current client; `false` when none is installed
pub fn capture_performance(
    metric: impl Into<String>,
    value: f64,
    context: Option<EventContext>,
) -> bool {
    current_client().is_some_and(|client| client.capture_performance(metric, value, context))
}

/// Flush the current client; `false` when none is installed
pub async fn flush() -> bool {
    match current_client() {
        Some(client) => client.flush().await,
        None => false,
    }
}
