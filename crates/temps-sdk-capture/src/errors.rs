//! Uncaught error and unhandled rejection capture

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;
use temps_sdk::{BoxError, EventContext, Plugin, PluginContext};
use tracing::{debug, warn};

use crate::host::{ErrorHandler, ErrorSignal, HostSignal, ListenerId, SignalHub, SignalKind};

struct Installed {
    handler: ErrorHandler,
    previous: Option<ErrorHandler>,
    rejection_listener: ListenerId,
}

/// Reports host errors and unhandled rejections to the client
///
/// Installs itself in the hub's error slot and calls through to whatever
/// handler was there before, so other instrumentation keeps working.
pub struct GlobalErrorCapture {
    hub: Arc<SignalHub>,
    installed: Mutex<Option<Installed>>,
}

impl GlobalErrorCapture {
    pub const NAME: &'static str = "global-error-capture";

    pub fn new(hub: Arc<SignalHub>) -> Self {
        Self {
            hub,
            installed: Mutex::new(None),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

fn error_context(signal: &ErrorSignal) -> EventContext {
    let mut context = EventContext::new();
    context.insert("mechanism".to_string(), json!("onerror"));
    if let Some(source) = &signal.source {
        context.insert("source".to_string(), json!(source));
    }
    if let Some(line) = signal.line {
        context.insert("line".to_string(), json!(line));
    }
    if let Some(column) = signal.column {
        context.insert("column".to_string(), json!(column));
    }
    context
}

impl Plugin for GlobalErrorCapture {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&self, context: &PluginContext) -> Result<(), BoxError> {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if installed.is_some() {
            return Err("global error capture is already installed".into());
        }

        let previous = self.hub.error_handler();
        let client = context.downgrade();
        let chained = previous.clone();
        let handler: ErrorHandler = Arc::new(move |signal: &ErrorSignal| {
            if let Some(client) = client.upgrade() {
                client.capture_exception(signal.to_exception(), Some(error_context(signal)));
            }
            match &chained {
                Some(previous) => previous(signal),
                None => false,
            }
        });
        self.hub.set_error_handler(Some(handler.clone()));

        let client = context.downgrade();
        let rejection_listener = self.hub.add_listener(
            SignalKind::UnhandledRejection,
            Arc::new(move |signal: &HostSignal| {
                let HostSignal::UnhandledRejection(reason) = signal else {
                    return;
                };
                if let Some(client) = client.upgrade() {
                    let mut context = EventContext::new();
                    context.insert("mechanism".to_string(), json!("onunhandledrejection"));
                    client.capture_exception(reason.clone().into_exception(), Some(context));
                }
            }),
        );

        *installed = Some(Installed {
            handler,
            previous,
            rejection_listener,
        });
        debug!("Global error capture installed");
        Ok(())
    }

    /// Remove the rejection listener and put the previous error handler back
    ///
    /// If another handler replaced ours in the meantime it is left in place.
    fn cleanup(&self) {
        let Some(installed) = self
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        self.hub.remove_listener(installed.rejection_listener);

        let current = self.hub.error_handler();
        match current {
            Some(current) if Arc::ptr_eq(&current, &installed.handler) => {
                self.hub.set_error_handler(installed.previous);
            }
            _ => warn!("Error handler was replaced after installation, leaving it in place"),
        }
        debug!("Global error capture removed");
    }
}
