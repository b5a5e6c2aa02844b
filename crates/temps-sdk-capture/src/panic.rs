//! Panic capture
//!
//! Wraps the process panic hook. The panic is reported, then the hook that
//! was installed before runs as usual.

use std::cell::Cell;
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::json;
use temps_sdk::hooks::panic_message;
use temps_sdk::{BoxError, Client, EventContext, Exception, Plugin, PluginContext};
use tracing::debug;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

struct Installed {
    active: Arc<AtomicBool>,
    previous: Arc<PanicHook>,
}

/// Reports panics on any thread as error events
pub struct PanicCapture {
    installed: Mutex<Option<Installed>>,
}

impl Default for PanicCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl PanicCapture {
    pub const NAME: &'static str = "panic-capture";

    pub fn new() -> Self {
        Self {
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

fn report(client: &Weak<Client>, info: &PanicHookInfo<'_>) {
    // A panic raised while reporting (a tap, the transport) re-enters the
    // hook on this thread; only the outer panic is reported.
    if CAPTURING.with(|capturing| capturing.replace(true)) {
        return;
    }

    if let Some(client) = client.upgrade() {
        let message = panic_message(info.payload());
        let mut context = EventContext::new();
        context.insert("mechanism".to_string(), json!("panic"));
        if let Some(location) = info.location() {
            context.insert(
                "location".to_string(),
                json!(format!(
                    "{}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                )),
            );
        }
        if let Some(thread) = std::thread::current().name() {
            context.insert("thread".to_string(), json!(thread));
        }
        client.capture_exception(Exception::new(message), Some(context));
    }

    CAPTURING.with(|capturing| capturing.set(false));
}

impl Plugin for PanicCapture {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&self, context: &PluginContext) -> Result<(), BoxError> {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if installed.is_some() {
            return Err("panic capture is already installed".into());
        }

        let previous: Arc<PanicHook> = Arc::new(panic::take_hook());
        let active = Arc::new(AtomicBool::new(true));

        let client = context.downgrade();
        let chained = previous.clone();
        let enabled = active.clone();
        panic::set_hook(Box::new(move |info| {
            if enabled.load(Ordering::Acquire) {
                report(&client, info);
            }
            chained(info);
        }));

        *installed = Some(Installed { active, previous });
        debug!("Panic capture installed");
        Ok(())
    }

    /// Put the previous panic hook back
    ///
    /// Hooks installed after this one are replaced too, so capture sources
    /// should be cleaned up in reverse installation order.
    fn cleanup(&self) {
        let Some(installed) = self
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        installed.active.store(false, Ordering::Release);
        let previous = installed.previous;
        drop(panic::take_hook());
        panic::set_hook(Box::new(move |info| previous(info)));
        debug!("Panic capture removed");
    }
}
