//! Host signal hub
//!
//! A window-like event target the host application feeds with platform
//! signals. It has one replaceable error-handler slot (the `onerror`
//! equivalent) and any number of listeners keyed by signal kind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use temps_sdk::hooks::panic_message;
use temps_sdk::Exception;
use tracing::{debug, warn};

/// An uncaught error as reported by the host
#[derive(Debug, Clone, Default)]
pub struct ErrorSignal {
    pub message: String,
    pub source: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// The error object, when the host has one
    pub error: Option<Exception>,
}

impl ErrorSignal {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: Exception) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_location(mut self, source: impl Into<String>, line: u32, column: u32) -> Self {
        self.source = Some(source.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// The error object, or one built from the message
    pub fn to_exception(&self) -> Exception {
        match &self.error {
            Some(error) => error.clone(),
            None => Exception::new(self.message.clone()),
        }
    }
}

/// Why a promise-like operation was rejected without a handler
#[derive(Debug, Clone)]
pub enum RejectionReason {
    Error(Exception),
    Value(Value),
}

impl RejectionReason {
    /// Non-error reasons are wrapped so every event carries a message and stack
    pub fn into_exception(self) -> Exception {
        match self {
            RejectionReason::Error(exception) => exception,
            RejectionReason::Value(Value::String(reason)) => Exception::from_reason(reason),
            RejectionReason::Value(value) => Exception::from_reason(value),
        }
    }
}

/// Timing entries, modeled on the browser Performance Timeline
#[derive(Debug, Clone, PartialEq)]
pub enum PerformanceEntry {
    LayoutShift {
        value: f64,
        had_recent_input: bool,
    },
    LargestContentfulPaint {
        start_time: f64,
    },
    Paint {
        name: String,
        start_time: f64,
    },
    FirstInput {
        start_time: f64,
        processing_start: f64,
    },
    Navigation {
        request_start: f64,
        response_start: f64,
    },
    Interaction {
        interaction_id: u64,
        duration: f64,
    },
}

#[derive(Debug, Clone)]
pub enum HostSignal {
    Error(ErrorSignal),
    UnhandledRejection(RejectionReason),
    Performance(PerformanceEntry),
    /// A new page view started; per-page accumulators reset
    PageView { url: String },
}

impl HostSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            HostSignal::Error(_) => SignalKind::Error,
            HostSignal::UnhandledRejection(_) => SignalKind::UnhandledRejection,
            HostSignal::Performance(_) => SignalKind::Performance,
            HostSignal::PageView { .. } => SignalKind::PageView,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalKind {
    Error,
    UnhandledRejection,
    Performance,
    PageView,
}

/// Returns `true` when the error was fully handled
pub type ErrorHandler = Arc<dyn Fn(&ErrorSignal) -> bool + Send + Sync>;

pub type Listener = Arc<dyn Fn(&HostSignal) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct SignalHub {
    error_handler: RwLock<Option<ErrorHandler>>,
    listeners: RwLock<BTreeMap<ListenerId, (SignalKind, Listener)>>,
    next_id: AtomicU64,
}

impl SignalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn error_handler(&self) -> Option<ErrorHandler> {
        self.error_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a handler in the error slot, returning the one it replaced
    pub fn set_error_handler(&self, handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
        let mut slot = self
            .error_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, handler)
    }

    pub fn add_listener(&self, kind: SignalKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (kind, listener));
        debug!(kind = ?kind, id = id.0, "Added signal listener");
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn listener_count(&self, kind: SignalKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(listener_kind, _)| *listener_kind == kind)
            .count()
    }

    /// Deliver a signal: the error slot first (errors only), then listeners
    /// in the order they were added
    ///
    /// Returns whether the error handler reported the error as handled.
    pub fn dispatch(&self, signal: HostSignal) -> bool {
        let mut handled = false;
        if let HostSignal::Error(error) = &signal {
            if let Some(handler) = self.error_handler() {
                handled = handler(error);
            }
        }

        let kind = signal.kind();
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(listener_kind, _)| *listener_kind == kind)
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if let Err(payload) =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&signal)))
            {
                warn!(
                    kind = ?kind,
                    error = %panic_message(payload.as_ref()),
                    "Signal listener panicked"
                );
            }
        }

        handled
    }
}
