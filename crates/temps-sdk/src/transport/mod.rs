//! Event delivery
//!
//! The transport is the only component that touches the network. Callers hand
//! it serialized payloads; it answers with a [`TransportResponse`] and never
//! fails across its boundary. Delivery failures become dropped-event records
//! (and, for retryable failures, offline store entries).
//!
//! Payloads dispatched from the synchronous capture path go through a bounded
//! queue drained by a single worker task, so delivery attempts happen in
//! dispatch order. [`Transport::flush`] places a barrier in that queue.

mod drops;
mod request;

pub use drops::{
    classify_by_event_type, CategoryClassifier, DropCounter, DropReason, DropRecorder,
    DroppedEvent, DEFAULT_CATEGORY,
};
pub use request::{BeaconRequest, FetchRequest, RequestStrategy, BEACON_MAX_PAYLOAD};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Result, SdkError, TransportError};
use crate::hooks::panic_message;
use crate::offline::{OfflineStore, PendingRequest};
use crate::options::Environment;

/// Default number of payloads the dispatch queue holds before overflowing
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// An already-serialized payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub payload: String,
}

/// Outcome of a send; an empty response means success without details
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportResponse {
    pub status_code: Option<u16>,
    pub error: Option<TransportError>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A single outbound delivery primitive
#[async_trait]
pub trait MakeRequest: Send + Sync {
    /// Where requests are delivered; used as the offline store identity
    fn destination(&self) -> &str;

    async fn make_request(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// Transport configuration
#[derive(Clone)]
pub struct TransportOptions {
    pub environment: Environment,
    pub queue_capacity: usize,
    pub category_classifier: Option<CategoryClassifier>,
    pub drop_recorder: Option<DropRecorder>,
    pub offline_store: Option<Arc<dyn OfflineStore>>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new(Environment::Development)
    }
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("environment", &self.environment)
            .field("queue_capacity", &self.queue_capacity)
            .field("category_classifier", &self.category_classifier.is_some())
            .field("drop_recorder", &self.drop_recorder.is_some())
            .field("offline_store", &self.offline_store.is_some())
            .finish()
    }
}

impl TransportOptions {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            category_classifier: None,
            drop_recorder: None,
            offline_store: None,
        }
    }

    pub fn production() -> Self {
        Self::new(Environment::Production)
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
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

    pub fn with_offline_store(mut self, store: Arc<dyn OfflineStore>) -> Self {
        self.offline_store = Some(store);
        self
    }
}

enum Command {
    Deliver(String),
    Barrier(oneshot::Sender<()>),
}

struct TransportCore {
    environment: Environment,
    make_request: Arc<dyn MakeRequest>,
    category_classifier: Option<CategoryClassifier>,
    drop_recorder: Option<DropRecorder>,
    offline_store: Option<Arc<dyn OfflineStore>>,
    offline_pending: AtomicBool,
    replay_lock: Mutex<()>,
}

impl TransportCore {
    async fn send(&self, payload: String) -> TransportResponse {
        if !self.environment.is_production() {
            info!(
                target: "temps_sdk::transport",
                payload = %payload,
                "Non-production environment, event not sent"
            );
            return TransportResponse::default();
        }

        match self.attempt(payload.clone()).await {
            Ok(response) => {
                if self.offline_pending.load(Ordering::Acquire) {
                    self.replay_offline().await;
                }
                response
            }
            Err(error) => {
                warn!(
                    destination = %self.make_request.destination(),
                    error = %error,
                    "Failed to deliver event"
                );
                if error.is_retryable() {
                    self.persist_offline(&payload).await;
                }
                self.record_drop(DropReason::NetworkError, payload);
                TransportResponse {
                    status_code: Some(500),
                    error: Some(error),
                }
            }
        }
    }

    /// One call to the request primitive with panics converted into errors
    async fn attempt(
        &self,
        payload: String,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let request = TransportRequest { payload };
        let future =
            match catch_unwind(AssertUnwindSafe(|| self.make_request.make_request(request))) {
                Ok(future) => future,
                Err(panic) => return Err(TransportError::Panicked(panic_message(panic.as_ref()))),
            };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(TransportError::Panicked(panic_message(panic.as_ref()))),
        }
    }

    fn category_of(&self, payload: &str) -> String {
        match &self.category_classifier {
            Some(classifier) => catch_unwind(AssertUnwindSafe(|| classifier(payload)))
                .unwrap_or_else(|_| DEFAULT_CATEGORY.to_string()),
            None => DEFAULT_CATEGORY.to_string(),
        }
    }

    fn record_drop(&self, reason: DropReason, payload: String) {
        let category = self.category_of(&payload);
        debug!(reason = %reason, category = %category, "Recording dropped event");

        if let Some(recorder) = &self.drop_recorder {
            let dropped = DroppedEvent { category, payload };
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| recorder(reason, &dropped))) {
                warn!(
                    error = %panic_message(panic.as_ref()),
                    "Dropped-event recorder panicked"
                );
            }
        }
    }

    async fn persist_offline(&self, payload: &str) {
        let Some(store) = &self.offline_store else {
            return;
        };

        let request = PendingRequest {
            url: self.make_request.destination().to_string(),
            body: payload.to_string(),
        };
        match store.enqueue(request).await {
            Ok(entry) => {
                self.offline_pending.store(true, Ordering::Release);
                debug!(id = entry.id, "Stored event for offline replay");
            }
            Err(e) => warn!(error = %e, "Failed to persist event for offline replay"),
        }
    }

    /// Replays are serialized; a caller arriving while one runs waits for it
    /// and then sees only what is still pending.
    async fn replay_offline(&self) -> usize {
        let Some(store) = &self.offline_store else {
            return 0;
        };
        if !self.environment.is_production() {
            return 0;
        }

        let _replaying = self.replay_lock.lock().await;
        // Cleared before listing so an entry persisted meanwhile re-arms it
        self.offline_pending.store(false, Ordering::Release);

        let pending = match store.list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to list offline deliveries");
                self.offline_pending.store(true, Ordering::Release);
                return 0;
            }
        };

        let destination = self.make_request.destination().to_string();
        let mut replayed = 0;
        for entry in pending
            .into_iter()
            .filter(|entry| entry.request.url == destination)
        {
            if let Err(e) = self.attempt(entry.request.body.clone()).await {
                if e.is_retryable() {
                    debug!(id = entry.id, error = %e, "Offline replay stopped");
                    self.offline_pending.store(true, Ordering::Release);
                    return replayed;
                }
                warn!(id = entry.id, error = %e, "Discarding offline delivery rejected on replay");
                self.record_drop(DropReason::NetworkError, entry.request.body.clone());
            } else {
                replayed += 1;
            }

            if let Err(e) = store.remove(&entry.request).await {
                warn!(id = entry.id, error = %e, "Failed to remove replayed delivery");
                self.offline_pending.store(true, Ordering::Release);
                return replayed;
            }
        }

        if replayed > 0 {
            info!(replayed, "Replayed offline deliveries");
        }
        replayed
    }
}

async fn run_worker(core: Arc<TransportCore>, mut receiver: mpsc::Receiver<Command>) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Deliver(payload) => {
                core.send(payload).await;
            }
            Command::Barrier(reached) => {
                let _ = reached.send(());
            }
        }
    }
    debug!("Transport worker stopped");
}

/// Delivery front-end owned by exactly one client
pub struct Transport {
    core: Arc<TransportCore>,
    queue: mpsc::Sender<Command>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("environment", &self.core.environment)
            .field("destination", &self.core.make_request.destination())
            .finish()
    }
}

/// Build a transport around a request primitive
pub fn create_transport(
    options: TransportOptions,
    make_request: Arc<dyn MakeRequest>,
) -> Result<Transport> {
    Transport::new(options, make_request)
}

impl Transport {
    /// Must be called from within a Tokio runtime; the dispatch worker is spawned on it
    pub fn new(options: TransportOptions, make_request: Arc<dyn MakeRequest>) -> Result<Self> {
        if options.queue_capacity == 0 {
            return Err(SdkError::Configuration(
                "transport queue capacity must be at least 1".to_string(),
            ));
        }
        let handle = Handle::try_current().map_err(|_| SdkError::RuntimeUnavailable)?;

        let (queue, receiver) = mpsc::channel(options.queue_capacity);
        let core = Arc::new(TransportCore {
            environment: options.environment,
            make_request,
            category_classifier: options.category_classifier,
            drop_recorder: options.drop_recorder,
            offline_pending: AtomicBool::new(options.offline_store.is_some()),
            offline_store: options.offline_store,
            replay_lock: Mutex::new(()),
        });

        handle.spawn(run_worker(core.clone(), receiver));
        debug!(
            environment = %core.environment,
            destination = %core.make_request.destination(),
            queue_capacity = options.queue_capacity,
            "Transport started"
        );

        Ok(Self { core, queue })
    }

    pub fn environment(&self) -> Environment {
        self.core.environment
    }

    pub fn destination(&self) -> &str {
        self.core.make_request.destination()
    }

    /// Deliver one payload now, bypassing the dispatch queue
    pub async fn send(&self, payload: impl Into<String>) -> TransportResponse {
        self.core.send(payload.into()).await
    }

    /// Queue a payload for in-order delivery without waiting
    ///
    /// Returns `false` when the payload was dropped because the queue is full
    /// (recorded as `queue_overflow`).
    pub fn dispatch(&self, payload: impl Into<String>) -> bool {
        match self.queue.try_send(Command::Deliver(payload.into())) {
            Ok(()) => true,
            Err(err) => {
                let closed = matches!(err, TrySendError::Closed(_));
                if let Command::Deliver(payload) = err.into_inner() {
                    if closed {
                        warn!("Transport worker stopped, dropping event");
                    } else {
                        warn!("Transport queue full, dropping event");
                    }
                    self.core.record_drop(DropReason::QueueOverflow, payload);
                }
                false
            }
        }
    }

    /// Wait until every payload dispatched before this call got one delivery
    /// attempt, then replay pending offline deliveries
    ///
    /// Payloads dispatched while the flush is waiting may or may not be
    /// included. Returns `false` if the worker is no longer running.
    pub async fn flush(&self) -> bool {
        let (barrier, reached) = oneshot::channel();
        if self.queue.send(Command::Barrier(barrier)).await.is_err() {
            warn!("Transport worker stopped, nothing to flush");
            return false;
        }
        if reached.await.is_err() {
            return false;
        }
        self.core.replay_offline().await;
        true
    }

    /// Attempt delivery of every pending offline entry for this destination
    ///
    /// Stops at the first retryable failure. Entries the server rejects
    /// outright are removed and recorded as `network_error` drops. Returns
    /// how many entries were delivered.
    pub async fn replay_offline(&self) -> usize {
        self.core.replay_offline().await
    }
}
