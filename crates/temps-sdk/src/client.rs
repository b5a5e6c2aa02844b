//! The SDK client
//!
//! A [`Client`] owns one [`Transport`] and one [`PluginManager`] and turns
//! raw signals into events:
//!
//! ```text
//! capture_exception ─▶ beforeCaptureException ─▶ captureException ─▶ send_event ─▶ afterCaptureException
//! send_event        ─▶ beforeSendEvent (veto?) ─▶ transformEvent ─▶ Transport::dispatch ─▶ afterSendEvent
//! ```
//!
//! Capture calls are synchronous and never fail; delivery happens on the
//! transport worker. [`Client::flush`] is the synchronization point.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::event::{Event, EventContext, Exception};
use crate::hooks::{ExceptionInput, Hooks, PerformanceInput};
use crate::options::ClientOptions;
use crate::plugin::{Plugin, PluginContext, PluginManager};
use crate::transport::{RequestStrategy, Transport, TransportOptions};

pub struct Client {
    options: ClientOptions,
    transport: Transport,
    plugin_manager: PluginManager,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Client {
    /// Build a client, register the configured plugins in order and run `init`
    ///
    /// If a plugin fails to set up, the plugins registered before it are
    /// cleaned up in reverse order and the error is returned.
    ///
    /// When no transport is supplied one is built from the DSN endpoint, using
    /// the request strategy the capabilities resolve to. Must be called inside
    /// a Tokio runtime.
    pub fn new(mut options: ClientOptions) -> Result<Arc<Self>> {
        let transport = match options.transport.take() {
            Some(transport) => transport,
            None => build_transport(&options)?,
        };
        let plugins = options.plugins.clone();

        let client = Arc::new(Self {
            options,
            transport,
            plugin_manager: PluginManager::new(),
        });
        if let Err(e) = client.register_all(plugins) {
            // The caller never gets the client, so undo what earlier plugins installed
            for plugin in client.plugin_manager.get_all_plugins().iter().rev() {
                debug!("Cleaning up plugin after failed initialization: {}", plugin.name());
                plugin.cleanup();
            }
            return Err(e);
        }

        debug!(
            environment = %client.options.environment,
            destination = %client.transport.destination(),
            plugins = client.plugin_manager.get_all_plugins().len(),
            "Client initialized"
        );
        client.hooks().init.call(&());

        Ok(client)
    }

    /// The options the client was built with; `transport` is always `None`
    /// here since the client took ownership of it
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn plugin_manager(&self) -> &PluginManager {
        &self.plugin_manager
    }

    pub fn hooks(&self) -> &Hooks {
        &self.plugin_manager.hooks
    }

    /// Register one plugin; `Ok(false)` means the name was already taken
    pub fn register(self: &Arc<Self>, plugin: Arc<dyn Plugin>) -> Result<bool> {
        let context = PluginContext::new(self.clone());
        self.plugin_manager.register(plugin, &context)
    }

    /// Register plugins in order, stopping at the first setup failure
    pub fn register_all<I>(self: &Arc<Self>, plugins: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Plugin>>,
    {
        for plugin in plugins {
            self.register(plugin)?;
        }
        Ok(())
    }

    /// Capture an exception; returns whether the event was handed to the transport
    pub fn capture_exception(&self, exception: Exception, context: Option<EventContext>) -> bool {
        let hooks = self.hooks();
        let input = ExceptionInput { exception, context };

        hooks.before_capture_exception.call(&input);
        let event = Event::error(&input.exception, input.context.clone());
        let event = hooks.capture_exception.call(event, &input);
        let sent = self.send_event(event.clone());
        hooks.after_capture_exception.call(&event);

        sent
    }

    /// Capture a performance metric; returns whether the event was handed to the transport
    pub fn capture_performance(
        &self,
        metric: impl Into<String>,
        value: f64,
        context: Option<EventContext>,
    ) -> bool {
        let hooks = self.hooks();
        let input = PerformanceInput {
            metric: metric.into(),
            value,
            context,
        };

        hooks.before_capture_performance.call(&input);
        let event = Event::performance(input.metric.clone(), input.value, input.context.clone());
        let event = hooks.capture_performance.call(event, &input);
        let sent = self.send_event(event.clone());
        hooks.after_capture_performance.call(&event);

        sent
    }

    /// Capture a named custom event
    pub fn capture_custom(&self, name: impl Into<String>, context: Option<EventContext>) -> bool {
        self.send_event(Event::custom(name, context))
    }

    /// Run the send half of the pipeline
    ///
    /// Returns `false` only when a `beforeSendEvent` tap vetoed the event (or it
    /// could not be serialized). `true` means delivery was attempted, not that
    /// it succeeded.
    pub fn send_event(&self, event: Event) -> bool {
        let hooks = self.hooks();

        if hooks.before_send_event.call(&event) {
            debug!(event_type = %event.kind, "Event cancelled by beforeSendEvent");
            return false;
        }

        let event = hooks.transform_event.call(event, &());
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(event_type = %event.kind, error = %e, "Failed to serialize event");
                return false;
            }
        };

        self.transport.dispatch(payload);
        hooks.after_send_event.call(&event);

        true
    }

    /// Run the `flush` hook, then wait until everything dispatched so far got
    /// one delivery attempt
    pub async fn flush(&self) -> bool {
        self.hooks().flush.call().await;
        self.transport.flush().await
    }
}

fn build_transport(options: &ClientOptions) -> Result<Transport> {
    let strategy = RequestStrategy::resolve(&options.capabilities);
    debug!(strategy = ?strategy, "Resolved request strategy");
    let make_request = strategy.build(options.dsn.endpoint(), options.request_timeout)?;

    let transport_options = TransportOptions {
        environment: options.environment,
        queue_capacity: options.queue_capacity,
        category_classifier: options.category_classifier.clone(),
        drop_recorder: options.drop_recorder.clone(),
        offline_store: options.offline_store.clone(),
    };

    Transport::new(transport_options, make_request)
}
