//! Temps client SDK
//!
//! Captures errors and performance metrics inside an application, runs them
//! through a plugin hook pipeline and delivers them to a Temps project.
//!
//! ```no_run
//! use temps_sdk::{Client, ClientOptions, Environment, Exception};
//!
//! # async fn run() -> temps_sdk::Result<()> {
//! let options = ClientOptions::from_dsn("https://public_key@temps.example.com/1")?
//!     .with_environment(Environment::Production);
//! let client = Client::new(options)?;
//!
//! client.capture_exception(Exception::new("boom"), None);
//! client.capture_performance("LCP", 1234.5, None);
//! client.flush().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod context;
pub mod dsn;
pub mod error;
pub mod event;
pub mod global;
pub mod hooks;
pub mod offline;
pub mod options;
pub mod plugin;
pub mod transport;

pub use client::Client;
pub use context::{ContextDescriptor, ContextPlugin};
pub use dsn::Dsn;
pub use error::{BoxError, Result, SdkError, StoreError, TransportError};
pub use event::{Event, EventContext, EventType, Exception};
pub use global::{capture_exception, capture_performance, current_client, flush, init, set_current_client};
pub use hooks::{
    AsyncSeriesHook, BailHook, ExceptionInput, HookInfo, HookKind, Hooks, NotifyHook,
    PerformanceInput, WaterfallHook,
};
pub use offline::{MemoryOfflineStore, OfflineStore, PendingEntry, PendingRequest, SqliteOfflineStore};
pub use options::{Capabilities, ClientOptions, Environment};
pub use plugin::{Plugin, PluginContext, PluginManager};
pub use transport::{
    classify_by_event_type, create_transport, DropCounter, DropReason, DroppedEvent, MakeRequest,
    RequestStrategy, Transport, TransportOptions, TransportRequest, TransportResponse,
};
