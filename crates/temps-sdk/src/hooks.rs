//! Hook pipeline
//!
//! Plugins attach taps to named hooks. Each hook has one of four kinds:
//! - **Notify**: every tap runs in registration order, results are ignored
//! - **Bail**: taps run in order until one returns `true`, which vetoes the operation
//! - **Waterfall**: each tap receives the previous tap's value and returns the next
//! - **Async series**: each tap's future is awaited before the next tap starts
//!
//! Tap failures are isolated. A panicking tap is logged and skipped: notify hooks
//! keep running later taps, waterfall hooks carry the last good value forward and
//! bail hooks treat the panic as "no veto".

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::event::{Event, EventContext, Exception};

/// The closed set of hook kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Notify,
    Bail,
    Waterfall,
    AsyncSeries,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::Notify => "notify",
            HookKind::Bail => "bail",
            HookKind::Waterfall => "waterfall",
            HookKind::AsyncSeries => "async_series",
        };
        f.write_str(name)
    }
}

pub type NotifyFn<A> = dyn Fn(&A) + Send + Sync;
pub type BailFn<A> = dyn Fn(&A) -> bool + Send + Sync;
pub type WaterfallFn<V, A> = dyn Fn(V, &A) -> V + Send + Sync;
pub type SeriesFn = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

/// Introspection shared by every hook kind
pub trait HookInfo: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> HookKind;
    /// Plugin names of the attached taps, in execution order
    fn tap_names(&self) -> Vec<String>;
    /// Detach every tap registered under `plugin`; returns how many were removed
    fn untap(&self, plugin: &str) -> usize;
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct Tap<F: ?Sized> {
    plugin: String,
    callback: Arc<F>,
}

impl<F: ?Sized> Clone for Tap<F> {
    fn clone(&self) -> Self {
        Self {
            plugin: self.plugin.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Ordered tap storage
///
/// Calls run against a snapshot so taps may register further taps, or read
/// the tap list, without deadlocking.
struct TapList<F: ?Sized> {
    taps: RwLock<Vec<Tap<F>>>,
}

impl<F: ?Sized> TapList<F> {
    fn new() -> Self {
        Self {
            taps: RwLock::new(Vec::new()),
        }
    }

    fn push(&self, hook: &'static str, plugin: String, callback: Arc<F>) {
        debug!(hook, plugin = %plugin, "Tapping hook");
        self.taps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Tap { plugin, callback });
    }

    fn snapshot(&self) -> Vec<Tap<F>> {
        self.taps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn names(&self) -> Vec<String> {
        self.taps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|tap| tap.plugin.clone())
            .collect()
    }

    fn remove(&self, plugin: &str) -> usize {
        let mut taps = self.taps.write().unwrap_or_else(PoisonError::into_inner);
        let before = taps.len();
        taps.retain(|tap| tap.plugin != plugin);
        before - taps.len()
    }
}

macro_rules! impl_hook_info {
    ($hook:ident < $($param:ident),* >, $kind:expr) => {
        impl<$($param: Send + Sync + 'static),*> HookInfo for $hook<$($param),*> {
            fn name(&self) -> &'static str {
                self.name
            }

            fn kind(&self) -> HookKind {
                $kind
            }

            fn tap_names(&self) -> Vec<String> {
                self.taps.names()
            }

            fn untap(&self, plugin: &str) -> usize {
                self.taps.remove(plugin)
            }
        }
    };
}

/// Fire-and-forget hook; all taps run
pub struct NotifyHook<A> {
    name: &'static str,
    taps: TapList<NotifyFn<A>>,
}

impl<A> NotifyHook<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: TapList::new(),
        }
    }

    pub fn tap<F>(&self, plugin: impl Into<String>, callback: F)
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.taps.push(self.name, plugin.into(), Arc::new(callback));
    }

    pub fn call(&self, args: &A) {
        for tap in self.taps.snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (tap.callback)(args))) {
                warn!(
                    hook = self.name,
                    plugin = %tap.plugin,
                    error = %panic_message(payload.as_ref()),
                    "Hook tap panicked, continuing with remaining taps"
                );
            }
        }
    }
}

impl_hook_info!(NotifyHook<A>, HookKind::Notify);

/// Short-circuiting hook; the first tap returning `true` stops evaluation
pub struct BailHook<A> {
    name: &'static str,
    taps: TapList<BailFn<A>>,
}

impl<A> BailHook<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: TapList::new(),
        }
    }

    pub fn tap<F>(&self, plugin: impl Into<String>, callback: F)
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.taps.push(self.name, plugin.into(), Arc::new(callback));
    }

    /// Returns `true` when some tap vetoed
    pub fn call(&self, args: &A) -> bool {
        for tap in self.taps.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| (tap.callback)(args))) {
                Ok(true) => {
                    debug!(hook = self.name, plugin = %tap.plugin, "Hook bailed");
                    return true;
                }
                Ok(false) => {}
                Err(payload) => {
                    warn!(
                        hook = self.name,
                        plugin = %tap.plugin,
                        error = %panic_message(payload.as_ref()),
                        "Hook tap panicked, treating as no veto"
                    );
                }
            }
        }
        false
    }
}

impl_hook_info!(BailHook<A>, HookKind::Bail);

/// Value-transforming hook; each tap's output feeds the next tap
pub struct WaterfallHook<V, A> {
    name: &'static str,
    taps: TapList<WaterfallFn<V, A>>,
}

impl<V: Clone, A> WaterfallHook<V, A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: TapList::new(),
        }
    }

    pub fn tap<F>(&self, plugin: impl Into<String>, callback: F)
    where
        F: Fn(V, &A) -> V + Send + Sync + 'static,
    {
        self.taps.push(self.name, plugin.into(), Arc::new(callback));
    }

    pub fn call(&self, initial: V, args: &A) -> V {
        let mut value = initial;
        for tap in self.taps.snapshot() {
            let input = value.clone();
            match catch_unwind(AssertUnwindSafe(|| (tap.callback)(input, args))) {
                Ok(next) => value = next,
                Err(payload) => {
                    warn!(
                        hook = self.name,
                        plugin = %tap.plugin,
                        error = %panic_message(payload.as_ref()),
                        "Hook tap panicked, keeping previous value"
                    );
                }
            }
        }
        value
    }
}

impl_hook_info!(WaterfallHook<V, A>, HookKind::Waterfall);

/// Async hook; taps are awaited one after another
pub struct AsyncSeriesHook {
    name: &'static str,
    taps: TapList<SeriesFn>,
}

impl AsyncSeriesHook {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: TapList::new(),
        }
    }

    pub fn tap<F, Fut>(&self, plugin: impl Into<String>, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Arc<SeriesFn> = Arc::new(move || callback().boxed());
        self.taps.push(self.name, plugin.into(), callback);
    }

    pub async fn call(&self) {
        for tap in self.taps.snapshot() {
            let started = catch_unwind(AssertUnwindSafe(|| (tap.callback)()));
            let outcome = match started {
                Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                Err(payload) => Err(payload),
            };
            if let Err(payload) = outcome {
                warn!(
                    hook = self.name,
                    plugin = %tap.plugin,
                    error = %panic_message(payload.as_ref()),
                    "Async hook tap panicked, continuing with remaining taps"
                );
            }
        }
    }
}

impl HookInfo for AsyncSeriesHook {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> HookKind {
        HookKind::AsyncSeries
    }

    fn tap_names(&self) -> Vec<String> {
        self.taps.names()
    }

    fn untap(&self, plugin: &str) -> usize {
        self.taps.remove(plugin)
    }
}

/// Raw inputs of `capture_exception`, visible to capture taps
#[derive(Debug, Clone)]
pub struct ExceptionInput {
    pub exception: Exception,
    pub context: Option<EventContext>,
}

/// Raw inputs of `capture_performance`, visible to capture taps
#[derive(Debug, Clone)]
pub struct PerformanceInput {
    pub metric: String,
    pub value: f64,
    pub context: Option<EventContext>,
}

/// Every lifecycle hook a client exposes
pub struct Hooks {
    pub init: NotifyHook<()>,
    pub before_capture_exception: NotifyHook<ExceptionInput>,
    pub capture_exception: WaterfallHook<Event, ExceptionInput>,
    pub after_capture_exception: NotifyHook<Event>,
    pub before_capture_performance: NotifyHook<PerformanceInput>,
    pub capture_performance: WaterfallHook<Event, PerformanceInput>,
    pub after_capture_performance: NotifyHook<Event>,
    pub before_send_event: BailHook<Event>,
    pub transform_event: WaterfallHook<Event, ()>,
    pub after_send_event: NotifyHook<Event>,
    pub flush: AsyncSeriesHook,
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self {
            init: NotifyHook::new("init"),
            before_capture_exception: NotifyHook::new("beforeCaptureException"),
            capture_exception: WaterfallHook::new("captureException"),
            after_capture_exception: NotifyHook::new("afterCaptureException"),
            before_capture_performance: NotifyHook::new("beforeCapturePerformance"),
            capture_performance: WaterfallHook::new("capturePerformance"),
            after_capture_performance: NotifyHook::new("afterCapturePerformance"),
            before_send_event: BailHook::new("beforeSendEvent"),
            transform_event: WaterfallHook::new("transformEvent"),
            after_send_event: NotifyHook::new("afterSendEvent"),
            flush: AsyncSeriesHook::new("flush"),
        }
    }

    /// All hooks in lifecycle order
    pub fn all(&self) -> [&dyn HookInfo; 11] {
        [
            &self.init,
            &self.before_capture_exception,
            &self.capture_exception,
            &self.after_capture_exception,
            &self.before_capture_performance,
            &self.capture_performance,
            &self.after_capture_performance,
            &self.before_send_event,
            &self.transform_event,
            &self.after_send_event,
            &self.flush,
        ]
    }

    /// Detach every tap a plugin attached, across all hooks
    pub fn untap_all(&self, plugin: &str) -> usize {
        self.all().iter().map(|hook| hook.untap(plugin)).sum()
    }
}
