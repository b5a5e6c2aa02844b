//! Capture sources for the Temps SDK
//!
//! Each source is a [`temps_sdk::Plugin`]: registering it installs its
//! listeners, and `cleanup()` removes every one of them. Sources hold only a
//! weak handle to the client, so a dropped client simply stops receiving.
//!
//! - [`GlobalErrorCapture`]: host error slot and unhandled rejections
//! - [`PanicCapture`]: Rust panics on any thread
//! - [`PerformanceCapture`]: web vitals from performance timeline entries

pub mod errors;
pub mod host;
pub mod panic;
pub mod performance;

pub use errors::GlobalErrorCapture;
pub use host::{
    ErrorHandler, ErrorSignal, HostSignal, Listener, ListenerId, PerformanceEntry,
    RejectionReason, SignalHub, SignalKind,
};
pub use panic::PanicCapture;
pub use performance::{PerformanceCapture, VitalReport, WebVitalsTracker};
